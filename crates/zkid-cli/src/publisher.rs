//! # Publisher Subcommand
//!
//! Runs the state publisher loop against an in-process chain. Demo
//! identities are provisioned on `polygon:amoy`, each issues one claim,
//! and the loop publishes and confirms their states while a miner
//! produces blocks at a fixed rate.
//!
//! Settings come from `--config` (YAML) overridden by `ZKID_*`
//! environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use zkid_auth::schema_hash;
use zkid_core::{Blockchain, Did, DidMethod, Hash, Network};
use zkid_crypto::LocalKeyStore;
use zkid_publisher::{
    task, ChainClient, LoopStats, MemoryRhs, MockChain, PublisherConfig, Schedule, StatePublisher,
};
use zkid_state::{IdentityEngine, NewClaim, SubjectPosition};

const DEMO_CONTEXT: &str = "https://schemas.zkid.dev/demo/v1.jsonld";
const DEMO_TYPE: &str = "DemoCredential";

/// Arguments for the `zkid publisher` subcommand.
#[derive(Args, Debug)]
pub struct PublisherArgs {
    #[command(subcommand)]
    pub command: PublisherCommand,
}

#[derive(Subcommand, Debug)]
pub enum PublisherCommand {
    /// Run the publish and confirmation loop on a local chain.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Publisher configuration file (YAML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Demo identities to provision.
    #[arg(long, default_value_t = 2)]
    pub identities: usize,

    /// Milliseconds between mined blocks.
    #[arg(long, default_value_t = 1000)]
    pub block_time_ms: u64,

    /// Seconds between publish rounds. Defaults to the sweep interval.
    #[arg(long)]
    pub publish_interval: Option<f64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub duration: Option<f64>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

pub fn run_publisher(args: &PublisherArgs) -> Result<u8> {
    match &args.command {
        PublisherCommand::Run(run) => {
            let runtime = tokio::runtime::Runtime::new().context("cannot start async runtime")?;
            let stats = runtime.block_on(run_loop(run.clone()))?;
            println!("{}", json!({ "sweeps": stats.sweeps, "publishRounds": stats.publish_rounds }));
            Ok(0)
        }
    }
}

/// Load configuration: the file if given, then environment overrides.
pub fn load_config(path: Option<&PathBuf>) -> Result<PublisherConfig> {
    let base = match path {
        Some(path) => PublisherConfig::from_file(path)?,
        None => PublisherConfig::default(),
    };
    Ok(base.with_overrides(|key| std::env::var(key).ok())?)
}

/// Provision `n` identities with one pending claim each.
pub fn provision(engine: &IdentityEngine, n: usize) -> Result<Vec<Did>> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let (did, _) = engine.create_identity(DidMethod::Iden3, Blockchain::Polygon, Network::Amoy)?;
        engine.insert_claim(
            &did.id,
            NewClaim {
                schema_url: DEMO_CONTEXT.into(),
                schema_type: DEMO_TYPE.into(),
                schema_hash: schema_hash(DEMO_CONTEXT, DEMO_TYPE),
                version: 0,
                subject: None,
                subject_position: SubjectPosition::Index,
                index_data: [Hash::from_u64(i as u64), Hash::default()],
                value_data: [Hash::default(), Hash::default()],
                expiration: None,
                credential_subject: json!({ "sequence": i }),
            },
        )?;
        tracing::info!(did = %did, "demo identity provisioned");
        out.push(did);
    }
    Ok(out)
}

async fn run_loop(args: RunArgs) -> Result<LoopStats> {
    let config = load_config(args.config.as_ref())?;
    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("cannot install metrics exporter")?;
        tracing::info!(%addr, "serving metrics");
    }

    let engine = IdentityEngine::new(Arc::new(LocalKeyStore::new()), config.engine_config());
    provision(&engine, args.identities)?;

    let chain = Arc::new(MockChain::new("polygon:amoy"));
    let client = ChainClient::new(chain.clone(), config.gas_policy()?, config.chain_timeouts());
    let mut publisher = StatePublisher::new(engine, client, config.confirmation_block_count);
    if config.rhs_enabled {
        publisher = publisher.with_rhs(Arc::new(MemoryRhs::new()));
    }

    let shutdown = CancellationToken::new();
    let miner = {
        let chain = chain.clone();
        let shutdown = shutdown.clone();
        let mut blocks = tokio::time::interval(Duration::from_millis(args.block_time_ms.max(1)));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = blocks.tick() => { chain.mine(); }
                }
            }
        })
    };

    let publish_interval = match args.publish_interval {
        Some(secs) => Duration::try_from_secs_f64(secs).context("invalid --publish-interval")?,
        None => config.on_chain_check_status_frequency,
    };
    let schedule = Schedule {
        check_interval: config.on_chain_check_status_frequency,
        publish_interval: Some(publish_interval),
    };
    let handle = task::spawn(publisher, schedule, shutdown.clone());

    match args.duration {
        Some(secs) => {
            let limit = Duration::try_from_secs_f64(secs).context("invalid --duration")?;
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("cannot listen for Ctrl-C")?;
        }
    }
    shutdown.cancel();

    let stats = handle.await.context("publisher task panicked")?;
    miner.await.context("miner task panicked")?;
    tracing::info!(head = chain.head(), "local chain stopped");
    Ok(stats)
}
