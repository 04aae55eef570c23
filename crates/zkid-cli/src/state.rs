//! # State Subcommand
//!
//! Computes an identity state from its three tree roots and, given a
//! chain, the genesis DID of an identity whose first state it is.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use zkid_core::{Blockchain, Did, DidMethod, Hash, Id, Network};
use zkid_state::TreeRoots;

/// Arguments for the `zkid state` subcommand.
#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommand,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Hash tree roots into an identity state.
    Hash {
        /// Claims tree root, decimal.
        #[arg(long, value_parser = parse_hash)]
        claims_root: Hash,
        /// Revocation tree root, decimal.
        #[arg(long, value_parser = parse_hash, default_value = "0")]
        revocation_root: Hash,
        /// Roots tree root, decimal.
        #[arg(long, value_parser = parse_hash, default_value = "0")]
        roots_root: Hash,
        /// DID method for the genesis DID.
        #[arg(long, value_parser = parse_method, default_value = "iden3")]
        method: DidMethod,
        /// Chain as `blockchain:network`, e.g. `polygon:amoy`.
        #[arg(long, value_parser = parse_chain)]
        chain: Option<(Blockchain, Network)>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateHash {
    pub state: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis_did: Option<Did>,
}

pub fn run_state(args: &StateArgs) -> Result<u8> {
    match &args.command {
        StateCommand::Hash {
            claims_root,
            revocation_root,
            roots_root,
            method,
            chain,
        } => {
            let roots = TreeRoots {
                claims_root: *claims_root,
                revocation_root: *revocation_root,
                roots_root: *roots_root,
            };
            let out = state_hash(&roots, *method, *chain)?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(0)
        }
    }
}

/// State of `roots`, plus the genesis DID on `chain` if given.
pub fn state_hash(roots: &TreeRoots, method: DidMethod, chain: Option<(Blockchain, Network)>) -> Result<StateHash> {
    let state = roots.state_hash()?;
    let genesis_did = chain
        .map(|(blockchain, network)| Id::from_genesis(method, blockchain, network, &state)?.to_did())
        .transpose()?;
    Ok(StateHash { state, genesis_did })
}

fn parse_hash(s: &str) -> Result<Hash, String> {
    Hash::from_decimal(s).map_err(|e| e.to_string())
}

fn parse_method(s: &str) -> Result<DidMethod, String> {
    DidMethod::parse(s).ok_or_else(|| format!("unknown DID method {s}"))
}

fn parse_chain(s: &str) -> Result<(Blockchain, Network), String> {
    let (blockchain, network) = s
        .split_once(':')
        .ok_or_else(|| format!("expected blockchain:network, got {s}"))?;
    let blockchain = Blockchain::parse(blockchain).ok_or_else(|| format!("unknown blockchain {blockchain}"))?;
    let network = Network::parse(network).ok_or_else(|| format!("unknown network {network}"))?;
    Ok((blockchain, network))
}
