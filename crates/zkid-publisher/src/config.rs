//! # Publisher Configuration
//!
//! Loaded from YAML, from `ZKID_*` environment variables, or both (file
//! first, environment overrides). Durations are given in seconds and may
//! be fractional.
//!
//! | variable | setting | default |
//! |---|---|---|
//! | `ZKID_ON_CHAIN_CHECK_STATUS_FREQUENCY` | confirmation sweep interval | 60 |
//! | `ZKID_CONFIRMATION_BLOCK_COUNT` | blocks after mining before a state is confirmed | 10 |
//! | `ZKID_CONFIRMATION_TIMEOUT` | how long a publish waits for a receipt | 600 |
//! | `ZKID_RPC_RESPONSE_TIMEOUT` | bound on each chain call | 5 |
//! | `ZKID_WAIT_RECEIPT_CYCLE_TIME` | receipt polling interval | 2 |
//! | `ZKID_MIN_GAS_PRICE` / `ZKID_MAX_GAS_PRICE` | gas price clamp (wei) | 1 gwei / 300 gwei |
//! | `ZKID_DEFAULT_GAS_LIMIT` | gas limit per transition | 600000 |
//! | `ZKID_CONTRACT_ADDRESS` | state contract | empty |
//! | `ZKID_CIRCUITS_PATH` | verification key directory | `./circuits` |
//! | `ZKID_ACCEPTED_STATE_TRANSITION_DELAY` | staleness tolerance for verification | 3600 |
//! | `ZKID_REVOCATION_NONCE_SPACE` | revocation nonces per identity | 2^32 |
//! | `ZKID_RHS_ENABLED` | push tree nodes to the reverse hash service | false |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zkid_auth::VerifyOptions;
use zkid_state::EngineConfig;

use crate::chain::ChainTimeouts;
use crate::error::ConfigError;
use crate::gas::GasPolicy;

/// Publisher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    #[serde(with = "secs")]
    pub on_chain_check_status_frequency: Duration,
    pub confirmation_block_count: u64,
    #[serde(with = "secs")]
    pub confirmation_timeout: Duration,
    #[serde(with = "secs")]
    pub rpc_response_timeout: Duration,
    #[serde(with = "secs")]
    pub wait_receipt_cycle_time: Duration,
    pub min_gas_price: u64,
    pub max_gas_price: u64,
    pub default_gas_limit: u64,
    pub contract_address: String,
    pub circuits_path: PathBuf,
    #[serde(with = "secs")]
    pub accepted_state_transition_delay: Duration,
    pub revocation_nonce_space: u64,
    pub rhs_enabled: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            on_chain_check_status_frequency: Duration::from_secs(60),
            confirmation_block_count: 10,
            confirmation_timeout: Duration::from_secs(600),
            rpc_response_timeout: Duration::from_secs(5),
            wait_receipt_cycle_time: Duration::from_secs(2),
            min_gas_price: 1_000_000_000,
            max_gas_price: 300_000_000_000,
            default_gas_limit: 600_000,
            contract_address: String::new(),
            circuits_path: PathBuf::from("./circuits"),
            accepted_state_transition_delay: Duration::from_secs(3600),
            revocation_nonce_space: 1 << 32,
            rhs_enabled: false,
        }
    }
}

impl PublisherConfig {
    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overridden by `ZKID_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by `ZKID_*` variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| (key.to_string(), v.trim().to_string()));

        if let Some((k, v)) = get("ZKID_ON_CHAIN_CHECK_STATUS_FREQUENCY") {
            self.on_chain_check_status_frequency = parse_secs(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_CONFIRMATION_BLOCK_COUNT") {
            self.confirmation_block_count = parse(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_CONFIRMATION_TIMEOUT") {
            self.confirmation_timeout = parse_secs(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_RPC_RESPONSE_TIMEOUT") {
            self.rpc_response_timeout = parse_secs(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_WAIT_RECEIPT_CYCLE_TIME") {
            self.wait_receipt_cycle_time = parse_secs(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_MIN_GAS_PRICE") {
            self.min_gas_price = parse(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_MAX_GAS_PRICE") {
            self.max_gas_price = parse(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_DEFAULT_GAS_LIMIT") {
            self.default_gas_limit = parse(&k, &v)?;
        }
        if let Some((_, v)) = get("ZKID_CONTRACT_ADDRESS") {
            self.contract_address = v;
        }
        if let Some((_, v)) = get("ZKID_CIRCUITS_PATH") {
            self.circuits_path = PathBuf::from(v);
        }
        if let Some((k, v)) = get("ZKID_ACCEPTED_STATE_TRANSITION_DELAY") {
            self.accepted_state_transition_delay = parse_secs(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_REVOCATION_NONCE_SPACE") {
            self.revocation_nonce_space = parse(&k, &v)?;
        }
        if let Some((k, v)) = get("ZKID_RHS_ENABLED") {
            self.rhs_enabled = parse(&k, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the publisher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gas_policy()?;
        for (key, value) in [
            ("on_chain_check_status_frequency", self.on_chain_check_status_frequency),
            ("rpc_response_timeout", self.rpc_response_timeout),
            ("wait_receipt_cycle_time", self.wait_receipt_cycle_time),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: "0".into(),
                    reason: "must be positive".into(),
                });
            }
        }
        if self.revocation_nonce_space == 0 {
            return Err(ConfigError::InvalidValue {
                key: "revocation_nonce_space".into(),
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn gas_policy(&self) -> Result<GasPolicy, ConfigError> {
        GasPolicy::new(self.min_gas_price, self.max_gas_price, self.default_gas_limit)
    }

    pub fn chain_timeouts(&self) -> ChainTimeouts {
        ChainTimeouts {
            rpc_response: self.rpc_response_timeout,
            wait_receipt_cycle: self.wait_receipt_cycle_time,
            confirmation: self.confirmation_timeout,
        }
    }

    /// Verification tolerances derived from these settings.
    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            accepted_state_transition_delay: self.accepted_state_transition_delay,
            resolve_timeout: self.rpc_response_timeout,
        }
    }

    /// State engine settings derived from these settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            revocation_nonce_space: self.revocation_nonce_space,
            ..EngineConfig::default()
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
        reason: e.to_string(),
    })
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse(key, value)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
        reason: e.to_string(),
    })
}

mod secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
