//! Gas pricing for state transitions.

use crate::error::ConfigError;

/// Bounds applied to the chain's suggested gas price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    min_price: u64,
    max_price: u64,
    gas_limit: u64,
}

impl GasPolicy {
    /// Policy clamping prices to `[min_price, max_price]`.
    pub fn new(min_price: u64, max_price: u64, gas_limit: u64) -> Result<Self, ConfigError> {
        if min_price > max_price {
            return Err(ConfigError::GasBounds {
                min: min_price,
                max: max_price,
            });
        }
        Ok(Self {
            min_price,
            max_price,
            gas_limit,
        })
    }

    /// Price to pay given the chain's suggestion.
    pub fn price(&self, suggested: u64) -> u64 {
        suggested.clamp(self.min_price, self.max_price)
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}
