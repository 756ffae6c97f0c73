//! Shared collaborator types: receipts and the records a paper vault is
//! described with.

use detf::{Address, U256, Weight};
use serde::{Deserialize, Serialize};

/// Acknowledgement of an executed rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Submission sequence number on this vault, starting at 1.
    pub sequence: u64,
    pub legs: usize,
}

/// Static token metadata and its current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
    /// 18-decimal base-currency value of one whole unit.
    #[serde(with = "crate::decimal")]
    pub price: U256,
    /// Only answer price queries made with the lower-cased identifier.
    #[serde(default)]
    pub lowercase_only: bool,
}

/// One raw token balance held by a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub address: Address,
    #[serde(with = "crate::decimal")]
    pub balance: U256,
}

/// One entry of a vault's target allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetWeight {
    pub address: Address,
    pub weight: Weight,
}

/// A two-token pool on some venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub venue: Address,
    pub token_a: Address,
    pub token_b: Address,
    /// Largest trade, in base-currency value, the pool absorbs.
    #[serde(with = "crate::decimal")]
    pub depth: U256,
    #[serde(default)]
    pub fee_bps: u32,
}

impl Pool {
    /// The token on the other side of `token`, if `token` is in the pool.
    pub fn other(&self, token: Address) -> Option<Address> {
        if token == self.token_a {
            Some(self.token_b)
        } else if token == self.token_b {
            Some(self.token_a)
        } else {
            None
        }
    }

    pub fn connects(&self, a: Address, b: Address) -> bool {
        self.other(a) == Some(b)
    }
}
