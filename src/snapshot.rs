//! Per-cycle view of a vault.
//!
//! A `VaultSnapshot` is built once at the start of a cycle and threaded
//! through every stage. Nothing in this crate caches prices or weights
//! between cycles.

use alloy_primitives::{Address, U256};

use crate::types::{Position, TargetAllocation};

/// Holdings, targets and valuation of one vault at the start of a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VaultSnapshot {
    pub vault: Address,
    /// Unit of account; every trade leg starts or ends here.
    pub base_asset: Address,
    /// Uninvested base-currency balance.
    pub base_balance: U256,
    pub holdings: Vec<Position>,
    pub targets: Vec<TargetAllocation>,
    /// Total pre-trade value in base currency, holdings plus base balance.
    pub total_value: U256,
}

impl VaultSnapshot {
    /// Build a snapshot whose total is the sum of holding values and the
    /// base balance. Returns `None` on overflow.
    pub fn from_parts(
        vault: Address,
        base_asset: Address,
        base_balance: U256,
        holdings: Vec<Position>,
        targets: Vec<TargetAllocation>,
    ) -> Option<Self> {
        let total_value = holdings
            .iter()
            .try_fold(base_balance, |acc, p| acc.checked_add(p.value))?;
        Some(Self {
            vault,
            base_asset,
            base_balance,
            holdings,
            targets,
            total_value,
        })
    }

    pub fn holding(&self, address: &Address) -> Option<&Position> {
        self.holdings.iter().find(|p| p.asset.address == *address)
    }

    pub fn target(&self, address: &Address) -> Option<&TargetAllocation> {
        self.targets.iter().find(|t| t.asset.address == *address)
    }

    /// Targets that take part in classification.
    pub fn active_targets(&self) -> impl Iterator<Item = &TargetAllocation> {
        self.targets.iter().filter(|t| t.is_active())
    }

    /// Holdings that take part in classification.
    pub fn active_holdings(&self) -> impl Iterator<Item = &Position> {
        self.holdings.iter().filter(|p| !p.asset.is_sentinel())
    }
}
