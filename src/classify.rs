//! Asset classifier: owned vs. target → Sell / Adjust / Buy.
//!
//! The Adjust list is further split by comparing each entry's current share
//! of the pre-trade vault value against its target weight:
//!
//! | current vs target | category       |
//! |-------------------|----------------|
//! | share > weight    | AdjustToSell   |
//! | share < weight    | AdjustToBuy    |
//! | share == weight   | (excluded)     |
//!
//! Sentinel (zero-address) slots and zero-weight targets are ignored, as are
//! untargeted holdings with a zero balance (there is nothing to sell).

use alloy_primitives::{Address, U256};
use rustc_hash::FxHashMap;

use crate::category::{Category, CategoryEntry, CategoryList};
use crate::error::InvariantViolation;
use crate::snapshot::VaultSnapshot;
use crate::types::{Position, TargetAllocation, Weight};

/// Output of the classifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Classification {
    pub sell: CategoryList,
    /// Owned ∩ target, before the overweight/underweight split.
    pub adjust: CategoryList,
    pub adjust_to_sell: CategoryList,
    pub adjust_to_buy: CategoryList,
    pub buy: CategoryList,
    /// Pre-trade vault value the shares were computed against.
    pub total_value: U256,
}

impl Classification {
    /// The list for one trade category.
    pub fn list(&self, category: Category) -> &CategoryList {
        match category {
            Category::Sell => &self.sell,
            Category::AdjustToSell => &self.adjust_to_sell,
            Category::AdjustToBuy => &self.adjust_to_buy,
            Category::Buy => &self.buy,
        }
    }

    /// True when no trade category has an entry (no-op cycle).
    pub fn is_empty(&self) -> bool {
        Category::EXECUTION_ORDER
            .iter()
            .all(|&c| self.list(c).is_empty())
    }

    /// Number of entries across the four trade categories.
    pub fn trade_count(&self) -> usize {
        Category::EXECUTION_ORDER
            .iter()
            .map(|&c| self.list(c).len())
            .sum()
    }

    /// Check that no asset appears in more than one trade category (or twice
    /// in the same one).
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let mut seen: FxHashMap<Address, Category> = FxHashMap::default();
        for category in Category::EXECUTION_ORDER {
            for entry in self.list(category).active() {
                if let Some(first) = seen.insert(entry.address(), category) {
                    return Err(InvariantViolation::DuplicateClassification {
                        asset: entry.address(),
                        first,
                        second: category,
                    });
                }
            }
        }
        Ok(())
    }
}

fn is_targeted(targets: &[TargetAllocation], address: &Address) -> bool {
    targets
        .iter()
        .any(|t| t.is_active() && t.asset.address == *address)
}

fn share(position_value: U256, total: U256, asset: Address) -> Result<Weight, InvariantViolation> {
    if position_value > total {
        return Err(InvariantViolation::ShareOutOfRange {
            asset,
            value: position_value,
            total,
        });
    }
    Weight::share_of(position_value, total).ok_or(InvariantViolation::ShareOutOfRange {
        asset,
        value: position_value,
        total,
    })
}

/// Owned assets absent from the target allocation.
pub fn create_sell_list(
    holdings: &[Position],
    targets: &[TargetAllocation],
    total_value: U256,
) -> Result<CategoryList, InvariantViolation> {
    let mut list = CategoryList::new();
    for pos in holdings.iter().filter(|p| !p.asset.is_sentinel()) {
        if pos.balance.is_zero() || is_targeted(targets, &pos.asset.address) {
            continue;
        }
        list.push(CategoryEntry {
            asset: pos.asset,
            weight: Weight::ZERO,
            current_share: share(pos.value, total_value, pos.asset.address)?,
            balance: pos.balance,
            value: pos.value,
        });
    }
    Ok(list)
}

/// Owned ∩ target, priced and weighted from the target side.
pub fn create_adjust_list(
    holdings: &[Position],
    targets: &[TargetAllocation],
    total_value: U256,
) -> Result<CategoryList, InvariantViolation> {
    let mut list = CategoryList::new();
    for pos in holdings.iter().filter(|p| !p.asset.is_sentinel()) {
        let Some(target) = targets
            .iter()
            .find(|t| t.is_active() && t.asset.address == pos.asset.address)
        else {
            continue;
        };
        let value = target
            .asset
            .value_of(pos.balance)
            .ok_or(InvariantViolation::Overflow {
                category: Category::AdjustToSell,
                asset: pos.asset.address,
                what: "holding value",
            })?;
        list.push(CategoryEntry {
            asset: target.asset,
            weight: target.weight,
            current_share: share(value, total_value, pos.asset.address)?,
            balance: pos.balance,
            value,
        });
    }
    Ok(list)
}

/// Targeted assets the vault does not own.
pub fn create_buy_list(holdings: &[Position], targets: &[TargetAllocation]) -> CategoryList {
    targets
        .iter()
        .filter(|t| t.is_active())
        .filter(|t| !holdings.iter().any(|p| p.asset.address == t.asset.address))
        .map(|t| CategoryEntry {
            asset: t.asset,
            weight: t.weight,
            current_share: Weight::ZERO,
            balance: U256::ZERO,
            value: U256::ZERO,
        })
        .collect()
}

/// Split the Adjust list into (AdjustToSell, AdjustToBuy).
pub fn split_adjust_list(adjust: &CategoryList) -> (CategoryList, CategoryList) {
    let mut to_sell = CategoryList::new();
    let mut to_buy = CategoryList::new();
    for entry in adjust.active() {
        if entry.current_share > entry.weight {
            to_sell.push(*entry);
        } else if entry.current_share < entry.weight {
            to_buy.push(*entry);
        }
    }
    (to_sell, to_buy)
}

/// Run the full classification for one snapshot.
pub fn classify(snapshot: &VaultSnapshot) -> Result<Classification, InvariantViolation> {
    let total = snapshot.total_value;
    let sell = create_sell_list(&snapshot.holdings, &snapshot.targets, total)?;
    let adjust = create_adjust_list(&snapshot.holdings, &snapshot.targets, total)?;
    let buy = create_buy_list(&snapshot.holdings, &snapshot.targets);
    let (adjust_to_sell, adjust_to_buy) = split_adjust_list(&adjust);

    let classification = Classification {
        sell,
        adjust,
        adjust_to_sell,
        adjust_to_buy,
        buy,
        total_value: total,
    };
    classification.verify()?;
    Ok(classification)
}
