//! Weight normalizer: the aggregate buy-side weight gap.
//!
//! `total_target_percentage = Σ(AdjustToBuy: weight − share) + Σ(Buy: weight)`.
//!
//! The sum is not clamped to 10^8. Buy-side legs are sized by the ratio of
//! their own gap to this total, so the absolute scale cancels out.

use crate::category::{Category, CategoryEntry};
use crate::classify::Classification;
use crate::error::InvariantViolation;
use crate::types::Weight;

/// Weight gap a buy-side entry must close.
///
/// AdjustToBuy: `weight − current_share`; Buy: `weight`. Sell-side
/// categories have no gap.
pub fn weight_gap(category: Category, entry: &CategoryEntry) -> Result<Weight, InvariantViolation> {
    match category {
        Category::AdjustToBuy => entry.weight.checked_sub(entry.current_share).ok_or(
            InvariantViolation::NegativeAmount {
                category,
                asset: entry.address(),
                what: "weight gap",
            },
        ),
        Category::Buy => Ok(entry.weight),
        Category::Sell | Category::AdjustToSell => Ok(Weight::ZERO),
    }
}

/// Aggregate weight gap over AdjustToBuy and Buy.
///
/// A zero total with a non-empty buy side is a violation: the buy legs would
/// have no denominator.
pub fn total_target_percentage(
    classification: &Classification,
) -> Result<Weight, InvariantViolation> {
    let mut total = Weight::ZERO;
    let mut entries = 0usize;

    for category in [Category::AdjustToBuy, Category::Buy] {
        for entry in classification.list(category).active() {
            let gap = weight_gap(category, entry)?;
            total = total
                .checked_add(gap)
                .ok_or(InvariantViolation::Overflow {
                    category,
                    asset: entry.address(),
                    what: "total target percentage",
                })?;
            entries += 1;
        }
    }

    if total.is_zero() && entries > 0 {
        return Err(InvariantViolation::ZeroTargetPercentage { entries });
    }
    Ok(total)
}
