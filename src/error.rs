//! Invariant violations raised by the decision engine.

use alloy_primitives::{Address, U256};

use crate::category::Category;

/// A computation produced a value the rebalance cycle must not act on.
///
/// Every variant names the category and/or asset involved. The cycle aborts
/// before submission; nothing is clamped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{category}: overflow computing {what} for {asset}")]
    Overflow {
        category: Category,
        asset: Address,
        what: &'static str,
    },

    #[error("{category}: negative {what} for {asset}")]
    NegativeAmount {
        category: Category,
        asset: Address,
        what: &'static str,
    },

    #[error("{category}: {asset} has a zero price")]
    ZeroPrice { category: Category, asset: Address },

    #[error("asset {asset} classified into both {first} and {second}")]
    DuplicateClassification {
        asset: Address,
        first: Category,
        second: Category,
    },

    #[error("{entries} buy-side entries but total target percentage is zero")]
    ZeroTargetPercentage { entries: usize },

    #[error("{asset} is valued at {value}, above the vault total {total}")]
    ShareOutOfRange {
        asset: Address,
        value: U256,
        total: U256,
    },
}

impl InvariantViolation {
    /// The category implicated, when the violation belongs to one.
    pub fn category(&self) -> Option<Category> {
        match self {
            InvariantViolation::Overflow { category, .. }
            | InvariantViolation::NegativeAmount { category, .. }
            | InvariantViolation::ZeroPrice { category, .. } => Some(*category),
            InvariantViolation::DuplicateClassification { second, .. } => Some(*second),
            InvariantViolation::ZeroTargetPercentage { .. } => Some(Category::Buy),
            InvariantViolation::ShareOutOfRange { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_category_and_asset() {
        let e = InvariantViolation::Overflow {
            category: Category::AdjustToSell,
            asset: Address::repeat_byte(0xab),
            what: "excess value",
        };
        let s = e.to_string();
        assert!(s.starts_with("adjust_to_sell:"));
        assert!(s.contains("excess value"));
        assert!(s.to_lowercase().contains("abababab"));
    }

    #[test]
    fn category_accessor() {
        let e = InvariantViolation::ZeroTargetPercentage { entries: 2 };
        assert_eq!(e.category(), Some(Category::Buy));
        assert_eq!(e.to_string(), "2 buy-side entries but total target percentage is zero");
    }
}
