//! Core types: Weight, SlippageTolerance, Asset, Position, TargetAllocation

use std::fmt;

pub use alloy_primitives::{Address, U256};

use crate::fixed;

/// Denominator of every [`Weight`]: `Weight(100_000_000)` is 100%.
pub const WEIGHT_SCALE: u64 = 100_000_000;

/// Denominator of basis-point quantities.
pub const BPS_SCALE: u32 = 10_000;

/// Portfolio share as a fixed-point fraction with denominator 10^8.
///
/// `Weight(25_000_000)` is 25%. Sums of weights (e.g. the aggregate buy-side
/// weight gap) are also carried as `Weight` and may exceed 100%.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Weight(pub u64);

impl Weight {
    pub const ZERO: Weight = Weight(0);
    pub const FULL: Weight = Weight(WEIGHT_SCALE);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Weight) -> Option<Weight> {
        self.0.checked_add(other.0).map(Weight)
    }

    pub fn checked_sub(self, other: Weight) -> Option<Weight> {
        self.0.checked_sub(other.0).map(Weight)
    }

    /// Share of `part` in `whole`, truncated: `part × 10^8 / whole`.
    ///
    /// An empty `whole` yields a zero share. Returns `None` only if the
    /// result does not fit in a `u64`.
    pub fn share_of(part: U256, whole: U256) -> Option<Weight> {
        if whole.is_zero() {
            return Some(Weight::ZERO);
        }
        let share = fixed::mul_div(part, U256::from(WEIGHT_SCALE), whole)?;
        u64::try_from(share).ok().map(Weight)
    }

    /// `self × amount / 10^8`, truncated.
    pub fn apply(self, amount: U256) -> Option<U256> {
        fixed::mul_div(amount, U256::from(self.0), U256::from(WEIGHT_SCALE))
    }

    /// As a fraction of one, for display only.
    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / WEIGHT_SCALE as f64
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 10^6 units per percent
        write!(f, "{}.{:06}%", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// Maximum tolerated shortfall between a quoted and a guaranteed output,
/// in basis points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlippageTolerance {
    bps: u32,
}

impl SlippageTolerance {
    /// Returns `None` if `bps` exceeds 100%.
    pub fn from_bps(bps: u32) -> Option<Self> {
        (bps <= BPS_SCALE).then_some(Self { bps })
    }

    pub fn bps(self) -> u32 {
        self.bps
    }

    /// Minimum acceptable output: `amount × (1 − tolerance)`, truncated.
    pub fn apply(self, amount: U256) -> Option<U256> {
        fixed::mul_div(
            amount,
            U256::from(BPS_SCALE - self.bps),
            U256::from(BPS_SCALE),
        )
    }
}

/// Whether `address` is the reserved zero-address padding slot.
pub fn is_sentinel(address: &Address) -> bool {
    *address == Address::ZERO
}

/// A token with its per-cycle price.
///
/// `price` is the base-currency value of one whole unit as an 18-decimal
/// fixed-point number; `decimals` is the token's own precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Asset {
    pub address: Address,
    pub price: U256,
    pub decimals: u8,
}

impl Asset {
    pub fn new(address: Address, price: U256, decimals: u8) -> Self {
        Self {
            address,
            price,
            decimals,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(&self.address)
    }

    /// Base-currency value of a raw token amount.
    pub fn value_of(&self, amount: U256) -> Option<U256> {
        fixed::value_in_base(self.price, amount, self.decimals)
    }

    /// Raw token amount worth `value` in base currency. `None` on zero price.
    pub fn amount_for(&self, value: U256) -> Option<U256> {
        fixed::amount_for_value(value, self.price, self.decimals)
    }
}

/// An owned asset: raw balance plus its base-currency value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub asset: Asset,
    pub balance: U256,
    pub value: U256,
}

impl Position {
    /// Build a position, valuing `balance` at the asset's price.
    pub fn new(asset: Asset, balance: U256) -> Option<Self> {
        let value = asset.value_of(balance)?;
        Some(Self {
            asset,
            balance,
            value,
        })
    }
}

/// One entry of the desired allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetAllocation {
    pub asset: Asset,
    pub weight: Weight,
}

impl TargetAllocation {
    /// Zero-weight and sentinel entries take no part in classification.
    pub fn is_active(&self) -> bool {
        !self.weight.is_zero() && !self.asset.is_sentinel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(n: u64) -> U256 {
        U256::from(n) * fixed::pow10(18).unwrap()
    }

    #[test]
    fn weight_display() {
        assert_eq!(format!("{}", Weight(50_000_000)), "50.000000%");
        assert_eq!(format!("{}", Weight(520_000)), "0.520000%");
        assert_eq!(format!("{}", Weight::FULL), "100.000000%");
    }

    #[test]
    fn weight_share_of() {
        assert_eq!(
            Weight::share_of(U256::from(70), U256::from(100)),
            Some(Weight(70_000_000))
        );
        // truncates
        assert_eq!(
            Weight::share_of(U256::from(1), U256::from(3)),
            Some(Weight(33_333_333))
        );
        assert_eq!(
            Weight::share_of(U256::from(5), U256::ZERO),
            Some(Weight::ZERO)
        );
    }

    #[test]
    fn weight_checked_sub_underflow() {
        assert_eq!(Weight(10).checked_sub(Weight(20)), None);
        assert_eq!(Weight(20).checked_sub(Weight(5)), Some(Weight(15)));
    }

    #[test]
    fn slippage_bounds() {
        assert!(SlippageTolerance::from_bps(10_001).is_none());
        let s = SlippageTolerance::from_bps(50).unwrap();
        assert_eq!(s.apply(U256::from(10_000)), Some(U256::from(9_950)));
        let none = SlippageTolerance::from_bps(0).unwrap();
        assert_eq!(none.apply(U256::from(123)), Some(U256::from(123)));
    }

    #[test]
    fn asset_valuation() {
        // 6-decimal token worth 0.5 base per unit
        let usdc = Asset::new(Address::repeat_byte(1), eth(1) / U256::from(2), 6);
        let value = usdc.value_of(U256::from(2_000_000u64)).unwrap();
        assert_eq!(value, eth(1));
        assert_eq!(usdc.amount_for(eth(1)).unwrap(), U256::from(2_000_000u64));
    }

    #[test]
    fn zero_price_has_no_amount() {
        let dead = Asset::new(Address::repeat_byte(2), U256::ZERO, 18);
        assert!(dead.amount_for(eth(1)).is_none());
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_sentinel(&Address::ZERO));
        assert!(!is_sentinel(&Address::repeat_byte(9)));
        let t = TargetAllocation {
            asset: Asset::new(Address::repeat_byte(3), eth(1), 18),
            weight: Weight::ZERO,
        };
        assert!(!t.is_active());
    }
}
