//! Checked 256-bit fixed-point helpers.
//!
//! Every helper returns `None` instead of wrapping or panicking; callers turn
//! that into an [`InvariantViolation`](crate::InvariantViolation) naming the
//! asset and category involved.

use alloy_primitives::U256;

/// `10^decimals`.
pub fn pow10(decimals: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(decimals))
}

/// `a × b / denominator`, truncated. `None` on overflow or zero denominator.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    a.checked_mul(b)?.checked_div(denominator)
}

/// `price × amount / 10^decimals`.
pub fn value_in_base(price: U256, amount: U256, decimals: u8) -> Option<U256> {
    mul_div(price, amount, pow10(decimals)?)
}

/// `value × 10^decimals / price`.
pub fn amount_for_value(value: U256, price: U256, decimals: u8) -> Option<U256> {
    mul_div(value, pow10(decimals)?, price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow10_range() {
        assert_eq!(pow10(0), Some(U256::from(1)));
        assert_eq!(pow10(18), Some(U256::from(1_000_000_000_000_000_000u64)));
        assert!(pow10(77).is_some());
        assert!(pow10(78).is_none());
    }

    #[test]
    fn mul_div_zero_denominator() {
        assert_eq!(mul_div(U256::from(5), U256::from(5), U256::ZERO), None);
    }

    #[test]
    fn mul_div_overflow() {
        assert_eq!(mul_div(U256::MAX, U256::from(2), U256::from(2)), None);
    }

    #[test]
    fn value_roundtrip_truncates_down() {
        let price = U256::from(3u64);
        let value = value_in_base(price, U256::from(10u64), 0).unwrap();
        assert_eq!(value, U256::from(30u64));
        // 31 / 3 = 10.33 → 10
        assert_eq!(
            amount_for_value(U256::from(31u64), price, 0),
            Some(U256::from(10u64))
        );
    }
}
