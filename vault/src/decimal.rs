//! Serde adapter writing `U256` as a base-10 string.
//!
//! Use with `#[serde(with = "detf_vault::decimal")]`. State files carry raw
//! token amounts, which are easier to audit in decimal than in hex.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let s = String::deserialize(deserializer)?;
    U256::from_str_radix(s.trim(), 10).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "super")]
        amount: U256,
    }

    #[test]
    fn writes_base_ten() {
        let w = Wrapper {
            amount: U256::from(1_500_000_000_000_000_000u128),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"amount":"1500000000000000000"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn rejects_hex() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"amount":"0x10"}"#).is_err());
    }
}
