//! Collaborator boundary for the detf rebalancer.
//!
//! The decision engine in `detf` is pure; everything that touches the outside
//! world sits behind one of three traits:
//!
//! - [`Vault`]: the on-chain holder of the assets (reads + atomic submit)
//! - [`PriceSource`]: per-asset base-currency prices
//! - [`LiquidityResolver`]: route and output quotes for a trade intent
//!
//! Implementations:
//!
//! - **Paper** ([`paper`]): in-memory vault, price feed and router, driven by
//!   a JSON state file. Used by tests and offline runs.
//! - **CoinGecko** (feature `coingecko`): HTTP price source.

pub mod decimal;
pub mod error;
pub mod paper;
pub mod router;
pub mod types;

#[cfg(feature = "coingecko")]
pub mod coingecko;

pub use error::{Result, VaultError};
pub use types::*;

use detf::{Address, OrderData, Route, TradeIntent, U256, Weight};

/// The vault contract surface consumed by the rebalancer.
///
/// Reads reflect on-chain state at call time; nothing is cached.
pub trait Vault: Send + Sync {
    /// Vault identity (its contract address).
    fn id(&self) -> Address;

    /// The unit of account every leg starts or ends at.
    fn base_asset(&self) -> Result<Address>;

    /// Assets currently held, in vault order. May contain sentinel slots.
    fn owned_assets(&self) -> Result<Vec<Address>>;

    /// Target assets, co-indexed with [`target_weights`](Self::target_weights).
    fn target_assets(&self) -> Result<Vec<Address>>;

    fn target_weights(&self) -> Result<Vec<Weight>>;

    /// Token precision.
    fn decimals(&self, asset: Address) -> Result<u8>;

    /// Raw balance of `asset` and its value in base currency at `price`.
    fn token_balance(&self, asset: Address, price: U256) -> Result<(U256, U256)>;

    /// Total value in base currency, prices co-indexed with
    /// [`owned_assets`](Self::owned_assets). Includes the base balance.
    fn total_balance_in_base(&self, prices: &[U256]) -> Result<U256>;

    /// Uninvested base-currency balance.
    fn base_balance(&self) -> Result<U256>;

    /// Execute every leg atomically. A revert leaves the vault unchanged.
    fn submit_rebalance(&self, order: &OrderData) -> Result<Receipt>;
}

/// Source of 18-decimal base-currency prices, keyed by asset identifier string.
pub trait PriceSource: Send + Sync {
    fn price(&self, id: &str) -> Result<U256>;
}

/// Multi-venue route quoting.
///
/// An empty [`Route`] path means no route met the resolver's liquidity
/// threshold; that is an answer, not an error.
pub trait LiquidityResolver: Send + Sync {
    fn quote(&self, intent: &TradeIntent) -> Result<Route>;

    /// Quote several intents. Results are co-indexed with `intents`.
    fn quote_batch(&self, intents: &[TradeIntent]) -> Result<Vec<Route>> {
        intents.iter().map(|i| self.quote(i)).collect()
    }
}

/// Identifier a price source is queried with first (EIP-55 checksummed).
pub fn price_id(asset: &Address) -> String {
    asset.to_checksum(None)
}

/// Fallback identifier for sources that index lower-cased addresses.
pub fn lowercase_price_id(asset: &Address) -> String {
    price_id(asset).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_ids() {
        let a = Address::repeat_byte(0xab);
        let checksummed = price_id(&a);
        assert!(checksummed.starts_with("0x"));
        assert_eq!(checksummed.len(), 42);
        assert_eq!(lowercase_price_id(&a), format!("0x{}", "ab".repeat(20)));
        assert_eq!(checksummed.to_lowercase(), lowercase_price_id(&a));
    }
}
