//! # detf
//!
//! Deterministic decision engine for rebalancing an on-chain index vault:
//! given what the vault holds and what it should hold, compute the minimal
//! set of trades, size each one in the vault's base currency, and assemble
//! them into an ordered order batch.
//!
//! ## Pipeline
//!
//! ```text
//! VaultSnapshot ─▶ classify ─▶ total_target_percentage ─▶ TradeSizer ─▶ (resolver) ─▶ BatchAssembler ─▶ OrderData
//! ```
//!
//! - **Classifier** ([`classify`]): owned vs. target assets into Sell,
//!   AdjustToSell, AdjustToBuy, Buy.
//! - **Normalizer** ([`total_target_percentage`]): the aggregate weight gap
//!   buy-side capital must close.
//! - **Sizer** ([`TradeSizer`]): per-leg amounts in and post-slippage minimums.
//! - **Assembler** ([`BatchAssembler`]): resolved legs per category, in
//!   execution order, unresolved legs dropped.
//! - **Wire schema** ([`OrderData`]): versioned, validated payload.
//!
//! Route resolution, price feeds and submission belong to the caller.
//!
//! ## Fixed-Point Representation
//!
//! Amounts and prices are [`U256`]. Prices are 18-decimal base-currency
//! values per whole token; weights are [`Weight`] with denominator 10^8:
//!
//! ```
//! use detf::Weight;
//!
//! let w = Weight(12_500_000);
//! assert_eq!(format!("{w}"), "12.500000%");
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use detf::{
//!     classify, total_target_percentage, Address, Asset, Category, SlippageTolerance,
//!     TargetAllocation, TradeSizer, VaultSnapshot, Weight, U256,
//! };
//!
//! let base = Address::repeat_byte(0xbb);
//! let x = Asset::new(Address::repeat_byte(1), U256::from(1), 0);
//! let y = Asset::new(Address::repeat_byte(2), U256::from(1), 0);
//!
//! // Empty vault holding 1000 units of base currency, 50/50 target
//! let snapshot = VaultSnapshot::from_parts(
//!     Address::repeat_byte(0xee),
//!     base,
//!     U256::from(1000),
//!     vec![],
//!     vec![
//!         TargetAllocation { asset: x, weight: Weight(50_000_000) },
//!         TargetAllocation { asset: y, weight: Weight(50_000_000) },
//!     ],
//! )
//! .unwrap();
//!
//! let classification = classify(&snapshot).unwrap();
//! assert_eq!(classification.buy.len(), 2);
//!
//! let gap = total_target_percentage(&classification).unwrap();
//! assert_eq!(gap, Weight::FULL);
//!
//! let sizer = TradeSizer::new(base, SlippageTolerance::from_bps(50).unwrap());
//! let legs = sizer
//!     .size_buy_side(Category::Buy, &classification.buy, snapshot.base_balance, gap)
//!     .unwrap();
//! assert_eq!(legs[0].amount_in, U256::from(500));
//! assert_eq!(legs[1].amount_in, U256::from(500));
//! ```

pub mod batch;
pub mod category;
pub mod classify;
mod error;
pub mod fixed;
pub mod normalize;
pub mod sizing;
mod snapshot;
mod types;
pub mod wire;

// Re-export public API
pub use batch::{BatchAssembler, DropReason, LegStatus, OrderBatch, Route, TradeLeg};
pub use category::{Category, CategoryEntry, CategoryList};
pub use classify::{Classification, classify};
pub use error::InvariantViolation;
pub use normalize::{total_target_percentage, weight_gap};
pub use sizing::{TradeIntent, TradeSizer};
pub use snapshot::VaultSnapshot;
pub use types::{
    Address, Asset, BPS_SCALE, Position, SlippageTolerance, TargetAllocation, U256, WEIGHT_SCALE,
    Weight, is_sentinel,
};
pub use wire::{ORDER_DATA_VERSION, OrderData, SchemaError};
