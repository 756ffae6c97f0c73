//! Order batch assembly.
//!
//! Legs are appended per category and kept in insertion order. The batch
//! always executes Sell → AdjustToSell → AdjustToBuy → Buy; there is no
//! sorting, and unresolved or sentinel legs are left out rather than padded.

use alloy_primitives::{Address, U256};

use crate::category::Category;
use crate::sizing::TradeIntent;
use crate::types::is_sentinel;

/// A route quoted by the liquidity resolver.
///
/// An empty `path` means no route met the resolver's liquidity threshold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    pub venue: Address,
    /// Hop tokens, input first, output last.
    pub path: Vec<Address>,
    pub amount_out: U256,
}

impl Route {
    /// The "insufficient liquidity" answer.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// One swap instruction inside an order batch.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeLeg {
    pub venue: Address,
    pub path: Vec<Address>,
    pub amount_in: U256,
    /// Post-slippage minimum.
    pub amount_out: U256,
}

impl TradeLeg {
    pub fn token_in(&self) -> Option<Address> {
        self.path.first().copied()
    }

    pub fn token_out(&self) -> Option<Address> {
        self.path.last().copied()
    }
}

/// Why a sized leg did not make it into the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DropReason {
    /// The resolver returned an empty path.
    InsufficientLiquidity,
    /// The leg refers to the zero-address padding slot.
    Sentinel,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::InsufficientLiquidity => write!(f, "insufficient liquidity"),
            DropReason::Sentinel => write!(f, "sentinel slot"),
        }
    }
}

/// Outcome of offering one leg to the assembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LegStatus {
    Included,
    Dropped(DropReason),
}

/// Trade legs grouped by category, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderBatch {
    pub sell: Vec<TradeLeg>,
    pub adjust_to_sell: Vec<TradeLeg>,
    pub adjust_to_buy: Vec<TradeLeg>,
    pub buy: Vec<TradeLeg>,
}

impl OrderBatch {
    pub fn legs(&self, category: Category) -> &[TradeLeg] {
        match category {
            Category::Sell => &self.sell,
            Category::AdjustToSell => &self.adjust_to_sell,
            Category::AdjustToBuy => &self.adjust_to_buy,
            Category::Buy => &self.buy,
        }
    }

    fn legs_mut(&mut self, category: Category) -> &mut Vec<TradeLeg> {
        match category {
            Category::Sell => &mut self.sell,
            Category::AdjustToSell => &mut self.adjust_to_sell,
            Category::AdjustToBuy => &mut self.adjust_to_buy,
            Category::Buy => &mut self.buy,
        }
    }

    /// All legs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &TradeLeg)> {
        Category::EXECUTION_ORDER
            .into_iter()
            .flat_map(move |c| self.legs(c).iter().map(move |leg| (c, leg)))
    }

    pub fn len(&self) -> usize {
        Category::EXECUTION_ORDER
            .iter()
            .map(|&c| self.legs(c).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Categories with at least one leg, in execution order.
    pub fn categories(&self) -> Vec<Category> {
        Category::EXECUTION_ORDER
            .into_iter()
            .filter(|&c| !self.legs(c).is_empty())
            .collect()
    }
}

/// Collects resolved legs into an [`OrderBatch`].
#[derive(Debug, Default)]
pub struct BatchAssembler {
    batch: OrderBatch,
}

impl BatchAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a sized leg with its resolved route and post-slippage minimum.
    ///
    /// Sentinel assets and empty routes are dropped; everything else is
    /// appended to the leg's category as-is.
    pub fn push(&mut self, intent: &TradeIntent, route: &Route, amount_out: U256) -> LegStatus {
        if is_sentinel(&intent.asset) {
            return LegStatus::Dropped(DropReason::Sentinel);
        }
        if route.is_empty() {
            return LegStatus::Dropped(DropReason::InsufficientLiquidity);
        }
        self.batch.legs_mut(intent.category).push(TradeLeg {
            venue: route.venue,
            path: route.path.clone(),
            amount_in: intent.amount_in,
            amount_out,
        });
        LegStatus::Included
    }

    /// Legs collected so far for one category.
    pub fn legs(&self, category: Category) -> &[TradeLeg] {
        self.batch.legs(category)
    }

    pub fn finish(self) -> OrderBatch {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn intent(category: Category, asset: u8, amount: u64) -> TradeIntent {
        let (token_in, token_out) = if category.is_buy_side() {
            (addr(0xbb), addr(asset))
        } else {
            (addr(asset), addr(0xbb))
        };
        TradeIntent {
            category,
            asset: addr(asset),
            token_in,
            token_out,
            amount_in: U256::from(amount),
            min_amount_out: None,
        }
    }

    fn route(i: &TradeIntent) -> Route {
        Route {
            venue: addr(0xfa),
            path: vec![i.token_in, i.token_out],
            amount_out: U256::from(1),
        }
    }

    #[test]
    fn keeps_execution_order_regardless_of_push_order() {
        let mut asm = BatchAssembler::new();
        let buy = intent(Category::Buy, 3, 30);
        let sell = intent(Category::Sell, 1, 10);
        asm.push(&buy, &route(&buy), U256::from(1));
        asm.push(&sell, &route(&sell), U256::from(1));
        let batch = asm.finish();
        let order: Vec<Category> = batch.iter().map(|(c, _)| c).collect();
        assert_eq!(order, vec![Category::Sell, Category::Buy]);
        assert_eq!(batch.categories(), vec![Category::Sell, Category::Buy]);
    }

    #[test]
    fn preserves_insertion_order_within_category() {
        let mut asm = BatchAssembler::new();
        for (asset, amount) in [(9u8, 1u64), (2, 50), (5, 7)] {
            let i = intent(Category::Buy, asset, amount);
            assert_eq!(asm.push(&i, &route(&i), U256::ZERO), LegStatus::Included);
        }
        let amounts: Vec<U256> = asm.legs(Category::Buy).iter().map(|l| l.amount_in).collect();
        assert_eq!(amounts, vec![U256::from(1), U256::from(50), U256::from(7)]);
    }

    #[test]
    fn empty_route_is_dropped() {
        let mut asm = BatchAssembler::new();
        let i = intent(Category::AdjustToBuy, 4, 10);
        assert_eq!(
            asm.push(&i, &Route::none(), U256::ZERO),
            LegStatus::Dropped(DropReason::InsufficientLiquidity)
        );
        assert!(asm.finish().is_empty());
    }

    #[test]
    fn sentinel_is_dropped() {
        let mut asm = BatchAssembler::new();
        let i = intent(Category::Sell, 0, 10);
        assert_eq!(
            asm.push(&i, &route(&i), U256::ZERO),
            LegStatus::Dropped(DropReason::Sentinel)
        );
    }

    #[test]
    fn leg_endpoints() {
        let i = intent(Category::Sell, 1, 10);
        let mut asm = BatchAssembler::new();
        asm.push(&i, &route(&i), U256::from(9));
        let batch = asm.finish();
        let leg = &batch.sell[0];
        assert_eq!(leg.token_in(), Some(addr(1)));
        assert_eq!(leg.token_out(), Some(addr(0xbb)));
        assert_eq!(leg.amount_out, U256::from(9));
        assert_eq!(batch.len(), 1);
    }
}
