//! Trade sizer: per-category trade amounts in raw token / base-currency units.
//!
//! | Category     | amount in                                        | min out                     |
//! |--------------|--------------------------------------------------|-----------------------------|
//! | Sell         | full balance                                     | value × (1 − slippage)      |
//! | AdjustToSell | tokens worth (share − weight) × total / 10^8     | value sold × (1 − slippage) |
//! | AdjustToBuy  | available × (weight − share) / total gap         | quote × (1 − slippage)      |
//! | Buy          | available × weight / total gap                   | quote × (1 − slippage)      |
//!
//! Each leg is sized from the category list and the stage's balance only,
//! never from another leg's outcome, so dropping one leg cannot resize
//! another in the same category. Zero-sized legs are not emitted.

use alloy_primitives::{Address, U256};

use crate::category::{Category, CategoryEntry, CategoryList};
use crate::error::InvariantViolation;
use crate::fixed;
use crate::normalize::weight_gap;
use crate::types::{SlippageTolerance, Weight, WEIGHT_SCALE};

/// A sized trade, ready to be routed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeIntent {
    pub category: Category,
    /// The classified (non-base) asset this leg trades.
    pub asset: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    /// Known up front for sell-side legs; buy-side legs derive it from the
    /// route quote.
    pub min_amount_out: Option<U256>,
}

/// Sizes legs for one vault cycle.
#[derive(Clone, Copy, Debug)]
pub struct TradeSizer {
    base_asset: Address,
    slippage: SlippageTolerance,
}

impl TradeSizer {
    pub fn new(base_asset: Address, slippage: SlippageTolerance) -> Self {
        Self {
            base_asset,
            slippage,
        }
    }

    pub fn base_asset(&self) -> Address {
        self.base_asset
    }

    pub fn slippage(&self) -> SlippageTolerance {
        self.slippage
    }

    /// Sell: liquidate the whole balance.
    pub fn size_sell(&self, list: &CategoryList) -> Result<Vec<TradeIntent>, InvariantViolation> {
        let mut intents = Vec::with_capacity(list.len());
        for entry in list.active() {
            if entry.balance.is_zero() {
                continue;
            }
            let min_out = self.min_out(Category::Sell, entry, entry.value)?;
            intents.push(self.sell_intent(Category::Sell, entry, entry.balance, min_out));
        }
        Ok(intents)
    }

    /// AdjustToSell: sell the tokens worth the excess share.
    pub fn size_adjust_to_sell(
        &self,
        list: &CategoryList,
        total_value: U256,
    ) -> Result<Vec<TradeIntent>, InvariantViolation> {
        let category = Category::AdjustToSell;
        let mut intents = Vec::with_capacity(list.len());
        for entry in list.active() {
            let excess_share =
                entry
                    .current_share
                    .checked_sub(entry.weight)
                    .ok_or(InvariantViolation::NegativeAmount {
                        category,
                        asset: entry.address(),
                        what: "excess share",
                    })?;
            let excess_value = fixed::mul_div(
                U256::from(excess_share.0),
                total_value,
                U256::from(WEIGHT_SCALE),
            )
            .ok_or(overflow(category, entry, "excess value"))?;
            if entry.asset.price.is_zero() {
                return Err(InvariantViolation::ZeroPrice {
                    category,
                    asset: entry.address(),
                });
            }
            let amount_in = entry
                .asset
                .amount_for(excess_value)
                .ok_or(overflow(category, entry, "amount in"))?;
            if amount_in > entry.balance {
                return Err(overflow(category, entry, "amount in above balance"));
            }
            if amount_in.is_zero() {
                continue;
            }
            // amount_in rounds down, so price what is actually sold
            let sold_value = entry
                .asset
                .value_of(amount_in)
                .ok_or(overflow(category, entry, "value sold"))?;
            let min_out = self.min_out(category, entry, sold_value)?;
            intents.push(self.sell_intent(category, entry, amount_in, min_out));
        }
        Ok(intents)
    }

    /// AdjustToBuy / Buy: split `available` base currency by weight gap.
    pub fn size_buy_side(
        &self,
        category: Category,
        list: &CategoryList,
        available: U256,
        total_target_percentage: Weight,
    ) -> Result<Vec<TradeIntent>, InvariantViolation> {
        debug_assert!(category.is_buy_side());
        if list.active().next().is_none() {
            return Ok(Vec::new());
        }
        if total_target_percentage.is_zero() {
            return Err(InvariantViolation::ZeroTargetPercentage {
                entries: list.active().count(),
            });
        }

        let mut intents = Vec::with_capacity(list.len());
        for entry in list.active() {
            let gap = weight_gap(category, entry)?;
            let amount_in = fixed::mul_div(
                available,
                U256::from(gap.0),
                U256::from(total_target_percentage.0),
            )
            .ok_or(overflow(category, entry, "amount in"))?;
            if amount_in.is_zero() {
                continue;
            }
            intents.push(TradeIntent {
                category,
                asset: entry.address(),
                token_in: self.base_asset,
                token_out: entry.address(),
                amount_in,
                min_amount_out: None,
            });
        }
        Ok(intents)
    }

    /// Minimum acceptable output for a quoted amount.
    pub fn min_out_for_quote(&self, intent: &TradeIntent, quoted: U256) -> Result<U256, InvariantViolation> {
        self.slippage.apply(quoted).ok_or(InvariantViolation::Overflow {
            category: intent.category,
            asset: intent.asset,
            what: "min amount out",
        })
    }

    fn min_out(
        &self,
        category: Category,
        entry: &CategoryEntry,
        value: U256,
    ) -> Result<U256, InvariantViolation> {
        self.slippage
            .apply(value)
            .ok_or(overflow(category, entry, "min amount out"))
    }

    fn sell_intent(
        &self,
        category: Category,
        entry: &CategoryEntry,
        amount_in: U256,
        min_out: U256,
    ) -> TradeIntent {
        TradeIntent {
            category,
            asset: entry.address(),
            token_in: entry.address(),
            token_out: self.base_asset,
            amount_in,
            min_amount_out: Some(min_out),
        }
    }
}

fn overflow(category: Category, entry: &CategoryEntry, what: &'static str) -> InvariantViolation {
    InvariantViolation::Overflow {
        category,
        asset: entry.address(),
        what,
    }
}
