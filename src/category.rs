//! Trade categories and their co-indexed asset lists.

use std::fmt;

use alloy_primitives::{Address, U256};

use crate::types::{Asset, Weight};

/// The four disjoint trade categories, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Category {
    /// Owned but no longer targeted: liquidate fully.
    Sell,
    /// Owned and targeted, currently overweight.
    AdjustToSell,
    /// Owned and targeted, currently underweight.
    AdjustToBuy,
    /// Targeted but not owned.
    Buy,
}

impl Category {
    /// Sell-side legs free the capital buy-side legs consume.
    pub const EXECUTION_ORDER: [Category; 4] = [
        Category::Sell,
        Category::AdjustToSell,
        Category::AdjustToBuy,
        Category::Buy,
    ];

    pub fn is_buy_side(self) -> bool {
        matches!(self, Category::AdjustToBuy | Category::Buy)
    }

    /// The category sized after this one, if any.
    pub fn next(self) -> Option<Category> {
        match self {
            Category::Sell => Some(Category::AdjustToSell),
            Category::AdjustToSell => Some(Category::AdjustToBuy),
            Category::AdjustToBuy => Some(Category::Buy),
            Category::Buy => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Sell => "sell",
            Category::AdjustToSell => "adjust_to_sell",
            Category::AdjustToBuy => "adjust_to_buy",
            Category::Buy => "buy",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified asset.
///
/// `weight` is the target weight (zero for Sell entries); `current_share`
/// is the asset's share of the pre-trade vault value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryEntry {
    pub asset: Asset,
    pub weight: Weight,
    pub current_share: Weight,
    pub balance: U256,
    pub value: U256,
}

impl CategoryEntry {
    pub fn address(&self) -> Address {
        self.asset.address
    }
}

/// An ordered list of classified assets.
///
/// Insertion order is preserved; the parallel views (`assets`, `weights`,
/// `prices`) are co-indexed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CategoryList {
    entries: Vec<CategoryEntry>,
}

impl CategoryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CategoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    /// Entries other than the zero-address padding slot.
    pub fn active(&self) -> impl Iterator<Item = &CategoryEntry> {
        self.entries.iter().filter(|e| !e.asset.is_sentinel())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.iter().any(|e| e.asset.address == *address)
    }

    pub fn assets(&self) -> Vec<Address> {
        self.entries.iter().map(|e| e.asset.address).collect()
    }

    pub fn weights(&self) -> Vec<Weight> {
        self.entries.iter().map(|e| e.weight).collect()
    }

    pub fn prices(&self) -> Vec<U256> {
        self.entries.iter().map(|e| e.asset.price).collect()
    }
}

impl FromIterator<CategoryEntry> for CategoryList {
    fn from_iter<I: IntoIterator<Item = CategoryEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
