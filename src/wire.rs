//! Versioned order-data schema handed to the vault.
//!
//! Groups appear in the order the vault consumes them: Sell, Adjust
//! (metadata only), AdjustToSell, AdjustToBuy, Buy. A category with no
//! entries is `None` and omitted on serialisation instead of being padded
//! with empty nested lists.

use alloy_primitives::{Address, U256};
use rustc_hash::FxHashMap;

use crate::batch::{OrderBatch, TradeLeg};
use crate::category::{Category, CategoryList};
use crate::classify::Classification;
use crate::types::{Weight, is_sentinel};

/// Current schema version. Bump on any field layout change.
pub const ORDER_DATA_VERSION: u16 = 1;

/// Co-indexed asset metadata for one group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetGroup {
    pub assets: Vec<Address>,
    pub weights: Vec<Weight>,
    pub prices: Vec<U256>,
}

impl AssetGroup {
    fn from_list(list: &CategoryList) -> Self {
        Self {
            assets: list.assets(),
            weights: list.weights(),
            prices: list.prices(),
        }
    }
}

/// Asset metadata plus the legs of one trade category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryOrders {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub group: AssetGroup,
    pub legs: Vec<TradeLeg>,
}

/// Full submission payload for one rebalance.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderData {
    pub version: u16,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub sell: Option<CategoryOrders>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub adjust: Option<AssetGroup>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub adjust_to_sell: Option<CategoryOrders>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub adjust_to_buy: Option<CategoryOrders>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub buy: Option<CategoryOrders>,
}

/// Schema validation failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported order-data version {found} (expected {expected})")]
    Version { found: u16, expected: u16 },

    #[error("{group}: {assets} assets but {weights} weights and {prices} prices")]
    Misaligned {
        group: &'static str,
        assets: usize,
        weights: usize,
        prices: usize,
    },

    #[error("{category}: leg {index} has an empty path")]
    EmptyPath { category: Category, index: usize },

    #[error("{category}: leg {index} path does not {what} base asset {base}")]
    BaseEndpoint {
        category: Category,
        index: usize,
        what: &'static str,
        base: Address,
    },

    #[error("asset {asset} listed in both {first} and {second}")]
    Duplicate {
        asset: Address,
        first: Category,
        second: Category,
    },
}

impl OrderData {
    /// Build the payload from a classification and its assembled batch.
    ///
    /// Categories with neither listed assets nor legs are omitted.
    pub fn new(classification: &Classification, batch: &OrderBatch) -> Self {
        let group = |category: Category| {
            let list = classification.list(category);
            let legs = batch.legs(category);
            (!list.is_empty() || !legs.is_empty()).then(|| CategoryOrders {
                group: AssetGroup::from_list(list),
                legs: legs.to_vec(),
            })
        };
        Self {
            version: ORDER_DATA_VERSION,
            sell: group(Category::Sell),
            adjust: (!classification.adjust.is_empty())
                .then(|| AssetGroup::from_list(&classification.adjust)),
            adjust_to_sell: group(Category::AdjustToSell),
            adjust_to_buy: group(Category::AdjustToBuy),
            buy: group(Category::Buy),
        }
    }

    pub fn orders(&self, category: Category) -> Option<&CategoryOrders> {
        match category {
            Category::Sell => self.sell.as_ref(),
            Category::AdjustToSell => self.adjust_to_sell.as_ref(),
            Category::AdjustToBuy => self.adjust_to_buy.as_ref(),
            Category::Buy => self.buy.as_ref(),
        }
    }

    /// All legs in execution order.
    pub fn legs(&self) -> impl Iterator<Item = (Category, &TradeLeg)> {
        Category::EXECUTION_ORDER.into_iter().flat_map(move |c| {
            self.orders(c)
                .into_iter()
                .flat_map(move |o| o.legs.iter().map(move |leg| (c, leg)))
        })
    }

    pub fn leg_count(&self) -> usize {
        self.legs().count()
    }

    /// Validate the payload against `base_asset`.
    ///
    /// Sell-side legs must end at the base asset and buy-side legs must start
    /// there. Sentinel assets are ignored in the duplicate check.
    pub fn validate(&self, base_asset: Address) -> Result<(), SchemaError> {
        if self.version != ORDER_DATA_VERSION {
            return Err(SchemaError::Version {
                found: self.version,
                expected: ORDER_DATA_VERSION,
            });
        }
        if let Some(adjust) = &self.adjust {
            check_aligned("adjust", adjust)?;
        }

        let mut seen: FxHashMap<Address, Category> = FxHashMap::default();
        for category in Category::EXECUTION_ORDER {
            let Some(orders) = self.orders(category) else {
                continue;
            };
            check_aligned(category.as_str(), &orders.group)?;

            for asset in orders.group.assets.iter().filter(|a| !is_sentinel(a)) {
                if let Some(first) = seen.insert(*asset, category) {
                    return Err(SchemaError::Duplicate {
                        asset: *asset,
                        first,
                        second: category,
                    });
                }
            }

            for (index, leg) in orders.legs.iter().enumerate() {
                let (Some(first), Some(last)) = (leg.token_in(), leg.token_out()) else {
                    return Err(SchemaError::EmptyPath { category, index });
                };
                let (endpoint, what) = if category.is_buy_side() {
                    (first, "start at")
                } else {
                    (last, "end at")
                };
                if endpoint != base_asset {
                    return Err(SchemaError::BaseEndpoint {
                        category,
                        index,
                        what,
                        base: base_asset,
                    });
                }
            }
        }
        Ok(())
    }

    /// Encode as JSON.
    #[cfg(feature = "persistence")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Decode from JSON. Call [`validate`](Self::validate) before use.
    #[cfg(feature = "persistence")]
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn check_aligned(group: &'static str, g: &AssetGroup) -> Result<(), SchemaError> {
    if g.assets.len() != g.weights.len() || g.assets.len() != g.prices.len() {
        return Err(SchemaError::Misaligned {
            group,
            assets: g.assets.len(),
            weights: g.weights.len(),
            prices: g.prices.len(),
        });
    }
    Ok(())
}
