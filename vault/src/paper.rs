//! Paper vault: an in-memory [`Vault`] with a JSON state file.
//!
//! Submissions execute at the state's token prices, leg by leg, against a
//! scratch copy of the balances; the copy replaces the live state only if
//! every leg succeeds, so a revert leaves the vault untouched.
//!
//! ```ignore
//! use detf_vault::paper::PaperVault;
//!
//! let vault = PaperVault::builder(vault_id, weth)
//!     .base_balance(U256::from(10).pow(U256::from(18)))
//!     .with_token(cake, 18, cake_price)
//!     .with_target(cake, Weight::FULL)
//!     .build();
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use detf::fixed::pow10;
use detf::{Address, Asset, OrderData, U256, Weight};
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::router::StaticRouter;
use crate::types::{Holding, Pool, Receipt, TargetWeight, TokenInfo};
use crate::{PriceSource, Vault, lowercase_price_id, price_id};

/// Everything a paper vault (and its feed and router) is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperState {
    pub vault: Address,
    pub base_asset: Address,
    #[serde(with = "crate::decimal")]
    pub base_balance: U256,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub targets: Vec<TargetWeight>,
    #[serde(default)]
    pub pools: Vec<Pool>,
}

impl PaperState {
    /// Load a state file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Read(format!("{}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VaultError::Read(format!("invalid state: {e}")))
    }

    /// Write the state file back.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Other(format!("encode state: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| VaultError::Other(format!("{}: {e}", path.display())))
    }

    pub fn token(&self, address: Address) -> Option<&TokenInfo> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn holding(&self, address: Address) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.address == address)
    }

    /// Price and precision lookup for this state's tokens.
    pub fn table(&self) -> TokenTable {
        TokenTable::new(self.base_asset, &self.tokens)
    }

    fn balance_of(&self, token: Address) -> U256 {
        if token == self.base_asset {
            return self.base_balance;
        }
        self.holding(token).map_or(U256::ZERO, |h| h.balance)
    }

    fn debit(&mut self, token: Address, amount: U256) -> Option<()> {
        if token == self.base_asset {
            self.base_balance = self.base_balance.checked_sub(amount)?;
            return Some(());
        }
        let h = self.holdings.iter_mut().find(|h| h.address == token)?;
        h.balance = h.balance.checked_sub(amount)?;
        Some(())
    }

    fn credit(&mut self, token: Address, amount: U256) -> Option<()> {
        if token == self.base_asset {
            self.base_balance = self.base_balance.checked_add(amount)?;
            return Some(());
        }
        match self.holdings.iter_mut().find(|h| h.address == token) {
            Some(h) => h.balance = h.balance.checked_add(amount)?,
            None => self.holdings.push(Holding {
                address: token,
                balance: amount,
            }),
        }
        Some(())
    }
}

/// Token prices and decimals, with the base asset priced at one.
#[derive(Debug, Clone)]
pub struct TokenTable {
    base: Address,
    tokens: FxHashMap<Address, TokenInfo>,
}

impl TokenTable {
    pub fn new(base: Address, tokens: &[TokenInfo]) -> Self {
        Self {
            base,
            tokens: tokens.iter().map(|t| (t.address, *t)).collect(),
        }
    }

    pub fn asset(&self, address: Address) -> Option<Asset> {
        match self.tokens.get(&address) {
            Some(t) => Some(Asset::new(address, t.price, t.decimals)),
            None if address == self.base => Some(Asset::new(address, pow10(18)?, 18)),
            None => None,
        }
    }

    /// Convert `amount` of `from` into `to` at table prices.
    pub fn convert(&self, amount: U256, from: Address, to: Address) -> Option<U256> {
        let value = self.asset(from)?.value_of(amount)?;
        self.asset(to)?.amount_for(value)
    }

    pub fn value(&self, address: Address, amount: U256) -> Option<U256> {
        self.asset(address)?.value_of(amount)
    }
}

struct Inner {
    state: PaperState,
    revert_reason: Option<String>,
    read_failure: Option<String>,
    submissions: Vec<OrderData>,
}

/// Builder for [`PaperVault`].
pub struct PaperVaultBuilder {
    state: PaperState,
    revert_reason: Option<String>,
}

impl PaperVaultBuilder {
    pub fn base_balance(mut self, amount: U256) -> Self {
        self.state.base_balance = amount;
        self
    }

    pub fn with_token(mut self, address: Address, decimals: u8, price: U256) -> Self {
        self.state.tokens.push(TokenInfo {
            address,
            decimals,
            price,
            lowercase_only: false,
        });
        self
    }

    pub fn with_holding(mut self, address: Address, balance: U256) -> Self {
        self.state.holdings.push(Holding { address, balance });
        self
    }

    pub fn with_target(mut self, address: Address, weight: Weight) -> Self {
        self.state.targets.push(TargetWeight { address, weight });
        self
    }

    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.state.pools.push(pool);
        self
    }

    /// Reject every submission with `reason`.
    pub fn revert_with(mut self, reason: &str) -> Self {
        self.revert_reason = Some(reason.to_string());
        self
    }

    pub fn build(self) -> PaperVault {
        let vault = PaperVault::from_state(self.state);
        if let Some(reason) = self.revert_reason {
            vault.set_revert(Some(reason));
        }
        vault
    }
}

/// An in-memory vault that records submissions for inspection.
pub struct PaperVault {
    id: Address,
    inner: Mutex<Inner>,
}

impl PaperVault {
    pub fn builder(vault: Address, base_asset: Address) -> PaperVaultBuilder {
        PaperVaultBuilder {
            state: PaperState {
                vault,
                base_asset,
                base_balance: U256::ZERO,
                tokens: Vec::new(),
                holdings: Vec::new(),
                targets: Vec::new(),
                pools: Vec::new(),
            },
            revert_reason: None,
        }
    }

    pub fn from_state(state: PaperState) -> Self {
        Self {
            id: state.vault,
            inner: Mutex::new(Inner {
                state,
                revert_reason: None,
                read_failure: None,
                submissions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Other("paper vault state poisoned".into()))
    }

    /// Lock for a read, failing if reads are set to fail.
    fn read(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.lock()?;
        if let Some(reason) = &inner.read_failure {
            return Err(VaultError::Read(reason.clone()));
        }
        Ok(inner)
    }

    /// Current state (balances reflect executed submissions).
    pub fn state(&self) -> Result<PaperState> {
        Ok(self.lock()?.state.clone())
    }

    /// Every accepted submission, oldest first.
    pub fn submissions(&self) -> Vec<OrderData> {
        self.lock().map(|i| i.submissions.clone()).unwrap_or_default()
    }

    /// Make submissions revert with `reason` (or stop reverting).
    pub fn set_revert(&self, reason: Option<String>) {
        if let Ok(mut inner) = self.lock() {
            inner.revert_reason = reason;
        }
    }

    /// Make every read fail with `reason` (or stop failing).
    pub fn set_read_failure(&self, reason: Option<String>) {
        if let Ok(mut inner) = self.lock() {
            inner.read_failure = reason;
        }
    }

    /// Price feed answering for this vault's tokens.
    pub fn price_feed(&self) -> Result<PaperPriceFeed> {
        Ok(PaperPriceFeed::from_tokens(&self.lock()?.state.tokens))
    }

    /// Router over this vault's pools.
    pub fn router(&self) -> Result<StaticRouter> {
        let inner = self.lock()?;
        Ok(StaticRouter::new(
            inner.state.table(),
            inner.state.pools.clone(),
        ))
    }
}

impl Vault for PaperVault {
    fn id(&self) -> Address {
        self.id
    }

    fn base_asset(&self) -> Result<Address> {
        Ok(self.read()?.state.base_asset)
    }

    fn owned_assets(&self) -> Result<Vec<Address>> {
        Ok(self.read()?.state.holdings.iter().map(|h| h.address).collect())
    }

    fn target_assets(&self) -> Result<Vec<Address>> {
        Ok(self.read()?.state.targets.iter().map(|t| t.address).collect())
    }

    fn target_weights(&self) -> Result<Vec<Weight>> {
        Ok(self.read()?.state.targets.iter().map(|t| t.weight).collect())
    }

    fn decimals(&self, asset: Address) -> Result<u8> {
        let inner = self.read()?;
        match inner.state.token(asset) {
            Some(t) => Ok(t.decimals),
            None if asset == inner.state.base_asset => Ok(18),
            None => Err(VaultError::UnknownAsset(price_id(&asset))),
        }
    }

    fn token_balance(&self, asset: Address, price: U256) -> Result<(U256, U256)> {
        let decimals = self.decimals(asset)?;
        let balance = self.read()?.state.balance_of(asset);
        let value = Asset::new(asset, price, decimals)
            .value_of(balance)
            .ok_or_else(|| VaultError::Read(format!("value of {asset} overflows")))?;
        Ok((balance, value))
    }

    fn total_balance_in_base(&self, prices: &[U256]) -> Result<U256> {
        let owned = self.owned_assets()?;
        if owned.len() != prices.len() {
            return Err(VaultError::Read(format!(
                "{} prices for {} owned assets",
                prices.len(),
                owned.len()
            )));
        }
        let mut total = self.base_balance()?;
        for (asset, price) in owned.into_iter().zip(prices) {
            let (_, value) = self.token_balance(asset, *price)?;
            total = total
                .checked_add(value)
                .ok_or_else(|| VaultError::Read("total balance overflows".into()))?;
        }
        Ok(total)
    }

    fn base_balance(&self) -> Result<U256> {
        Ok(self.read()?.state.base_balance)
    }

    fn submit_rebalance(&self, order: &OrderData) -> Result<Receipt> {
        let mut inner = self.lock()?;
        if let Some(reason) = &inner.revert_reason {
            return Err(VaultError::Revert(reason.clone()));
        }

        let table = inner.state.table();
        let mut scratch = inner.state.clone();
        for (index, (category, leg)) in order.legs().enumerate() {
            let (Some(token_in), Some(token_out)) = (leg.token_in(), leg.token_out()) else {
                return Err(VaultError::Revert(format!("{category} leg {index}: empty path")));
            };
            scratch.debit(token_in, leg.amount_in).ok_or_else(|| {
                VaultError::Revert(format!(
                    "{category} leg {index}: insufficient {token_in} balance"
                ))
            })?;
            let filled = table
                .convert(leg.amount_in, token_in, token_out)
                .ok_or_else(|| {
                    VaultError::Revert(format!(
                        "{category} leg {index}: no fill price for {token_in} -> {token_out}"
                    ))
                })?;
            if filled < leg.amount_out {
                return Err(VaultError::Revert(format!(
                    "{category} leg {index}: output {filled} below minimum {}",
                    leg.amount_out
                )));
            }
            scratch.credit(token_out, filled).ok_or_else(|| {
                VaultError::Revert(format!("{category} leg {index}: balance overflow"))
            })?;
            debug!(
                "paper fill {category}: {} {token_in} -> {filled} {token_out}",
                leg.amount_in
            );
        }
        scratch.holdings.retain(|h| !h.balance.is_zero());

        inner.state = scratch;
        inner.submissions.push(order.clone());
        Ok(Receipt {
            sequence: inner.submissions.len() as u64,
            legs: order.leg_count(),
        })
    }
}

/// Static price table keyed by identifier string.
#[derive(Debug, Clone, Default)]
pub struct PaperPriceFeed {
    prices: FxHashMap<String, U256>,
}

impl PaperPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index each token under its checksummed id, or only its lower-cased id
    /// when the token is marked `lowercase_only`.
    pub fn from_tokens(tokens: &[TokenInfo]) -> Self {
        let prices = tokens
            .iter()
            .map(|t| {
                let id = if t.lowercase_only {
                    lowercase_price_id(&t.address)
                } else {
                    price_id(&t.address)
                };
                (id, t.price)
            })
            .collect();
        Self { prices }
    }

    pub fn with_price(mut self, id: impl Into<String>, price: U256) -> Self {
        self.prices.insert(id.into(), price);
        self
    }
}

impl PriceSource for PaperPriceFeed {
    fn price(&self, id: &str) -> Result<U256> {
        self.prices
            .get(id)
            .copied()
            .ok_or_else(|| VaultError::UnknownAsset(id.to_string()))
    }
}
