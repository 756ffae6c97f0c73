//! Snapshot acquisition: vault reads plus prices, before any decision.
//!
//! Any read failure here aborts the cycle as [`Error::DataFetch`]; no
//! partial snapshot ever reaches the classifier.

use detf::fixed::pow10;
use detf::{Address, Asset, Position, TargetAllocation, U256, VaultSnapshot, is_sentinel};
use detf_vault::{PriceSource, Vault, lowercase_price_id, price_id};
use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::allocation;
use crate::error::{Error, Result};

/// Price one asset, retrying once with the lower-cased identifier.
///
/// A failed or zero answer on the checksummed id triggers the retry; a
/// failed or zero answer on the retry is final.
pub fn fetch_price(source: &dyn PriceSource, asset: &Address) -> Result<U256> {
    let what = || format!("price of {asset}");
    match source.price(&price_id(asset)) {
        Ok(price) if !price.is_zero() => return Ok(price),
        Ok(_) => debug!("zero price for {asset}, retrying lower-cased id"),
        Err(e) => debug!("price lookup for {asset} failed ({e}), retrying lower-cased id"),
    }
    match source.price(&lowercase_price_id(asset)) {
        Ok(price) if !price.is_zero() => Ok(price),
        Ok(_) => Err(Error::fetch(what(), "zero price")),
        Err(e) => Err(Error::fetch(what(), e)),
    }
}

/// Prices and decimals for one cycle. Each asset is queried once.
pub struct PriceBook<'a> {
    vault: &'a dyn Vault,
    source: &'a dyn PriceSource,
    base: Address,
    assets: FxHashMap<Address, Asset>,
}

impl<'a> PriceBook<'a> {
    pub fn new(vault: &'a dyn Vault, source: &'a dyn PriceSource, base: Address) -> Self {
        Self {
            vault,
            source,
            base,
            assets: FxHashMap::default(),
        }
    }

    /// The asset with this cycle's price. The base asset is worth exactly one.
    pub fn asset(&mut self, address: Address) -> Result<Asset> {
        if let Some(asset) = self.assets.get(&address) {
            return Ok(*asset);
        }
        let asset = if address == self.base {
            let one = pow10(18).ok_or_else(|| Error::fetch("base price", "overflow"))?;
            Asset::new(address, one, 18)
        } else {
            let price = fetch_price(self.source, &address)?;
            let decimals = self
                .vault
                .decimals(address)
                .map_err(|e| Error::fetch(format!("decimals of {address}"), e))?;
            Asset::new(address, price, decimals)
        };
        self.assets.insert(address, asset);
        Ok(asset)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Read a full snapshot of `vault`.
pub fn fetch_snapshot(
    vault: &dyn Vault,
    prices: &dyn PriceSource,
    strict_weights: bool,
) -> Result<VaultSnapshot> {
    let id = vault.id();
    let base = vault
        .base_asset()
        .map_err(|e| Error::fetch("base asset", e))?;
    let base_balance = vault
        .base_balance()
        .map_err(|e| Error::fetch("base balance", e))?;
    let owned = vault
        .owned_assets()
        .map_err(|e| Error::fetch("owned assets", e))?;
    let target_assets = vault
        .target_assets()
        .map_err(|e| Error::fetch("target assets", e))?;
    let target_weights = vault
        .target_weights()
        .map_err(|e| Error::fetch("target weights", e))?;

    let allocation = allocation::validate(
        &allocation::pair(target_assets, target_weights)?,
        strict_weights,
    )?;
    if allocation.iter().any(|t| t.address == base) {
        return Err(Error::Allocation(format!(
            "base asset {base} cannot be a target"
        )));
    }

    let mut book = PriceBook::new(vault, prices, base);

    // co-indexed with `owned` for the cross-check below
    let mut owned_prices = Vec::with_capacity(owned.len());
    let mut holdings = Vec::with_capacity(owned.len());
    for &address in &owned {
        if is_sentinel(&address) || address == base {
            owned_prices.push(U256::ZERO);
            continue;
        }
        let asset = book.asset(address)?;
        owned_prices.push(asset.price);
        let (balance, value) = vault
            .token_balance(address, asset.price)
            .map_err(|e| Error::fetch(format!("balance of {address}"), e))?;
        holdings.push(Position {
            asset,
            balance,
            value,
        });
    }

    let mut targets = Vec::with_capacity(allocation.len());
    for t in &allocation {
        targets.push(TargetAllocation {
            asset: book.asset(t.address)?,
            weight: t.weight,
        });
    }

    let snapshot = VaultSnapshot::from_parts(id, base, base_balance, holdings, targets)
        .ok_or_else(|| Error::fetch("total value", "overflow"))?;

    match vault.total_balance_in_base(&owned_prices) {
        Ok(reported) if reported != snapshot.total_value => warn!(
            "vault {id} reports total {reported}, snapshot sums to {}",
            snapshot.total_value
        ),
        Ok(_) => {}
        Err(e) => warn!("vault {id} total balance unavailable: {e}"),
    }
    debug!(
        "snapshot {id}: {} holdings, {} targets, {} priced assets, total {}",
        snapshot.holdings.len(),
        snapshot.targets.len(),
        book.len(),
        snapshot.total_value
    );
    Ok(snapshot)
}
