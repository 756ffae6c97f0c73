//! Target allocation ingestion and validation.
//!
//! The classifier tolerates any weights; skew is caught here, at the
//! boundary where targets are read from the vault.

use detf::{Address, WEIGHT_SCALE, Weight, is_sentinel};
use detf_vault::TargetWeight;
use log::{debug, warn};
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

/// Zip co-indexed target assets and weights.
///
/// A length mismatch means the reads were inconsistent, which is a fetch
/// error rather than a bad allocation.
pub fn pair(assets: Vec<Address>, weights: Vec<Weight>) -> Result<Vec<TargetWeight>> {
    if assets.len() != weights.len() {
        return Err(Error::fetch(
            "target allocation",
            format!("{} assets but {} weights", assets.len(), weights.len()),
        ));
    }
    Ok(assets
        .into_iter()
        .zip(weights)
        .map(|(address, weight)| TargetWeight { address, weight })
        .collect())
}

/// Validate an allocation and return the entries that take part in
/// classification.
///
/// - sentinel slots and zero weights are dropped
/// - duplicates and weights above 100% are rejected
/// - a sum other than 100% is rejected when `strict`, logged otherwise
pub fn validate(targets: &[TargetWeight], strict: bool) -> Result<Vec<TargetWeight>> {
    let mut seen = FxHashSet::default();
    let mut kept = Vec::with_capacity(targets.len());
    let mut sum: u64 = 0;

    for t in targets {
        if is_sentinel(&t.address) {
            continue;
        }
        if !seen.insert(t.address) {
            return Err(Error::Allocation(format!("duplicate asset {}", t.address)));
        }
        if t.weight > Weight::FULL {
            return Err(Error::Allocation(format!(
                "weight for {} ({}) exceeds 100%",
                t.address, t.weight
            )));
        }
        if t.weight.is_zero() {
            debug!("dropping zero-weight target {}", t.address);
            continue;
        }
        sum += t.weight.0;
        kept.push(*t);
    }

    if sum != WEIGHT_SCALE {
        let msg = format!("weights sum to {} (expected 100%)", Weight(sum));
        if strict {
            return Err(Error::Allocation(msg));
        }
        warn!("{msg}");
    }
    Ok(kept)
}
