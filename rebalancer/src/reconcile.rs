//! Post-submission verification: realized vs. target composition.

use detf::{Address, VaultSnapshot, Weight};
use serde::Serialize;

/// Verification report comparing realized and target shares.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub vault: Address,
    pub total_value: String,
    pub entries: Vec<VerificationEntry>,
    /// Uninvested base currency as a percentage of total value.
    pub base_pct: f64,
    pub tracking_error_pct: f64,
}

/// One asset's verification entry. Percentages are 0–100.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationEntry {
    pub asset: Address,
    pub target_pct: f64,
    pub realized_pct: f64,
    pub diff_pct: f64,
}

fn pct(w: Option<Weight>) -> f64 {
    w.unwrap_or_default().as_fraction() * 100.0
}

/// Compare a snapshot's composition against its own targets.
///
/// Targets come first in allocation order, followed by holdings that are
/// not targeted. Tracking error is the RMS of the per-asset differences.
pub fn verify(snapshot: &VaultSnapshot) -> VerificationReport {
    let total = snapshot.total_value;
    let mut entries = Vec::new();

    for t in snapshot.active_targets() {
        let realized = snapshot
            .holding(&t.asset.address)
            .and_then(|p| Weight::share_of(p.value, total));
        let target_pct = pct(Some(t.weight));
        let realized_pct = pct(realized);
        entries.push(VerificationEntry {
            asset: t.asset.address,
            target_pct,
            realized_pct,
            diff_pct: realized_pct - target_pct,
        });
    }
    for p in snapshot.active_holdings() {
        if entries.iter().any(|e| e.asset == p.asset.address) {
            continue;
        }
        let realized_pct = pct(Weight::share_of(p.value, total));
        entries.push(VerificationEntry {
            asset: p.asset.address,
            target_pct: 0.0,
            realized_pct,
            diff_pct: realized_pct,
        });
    }

    let sum_sq: f64 = entries.iter().map(|e| e.diff_pct * e.diff_pct).sum();
    let tracking_error_pct = (sum_sq / entries.len().max(1) as f64).sqrt();

    VerificationReport {
        vault: snapshot.vault,
        total_value: total.to_string(),
        base_pct: pct(Weight::share_of(snapshot.base_balance, total)),
        entries,
        tracking_error_pct,
    }
}

impl std::fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "VERIFICATION ({}):", self.vault)?;
        writeln!(
            f,
            "  {:42} {:>10} {:>10} {:>10}",
            "Asset", "Target%", "Actual%", "Diff%"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:42} {:>9.4}% {:>9.4}% {:>+9.4}%",
                e.asset.to_string(),
                e.target_pct,
                e.realized_pct,
                e.diff_pct,
            )?;
        }
        writeln!(f, "  {:42} {:>10} {:>9.4}%", "(base currency)", "", self.base_pct)?;
        writeln!(f, "\n  Tracking error: {:.4}%", self.tracking_error_pct)?;
        Ok(())
    }
}
