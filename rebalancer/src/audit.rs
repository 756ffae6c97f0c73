//! JSONL audit trail logging.
//!
//! Every cycle appends events to an audit.jsonl file, one JSON object per
//! line. The log is shared by all workers of a pool; each event is written
//! and flushed under one lock so lines never interleave.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use detf::{Address, Category, Classification, LegStatus, OrderData, VaultSnapshot};
use detf_vault::Receipt;
use serde::Serialize;

use crate::cycle::{CycleState, LegReport};
use crate::error::Result;
use crate::reconcile::VerificationReport;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: Mutex<BufWriter<std::fs::File>>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{json}")?;
        writer.flush()?;
        Ok(())
    }
}

pub fn log_cycle_started(audit: &AuditLog, vault: Address, dry_run: bool) -> Result<()> {
    audit.log(
        "cycle_started",
        serde_json::json!({ "vault": vault, "dry_run": dry_run }),
    )
}

pub fn log_snapshot(audit: &AuditLog, snapshot: &VaultSnapshot) -> Result<()> {
    let holdings: Vec<_> = snapshot
        .holdings
        .iter()
        .map(|p| {
            serde_json::json!({
                "asset": p.asset.address,
                "balance": p.balance.to_string(),
                "value": p.value.to_string(),
            })
        })
        .collect();
    let targets: Vec<_> = snapshot
        .targets
        .iter()
        .map(|t| serde_json::json!({ "asset": t.asset.address, "weight": t.weight.0 }))
        .collect();

    audit.log(
        "snapshot_fetched",
        serde_json::json!({
            "vault": snapshot.vault,
            "base_balance": snapshot.base_balance.to_string(),
            "total_value": snapshot.total_value.to_string(),
            "holdings": holdings,
            "targets": targets,
        }),
    )
}

pub fn log_classified(audit: &AuditLog, vault: Address, c: &Classification) -> Result<()> {
    let lists: serde_json::Map<String, serde_json::Value> = Category::EXECUTION_ORDER
        .iter()
        .map(|&cat| (cat.as_str().to_string(), serde_json::json!(c.list(cat).assets())))
        .collect();
    audit.log(
        "classified",
        serde_json::json!({ "vault": vault, "categories": lists }),
    )
}

pub fn log_leg(audit: &AuditLog, vault: Address, leg: &LegReport) -> Result<()> {
    let (event, reason) = match leg.status {
        LegStatus::Included => ("leg_included", None),
        LegStatus::Dropped(r) => ("leg_dropped", Some(r.to_string())),
    };
    audit.log(
        event,
        serde_json::json!({
            "vault": vault,
            "category": leg.category,
            "asset": leg.asset,
            "amount_in": leg.amount_in.to_string(),
            "amount_out": leg.amount_out.to_string(),
            "path": leg.path,
            "reason": reason,
        }),
    )
}

pub fn log_batch_submitted(audit: &AuditLog, vault: Address, order: &OrderData) -> Result<()> {
    audit.log(
        "batch_submitted",
        serde_json::json!({
            "vault": vault,
            "version": order.version,
            "legs": order.leg_count(),
        }),
    )
}

pub fn log_receipt(audit: &AuditLog, vault: Address, receipt: &Receipt) -> Result<()> {
    audit.log(
        "batch_executed",
        serde_json::json!({ "vault": vault, "sequence": receipt.sequence, "legs": receipt.legs }),
    )
}

pub fn log_verified(audit: &AuditLog, report: &VerificationReport) -> Result<()> {
    let data = serde_json::to_value(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    audit.log("cycle_verified", data)
}

/// `from` is where the cycle was when the error hit; `state` is where it
/// ended up (Failed, or Idle when the cycle never started).
pub fn log_failed(
    audit: &AuditLog,
    vault: Address,
    from: CycleState,
    state: CycleState,
    error: &str,
) -> Result<()> {
    audit.log(
        "cycle_failed",
        serde_json::json!({ "vault": vault, "from": from, "state": state, "error": error }),
    )
}
