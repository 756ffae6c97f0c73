//! Operator workflows behind the CLI: load vault → cycle → persist → report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use detf::fixed::pow10;
use detf::{Category, OrderData, U256, VaultSnapshot, classify};
use detf_vault::coingecko::CoinGeckoClient;
use detf_vault::paper::{PaperState, PaperVault};
use detf_vault::router::StaticRouter;
use detf_vault::PriceSource;
use log::{error, info, warn};

use crate::audit::AuditLog;
use crate::config::{Config, PriceSourceKind};
use crate::cycle::{
    ConfirmFn, CycleOptions, CycleOutcome, Disposition, LegReport, Rebalancer, Settings,
    VaultContext,
};
use crate::error::{Error, Result};
use crate::fetch::fetch_snapshot;
use crate::pool::VaultPool;
use crate::reconcile;

/// Options for a single-vault run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    /// Write the assembled batch here as JSON.
    pub out: Option<PathBuf>,
}

/// A paper vault with the price source and router it trades against.
struct Loaded {
    path: PathBuf,
    vault: PaperVault,
    prices: Box<dyn PriceSource>,
    router: StaticRouter,
}

impl Loaded {
    fn context(&self) -> VaultContext<'_> {
        VaultContext {
            vault: &self.vault,
            prices: self.prices.as_ref(),
            resolver: &self.router,
        }
    }

    /// Persist balances after an executed batch.
    fn save(&self) -> Result<()> {
        self.vault
            .state()
            .and_then(|s| s.save(&self.path))
            .map_err(|e| state_error(&self.path, e))
    }
}

fn state_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::StateFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn load(config: &Config, path: &Path) -> Result<Loaded> {
    let state = PaperState::load(path).map_err(|e| state_error(path, e))?;
    let vault = PaperVault::from_state(state);
    let prices = price_source(config, &vault)?;
    let router = vault.router().map_err(|e| state_error(path, e))?;
    Ok(Loaded {
        path: path.to_path_buf(),
        vault,
        prices,
        router,
    })
}

fn price_source(config: &Config, vault: &PaperVault) -> Result<Box<dyn PriceSource>> {
    match config.prices.source {
        PriceSourceKind::Paper => {
            let feed = vault
                .price_feed()
                .map_err(|e| Error::Config(format!("paper price feed: {e}")))?;
            Ok(Box::new(feed))
        }
        PriceSourceKind::CoinGecko => {
            let mut client = CoinGeckoClient::new(
                &config.prices.platform,
                &config.prices.vs_currency,
                Duration::from_secs(config.prices.timeout_secs),
            )
            .map_err(|e| Error::Config(e.to_string()))?;
            if let Some(key) = &config.prices.api_key {
                client = client.with_api_key(key);
            }
            if let Some(url) = &config.prices.base_url {
                client = client.with_base_url(url);
            }
            Ok(Box::new(client))
        }
    }
}

fn rebalancer(config: &Config) -> Result<Rebalancer> {
    let audit = AuditLog::open(&config.audit_path())?;
    Ok(Rebalancer::new(Settings::from_config(config)?).with_audit(Arc::new(audit)))
}

fn confirm(order: &OrderData) -> bool {
    display_plan(order);
    println!();
    match dialoguer::Confirm::new()
        .with_prompt("Submit batch?")
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            warn!("confirmation prompt failed: {e}");
            false
        }
    }
}

/// Run one cycle against a paper vault.
pub fn run(config: &Config, state_path: &Path, opts: &RunOptions) -> Result<()> {
    let loaded = load(config, state_path)?;
    let rebalancer = rebalancer(config)?;

    let prompt: &ConfirmFn<'_> = &confirm;
    let cycle_opts = CycleOptions {
        dry_run: opts.dry_run,
        confirm: (!opts.force).then_some(prompt),
    };
    let outcome = rebalancer.run_cycle(&loaded.context(), &cycle_opts)?;

    if let (Some(out), Some(order)) = (&opts.out, &outcome.order) {
        write_order(out, order)?;
    }
    if outcome.disposition == Disposition::Submitted {
        loaded.save()?;
    }
    display_outcome(&outcome);
    println!("Audit logged to {}", config.audit_path().display());
    declined_as_abort(&outcome)
}

fn declined_as_abort(outcome: &CycleOutcome) -> Result<()> {
    match outcome.disposition {
        Disposition::Declined => Err(Error::Aborted(format!(
            "batch for vault {} not confirmed",
            outcome.vault
        ))),
        _ => Ok(()),
    }
}

/// One cycle per state file on the bounded worker pool. Never prompts.
///
/// Every vault runs to completion; the returned error is the first
/// submission revert if there was one, else the first failure.
pub fn run_all(config: &Config, state_paths: &[PathBuf], dry_run: bool) -> Result<()> {
    let loaded = state_paths
        .iter()
        .map(|p| load(config, p))
        .collect::<Result<Vec<_>>>()?;
    let rebalancer = rebalancer(config)?;
    let pool = VaultPool::new(config.workers.max_concurrent_vaults)?;
    info!(
        "rebalancing {} vaults on {} workers",
        loaded.len(),
        pool.workers()
    );

    let contexts: Vec<_> = loaded.iter().map(Loaded::context).collect();
    let results = pool.run_all(
        &rebalancer,
        &contexts,
        &CycleOptions {
            dry_run,
            confirm: None,
        },
    );

    let mut first_error = None;
    for (vault, result) in loaded.iter().zip(results) {
        match result {
            Ok(outcome) => {
                if outcome.disposition == Disposition::Submitted {
                    vault.save()?;
                }
                println!(
                    "{}: {:?}, {} legs included, {} dropped",
                    vault.path.display(),
                    outcome.disposition,
                    outcome.included().count(),
                    outcome.dropped().count()
                );
            }
            Err(e) => {
                println!("{}: FAILED: {e}", vault.path.display());
                error!("{}: {e}", vault.path.display());
                let replace = match (&first_error, &e) {
                    (None, _) => true,
                    (Some(Error::SubmissionRevert(_)), _) => false,
                    (Some(_), Error::SubmissionRevert(_)) => true,
                    _ => false,
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Show composition, current shares and where each asset classifies.
pub fn show_positions(config: &Config, state_path: &Path) -> Result<()> {
    let loaded = load(config, state_path)?;
    let snapshot = fetch_snapshot(
        &loaded.vault,
        loaded.prices.as_ref(),
        config.execution.strict_weights,
    )?;
    display_positions(&snapshot)
}

/// Verification report without trading.
pub fn run_reconcile(config: &Config, state_path: &Path) -> Result<()> {
    let loaded = load(config, state_path)?;
    let snapshot = fetch_snapshot(
        &loaded.vault,
        loaded.prices.as_ref(),
        config.execution.strict_weights,
    )?;
    print!("{}", reconcile::verify(&snapshot));
    Ok(())
}

fn write_order(path: &Path, order: &OrderData) -> Result<()> {
    let json = order
        .to_json()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)?;
    info!("batch written to {}", path.display());
    Ok(())
}

// === Display ===

/// Whole units with four fractional digits.
pub fn format_units(amount: U256, decimals: u8) -> String {
    let Some(scale) = pow10(decimals) else {
        return amount.to_string();
    };
    let whole = amount / scale;
    let frac = if decimals >= 4 {
        (amount % scale) / (scale / U256::from(10_000))
    } else {
        (amount % scale) * U256::from(10_000) / scale
    };
    format!("{whole}.{:0>4}", frac.to_string())
}

fn display_positions(snapshot: &VaultSnapshot) -> Result<()> {
    let classification = classify(snapshot)?;
    let total = snapshot.total_value;

    println!(
        "Vault {}: {} base value, {} uninvested",
        snapshot.vault,
        format_units(total, 18),
        format_units(snapshot.base_balance, 18)
    );
    if snapshot.holdings.is_empty() && snapshot.targets.is_empty() {
        println!("No positions.");
        return Ok(());
    }

    println!("\nCURRENT VAULT:");
    println!(
        "  {:42} {:>16} {:>16} {:>8} {:>8}  {}",
        "Asset", "Balance", "Value", "Share%", "Target%", "Category"
    );
    let mut rows: Vec<_> = snapshot.holdings.iter().map(|p| p.asset).collect();
    for t in snapshot.active_targets() {
        if !rows.iter().any(|a| a.address == t.asset.address) {
            rows.push(t.asset);
        }
    }
    for asset in rows {
        let (balance, value) = snapshot
            .holding(&asset.address)
            .map(|p| (p.balance, p.value))
            .unwrap_or_default();
        let share = detf::Weight::share_of(value, total).unwrap_or_default();
        let target = snapshot
            .target(&asset.address)
            .map(|t| t.weight)
            .unwrap_or_default();
        let category = Category::EXECUTION_ORDER
            .into_iter()
            .find(|&c| classification.list(c).contains(&asset.address))
            .map(|c| c.as_str())
            .unwrap_or(if classification.adjust.contains(&asset.address) {
                "on target"
            } else {
                "-"
            });
        println!(
            "  {:42} {:>16} {:>16} {:>7.2}% {:>7.2}%  {}",
            asset.address.to_string(),
            format_units(balance, asset.decimals),
            format_units(value, 18),
            share.as_fraction() * 100.0,
            target.as_fraction() * 100.0,
            category,
        );
    }
    Ok(())
}

fn display_plan(order: &OrderData) {
    println!("\nREBALANCE BATCH (schema v{}):", order.version);
    println!(
        "  {:>3}  {:15} {:>6} {:>24} {:>24}",
        "#", "Category", "Hops", "Amount in", "Min out"
    );
    for (i, (category, leg)) in order.legs().enumerate() {
        println!(
            "  {:>3}  {:15} {:>6} {:>24} {:>24}",
            i + 1,
            category.as_str(),
            leg.path.len().saturating_sub(1),
            leg.amount_in.to_string(),
            leg.amount_out.to_string(),
        );
    }
}

fn display_legs(legs: &[LegReport]) {
    if legs.is_empty() {
        return;
    }
    println!("\nLEGS:");
    for leg in legs {
        let status = match leg.status {
            detf::LegStatus::Included => "included".to_string(),
            detf::LegStatus::Dropped(reason) => format!("dropped: {reason}"),
        };
        println!(
            "  {:15} {} in {} quoted {}  ({status})",
            leg.category.as_str(),
            leg.asset,
            leg.amount_in,
            leg.quoted,
        );
    }
}

fn display_outcome(outcome: &CycleOutcome) {
    display_legs(&outcome.legs);
    match outcome.disposition {
        Disposition::NoOp => println!("\nNo rebalancing needed: vault matches targets."),
        Disposition::NothingRoutable => println!("\nNo leg could be routed; nothing submitted."),
        Disposition::DryRun => {
            if let Some(order) = &outcome.order {
                display_plan(order);
            }
            println!("\n[DRY RUN] Batch not submitted.");
        }
        Disposition::Declined => {}
        Disposition::Submitted => {
            if let Some(receipt) = &outcome.receipt {
                println!(
                    "\nBatch executed: {} legs, sequence {}.",
                    receipt.legs, receipt.sequence
                );
            }
            if let Some(report) = &outcome.report {
                print!("\n{report}");
            }
        }
    }
}
