//! Rebalance cycle: fetch → classify → size → submit → verify.
//!
//! One cycle is a strict sequence of states:
//!
//! ```text
//! Idle → Classifying → Sizing(Sell) → Sizing(AdjustToSell)
//!      → Sizing(AdjustToBuy) → Sizing(Buy) → Submitting → Verifying → Idle
//! ```
//!
//! Any error moves the cycle to `Failed`; a no-op classification, a dry run,
//! an empty batch or an operator decline return to `Idle` early. The vault
//! lease is held from Classifying through Submitting.

use std::sync::Arc;

use detf::{
    Address, BatchAssembler, Category, Classification, InvariantViolation, LegStatus, OrderData,
    Route, SlippageTolerance, TradeIntent, TradeSizer, U256, VaultSnapshot, Weight, classify,
    total_target_percentage,
};
use detf_vault::{LiquidityResolver, PriceSource, Receipt, Vault, VaultError};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::fetch_snapshot;
use crate::lock::{VaultLease, VaultLocks};
use crate::reconcile::{self, VerificationReport};

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "category", rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Classifying,
    Sizing(Category),
    Submitting,
    Verifying,
    Failed,
}

impl CycleState {
    pub fn can_transition_to(self, next: CycleState) -> bool {
        use CycleState::*;
        match (self, next) {
            (Idle, Classifying) => true,
            (Classifying, Sizing(Category::Sell)) | (Classifying, Idle) => true,
            (Sizing(c), Sizing(n)) => c.next() == Some(n),
            (Sizing(Category::Buy), Submitting) | (Sizing(Category::Buy), Idle) => true,
            (Submitting, Verifying) => true,
            (Verifying, Idle) => true,
            (Idle | Failed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    /// Idle and Failed end a cycle; leaving Failed takes a new cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Idle | CycleState::Failed)
    }
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleState::Idle => write!(f, "idle"),
            CycleState::Classifying => write!(f, "classifying"),
            CycleState::Sizing(c) => write!(f, "sizing({c})"),
            CycleState::Submitting => write!(f, "submitting"),
            CycleState::Verifying => write!(f, "verifying"),
            CycleState::Failed => write!(f, "failed"),
        }
    }
}

/// State holder that keeps the path taken.
#[derive(Debug)]
struct Machine {
    state: CycleState,
    history: Vec<CycleState>,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: CycleState::Idle,
            history: vec![CycleState::Idle],
        }
    }

    fn advance(&mut self, next: CycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        self.state = next;
        self.history.push(next);
    }
}

/// Per-cycle knobs, resolved from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub slippage: SlippageTolerance,
    pub max_legs_per_batch: usize,
    pub strict_weights: bool,
    pub parallel_quotes: bool,
}

impl Settings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            slippage: config.slippage()?,
            max_legs_per_batch: config.execution.max_legs_per_batch,
            strict_weights: config.execution.strict_weights,
            parallel_quotes: config.workers.parallel_quotes,
        })
    }
}

/// The collaborators one cycle talks to.
#[derive(Clone, Copy)]
pub struct VaultContext<'a> {
    pub vault: &'a dyn Vault,
    pub prices: &'a dyn PriceSource,
    pub resolver: &'a dyn LiquidityResolver,
}

/// Operator hook consulted before Submitting. Returning `false` declines.
pub type ConfirmFn<'a> = dyn Fn(&OrderData) -> bool + Sync + 'a;

#[derive(Default, Clone, Copy)]
pub struct CycleOptions<'a> {
    /// Stop after the batch is assembled.
    pub dry_run: bool,
    pub confirm: Option<&'a ConfirmFn<'a>>,
}

/// Diagnostic for one sized leg, included or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegReport {
    pub category: Category,
    pub asset: Address,
    pub amount_in: U256,
    /// Minimum output written into the leg.
    pub amount_out: U256,
    /// Output the resolver quoted.
    pub quoted: U256,
    pub path: Vec<Address>,
    pub status: LegStatus,
}

/// How a cycle that did not fail came to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Composition already matches the targets.
    NoOp,
    /// Every sized leg was dropped.
    NothingRoutable,
    DryRun,
    Declined,
    Submitted,
}

/// Everything a finished cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub vault: Address,
    pub final_state: CycleState,
    pub history: Vec<CycleState>,
    pub disposition: Disposition,
    pub legs: Vec<LegReport>,
    pub order: Option<OrderData>,
    pub receipt: Option<Receipt>,
    pub report: Option<VerificationReport>,
}

impl CycleOutcome {
    pub fn included(&self) -> impl Iterator<Item = &LegReport> {
        self.legs.iter().filter(|l| l.status == LegStatus::Included)
    }

    pub fn dropped(&self) -> impl Iterator<Item = &LegReport> {
        self.legs.iter().filter(|l| l.status != LegStatus::Included)
    }
}

/// Runs cycles. Shared by every worker of a pool.
pub struct Rebalancer {
    settings: Settings,
    locks: Arc<VaultLocks>,
    audit: Option<Arc<AuditLog>>,
}

impl Rebalancer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            locks: Arc::new(VaultLocks::new()),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share a lock registry with another rebalancer.
    pub fn with_locks(mut self, locks: Arc<VaultLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &Arc<VaultLocks> {
        &self.locks
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one cycle against one vault.
    pub fn run_cycle(&self, ctx: &VaultContext<'_>, opts: &CycleOptions<'_>) -> Result<CycleOutcome> {
        let vault = ctx.vault.id();
        let lease = match self.locks.try_acquire(vault) {
            Ok(lease) => lease,
            Err(e) => {
                warn!("{e}");
                let idle = CycleState::Idle;
                self.note(|a| audit::log_failed(a, vault, idle, idle, &e.to_string()));
                return Err(e);
            }
        };

        let mut cycle = Cycle::new(vault);
        match self.drive(ctx, opts, &mut cycle, lease) {
            Ok(disposition) => {
                info!(
                    "vault {vault}: cycle finished ({disposition:?}, {} legs included, {} dropped)",
                    cycle.legs.iter().filter(|l| l.status == LegStatus::Included).count(),
                    cycle.legs.iter().filter(|l| l.status != LegStatus::Included).count(),
                );
                Ok(cycle.finish(disposition))
            }
            Err(e) => {
                let at = cycle.machine.state;
                cycle.machine.advance(CycleState::Failed);
                let state = cycle.machine.state;
                error!("vault {vault}: cycle failed in {at}: {e}");
                self.note(|a| audit::log_failed(a, vault, at, state, &e.to_string()));
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        ctx: &VaultContext<'_>,
        opts: &CycleOptions<'_>,
        cycle: &mut Cycle,
        lease: VaultLease<'_>,
    ) -> Result<Disposition> {
        let vault = cycle.vault;

        // Classifying
        cycle.machine.advance(CycleState::Classifying);
        self.record(|a| audit::log_cycle_started(a, vault, opts.dry_run))?;
        let snapshot = fetch_snapshot(ctx.vault, ctx.prices, self.settings.strict_weights)?;
        self.record(|a| audit::log_snapshot(a, &snapshot))?;
        let classification = classify(&snapshot)?;
        self.record(|a| audit::log_classified(a, vault, &classification))?;

        if classification.is_empty() {
            info!("vault {vault}: composition matches targets, nothing to do");
            self.record(|a| a.log("cycle_noop", serde_json::json!({ "vault": vault })))?;
            cycle.machine.advance(CycleState::Idle);
            return Ok(Disposition::NoOp);
        }
        let ttp = total_target_percentage(&classification)?;
        debug!("vault {vault}: total target percentage {ttp}");

        // Sizing, in execution order
        let sizer = TradeSizer::new(snapshot.base_asset, self.settings.slippage);
        let mut assembler = BatchAssembler::new();
        let mut available = snapshot.base_balance;
        for category in Category::EXECUTION_ORDER {
            cycle.machine.advance(CycleState::Sizing(category));
            if category == Category::AdjustToBuy {
                available = available_after_sells(&snapshot, &assembler)?;
                debug!("vault {vault}: {available} base available for buys");
            }
            let intents = size(&sizer, category, &classification, available, ttp)?;
            let routes = self.quote_all(ctx.resolver, &intents)?;
            for (intent, route) in intents.iter().zip(&routes) {
                let report = self.assemble_leg(&sizer, &mut assembler, intent, route)?;
                self.record(|a| audit::log_leg(a, vault, &report))?;
                cycle.legs.push(report);
            }
        }

        let batch = assembler.finish();
        if cycle.legs.is_empty() {
            info!("vault {vault}: every leg sized to zero, nothing to do");
            self.record(|a| a.log("cycle_noop", serde_json::json!({ "vault": vault })))?;
            cycle.machine.advance(CycleState::Idle);
            return Ok(Disposition::NoOp);
        }
        if batch.is_empty() {
            warn!("vault {vault}: every leg was dropped, nothing to submit");
            cycle.machine.advance(CycleState::Idle);
            return Ok(Disposition::NothingRoutable);
        }
        let order = OrderData::new(&classification, &batch);
        order.validate(snapshot.base_asset)?;
        if order.leg_count() > self.settings.max_legs_per_batch {
            return Err(Error::TooManyLegs {
                legs: order.leg_count(),
                max: self.settings.max_legs_per_batch,
            });
        }
        cycle.order = Some(order.clone());

        if opts.dry_run {
            info!("vault {vault}: dry run, {} legs not submitted", order.leg_count());
            cycle.machine.advance(CycleState::Idle);
            return Ok(Disposition::DryRun);
        }
        if let Some(confirm) = opts.confirm {
            if !confirm(&order) {
                self.record(|a| a.log("operator_declined", serde_json::json!({ "vault": vault })))?;
                cycle.machine.advance(CycleState::Idle);
                return Ok(Disposition::Declined);
            }
        }

        // Submitting
        cycle.machine.advance(CycleState::Submitting);
        self.record(|a| audit::log_batch_submitted(a, vault, &order))?;
        let receipt = match ctx.vault.submit_rebalance(&order) {
            Ok(receipt) => receipt,
            Err(e) => {
                let reason = match e {
                    VaultError::Revert(reason) => reason,
                    other => other.to_string(),
                };
                self.note(|a| {
                    a.log(
                        "submission_reverted",
                        serde_json::json!({ "vault": vault, "reason": reason }),
                    )
                });
                return Err(Error::SubmissionRevert(reason));
            }
        };
        info!(
            "vault {vault}: batch executed ({} legs, sequence {})",
            receipt.legs, receipt.sequence
        );
        self.note(|a| audit::log_receipt(a, vault, &receipt));
        cycle.receipt = Some(receipt);
        drop(lease);

        // Verifying: diagnostic only
        cycle.machine.advance(CycleState::Verifying);
        match fetch_snapshot(ctx.vault, ctx.prices, self.settings.strict_weights) {
            Ok(after) => {
                let report = reconcile::verify(&after);
                info!(
                    "vault {vault}: tracking error after rebalance {:.4}%",
                    report.tracking_error_pct
                );
                self.note(|a| audit::log_verified(a, &report));
                cycle.report = Some(report);
            }
            Err(e) => warn!("vault {vault}: verification skipped: {e}"),
        }
        cycle.machine.advance(CycleState::Idle);
        Ok(Disposition::Submitted)
    }

    /// Quote every intent of one category, in order.
    fn quote_all(
        &self,
        resolver: &dyn LiquidityResolver,
        intents: &[TradeIntent],
    ) -> Result<Vec<Route>> {
        let routes = if self.settings.parallel_quotes && intents.len() > 1 {
            intents
                .par_iter()
                .map(|intent| resolver.quote(intent))
                .collect::<std::result::Result<Vec<_>, _>>()
        } else {
            resolver.quote_batch(intents)
        };
        let routes = routes.map_err(|e| Error::fetch("route quote", e))?;
        if routes.len() != intents.len() {
            return Err(Error::fetch(
                "route quote",
                format!("{} routes for {} legs", routes.len(), intents.len()),
            ));
        }
        Ok(routes)
    }

    fn assemble_leg(
        &self,
        sizer: &TradeSizer,
        assembler: &mut BatchAssembler,
        intent: &TradeIntent,
        route: &Route,
    ) -> Result<LegReport> {
        let min_out = match intent.min_amount_out {
            Some(min) => min,
            None => sizer.min_out_for_quote(intent, route.amount_out)?,
        };
        let status = assembler.push(intent, route, min_out);
        match status {
            LegStatus::Included => {
                if route.amount_out < min_out {
                    warn!(
                        "{} {}: quoted {} below minimum {min_out}",
                        intent.category, intent.asset, route.amount_out
                    );
                }
                info!(
                    "{} {}: sized {} in, min {min_out} out via {} hops",
                    intent.category,
                    intent.asset,
                    intent.amount_in,
                    route.path.len().saturating_sub(1)
                );
            }
            LegStatus::Dropped(reason) => {
                warn!("{} {}: dropped: {reason}", intent.category, intent.asset)
            }
        }
        Ok(LegReport {
            category: intent.category,
            asset: intent.asset,
            amount_in: intent.amount_in,
            amount_out: min_out,
            quoted: route.amount_out,
            path: route.path.clone(),
            status,
        })
    }

    /// Audit, propagating write failures.
    fn record(&self, f: impl FnOnce(&AuditLog) -> Result<()>) -> Result<()> {
        match &self.audit {
            Some(audit) => f(audit),
            None => Ok(()),
        }
    }

    /// Audit where a write failure must not change the outcome.
    fn note(&self, f: impl FnOnce(&AuditLog) -> Result<()>) {
        if let Err(e) = self.record(f) {
            warn!("audit write failed: {e}");
        }
    }
}

struct Cycle {
    vault: Address,
    machine: Machine,
    legs: Vec<LegReport>,
    order: Option<OrderData>,
    receipt: Option<Receipt>,
    report: Option<VerificationReport>,
}

impl Cycle {
    fn new(vault: Address) -> Self {
        Self {
            vault,
            machine: Machine::new(),
            legs: Vec::new(),
            order: None,
            receipt: None,
            report: None,
        }
    }

    fn finish(self, disposition: Disposition) -> CycleOutcome {
        CycleOutcome {
            vault: self.vault,
            final_state: self.machine.state,
            history: self.machine.history,
            disposition,
            legs: self.legs,
            order: self.order,
            receipt: self.receipt,
            report: self.report,
        }
    }
}

fn size(
    sizer: &TradeSizer,
    category: Category,
    classification: &Classification,
    available: U256,
    ttp: Weight,
) -> Result<Vec<TradeIntent>> {
    let list = classification.list(category);
    let intents = match category {
        Category::Sell => sizer.size_sell(list)?,
        Category::AdjustToSell => sizer.size_adjust_to_sell(list, classification.total_value)?,
        Category::AdjustToBuy | Category::Buy => {
            sizer.size_buy_side(category, list, available, ttp)?
        }
    };
    Ok(intents)
}

/// Base balance plus the guaranteed output of every included sell-side leg.
fn available_after_sells(snapshot: &VaultSnapshot, assembler: &BatchAssembler) -> Result<U256> {
    [Category::Sell, Category::AdjustToSell]
        .into_iter()
        .flat_map(|c| assembler.legs(c))
        .try_fold(snapshot.base_balance, |acc, leg| acc.checked_add(leg.amount_out))
        .ok_or_else(|| {
            Error::Invariant(InvariantViolation::Overflow {
                category: Category::AdjustToBuy,
                asset: snapshot.base_asset,
                what: "available balance",
            })
        })
}
