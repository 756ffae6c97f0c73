//! Integration tests for the rebalance cycle against paper vaults.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use detf::fixed::pow10;
use detf::{Address, Category, DropReason, LegStatus, OrderData, SlippageTolerance, U256, Weight};
use detf_rebalancer::audit::AuditLog;
use detf_rebalancer::cycle::{
    CycleOptions, CycleState, Disposition, Rebalancer, Settings, VaultContext,
};
use detf_rebalancer::error::Error;
use detf_rebalancer::pool::VaultPool;
use detf_vault::paper::{PaperPriceFeed, PaperVault};
use detf_vault::{Pool, lowercase_price_id, price_id};

const BASE: u8 = 0xbb;
const X: u8 = 0x01;
const Y: u8 = 0x02;
const Z: u8 = 0x03;
const P: u8 = 0x11;
const Q: u8 = 0x12;

fn addr(b: u8) -> Address {
    Address::repeat_byte(b)
}

fn e18(n: u64) -> U256 {
    U256::from(n) * pow10(18).unwrap()
}

fn e17(n: u64) -> U256 {
    U256::from(n) * pow10(17).unwrap()
}

fn pool(token: u8) -> Pool {
    Pool {
        venue: addr(0xa0),
        token_a: addr(BASE),
        token_b: addr(token),
        depth: e18(1_000),
        fee_bps: 0,
    }
}

fn settings() -> Settings {
    Settings {
        slippage: SlippageTolerance::from_bps(100).unwrap(),
        max_legs_per_batch: 64,
        strict_weights: true,
        parallel_quotes: true,
    }
}

/// Total 400: X (untargeted) 100, Y 200 against a 40% target, Z 60% unowned,
/// 100 uninvested. Expect Sell X, AdjustToSell Y, Buy Z.
fn mixed_vault(id: u8) -> PaperVault {
    PaperVault::builder(addr(id), addr(BASE))
        .base_balance(e18(100))
        .with_token(addr(X), 18, e18(1))
        .with_token(addr(Y), 18, e18(1))
        .with_token(addr(Z), 18, e18(1))
        .with_holding(addr(X), e18(100))
        .with_holding(addr(Y), e18(200))
        .with_target(addr(Y), Weight(40_000_000))
        .with_target(addr(Z), Weight(60_000_000))
        .with_pool(pool(X))
        .with_pool(pool(Y))
        .with_pool(pool(Z))
        .build()
}

/// 1000 base, 50/50 into P and Q; only P has a pool.
fn half_routable_vault(id: u8) -> PaperVault {
    PaperVault::builder(addr(id), addr(BASE))
        .base_balance(e18(1_000))
        .with_token(addr(P), 18, e18(1))
        .with_token(addr(Q), 18, e18(1))
        .with_target(addr(P), Weight(50_000_000))
        .with_target(addr(Q), Weight(50_000_000))
        .with_pool(pool(P))
        .build()
}

/// Run one cycle with the vault's own feed and router.
fn run(
    rebalancer: &Rebalancer,
    vault: &PaperVault,
    opts: &CycleOptions<'_>,
) -> detf_rebalancer::error::Result<detf_rebalancer::cycle::CycleOutcome> {
    let feed = vault.price_feed().unwrap();
    let router = vault.router().unwrap();
    let ctx = VaultContext {
        vault,
        prices: &feed,
        resolver: &router,
    };
    rebalancer.run_cycle(&ctx, opts)
}

fn audit_events(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ============================================================================
// Full cycle
// ============================================================================

#[test]
fn submitted_cycle_executes_every_stage() {
    let vault = mixed_vault(0xe1);
    let outcome = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap();

    assert_eq!(outcome.disposition, Disposition::Submitted);
    assert_eq!(outcome.final_state, CycleState::Idle);
    assert_eq!(
        outcome.history,
        vec![
            CycleState::Idle,
            CycleState::Classifying,
            CycleState::Sizing(Category::Sell),
            CycleState::Sizing(Category::AdjustToSell),
            CycleState::Sizing(Category::AdjustToBuy),
            CycleState::Sizing(Category::Buy),
            CycleState::Submitting,
            CycleState::Verifying,
            CycleState::Idle,
        ]
    );

    let legs: Vec<_> = outcome
        .legs
        .iter()
        .map(|l| (l.category, l.asset, l.amount_in, l.amount_out))
        .collect();
    assert_eq!(
        legs,
        vec![
            (Category::Sell, addr(X), e18(100), e18(99)),
            (Category::AdjustToSell, addr(Y), e18(40), e17(396)),
            // 100 base + 99 + 39.6 guaranteed from the sells
            (Category::Buy, addr(Z), e17(2_386), U256::from(236_214u64) * pow10(15).unwrap()),
        ]
    );
    assert_eq!(outcome.receipt.as_ref().unwrap().legs, 3);
    assert_eq!(vault.submissions().len(), 1);
}

#[test]
fn submitted_cycle_moves_balances_and_verifies() {
    let vault = mixed_vault(0xe1);
    let outcome = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap();

    let state = vault.state().unwrap();
    assert_eq!(state.base_balance, e17(14));
    assert!(state.holding(addr(X)).is_none());
    assert_eq!(state.holding(addr(Y)).unwrap().balance, e18(160));
    assert_eq!(state.holding(addr(Z)).unwrap().balance, e17(2_386));

    let report = outcome.report.expect("verification report");
    let y = report.entries.iter().find(|e| e.asset == addr(Y)).unwrap();
    assert!((y.realized_pct - 40.0).abs() < 1e-9);
    assert!(report.tracking_error_pct < 1.0);
}

#[test]
fn sequential_quotes_give_the_same_batch() {
    let parallel = run(
        &Rebalancer::new(settings()),
        &mixed_vault(0xe1),
        &CycleOptions {
            dry_run: true,
            confirm: None,
        },
    )
    .unwrap();
    let sequential = run(
        &Rebalancer::new(Settings {
            parallel_quotes: false,
            ..settings()
        }),
        &mixed_vault(0xe1),
        &CycleOptions {
            dry_run: true,
            confirm: None,
        },
    )
    .unwrap();
    assert_eq!(parallel.order, sequential.order);
}

// ============================================================================
// Early returns to Idle
// ============================================================================

#[test]
fn on_target_vault_is_noop() {
    let vault = PaperVault::builder(addr(0xe2), addr(BASE))
        .with_token(addr(Y), 18, e18(1))
        .with_holding(addr(Y), e18(100))
        .with_target(addr(Y), Weight::FULL)
        .build();
    let outcome = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap();

    assert_eq!(outcome.disposition, Disposition::NoOp);
    assert_eq!(
        outcome.history,
        vec![CycleState::Idle, CycleState::Classifying, CycleState::Idle]
    );
    assert!(outcome.order.is_none());
    assert!(vault.submissions().is_empty());
}

#[test]
fn empty_untargeted_holding_is_noop() {
    let vault = PaperVault::builder(addr(0xe2), addr(BASE))
        .with_token(addr(X), 18, e18(1))
        .with_token(addr(Y), 18, e18(1))
        .with_holding(addr(X), U256::ZERO)
        .with_holding(addr(Y), e18(100))
        .with_target(addr(Y), Weight::FULL)
        .with_pool(pool(X))
        .build();
    let outcome = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap();

    assert_eq!(outcome.disposition, Disposition::NoOp);
    assert!(outcome.legs.is_empty());
    assert!(vault.submissions().is_empty());
}

#[test]
fn dry_run_assembles_without_submitting() {
    let vault = mixed_vault(0xe1);
    let before = vault.state().unwrap();
    let outcome = run(
        &Rebalancer::new(settings()),
        &vault,
        &CycleOptions {
            dry_run: true,
            confirm: None,
        },
    )
    .unwrap();

    assert_eq!(outcome.disposition, Disposition::DryRun);
    assert_eq!(outcome.order.as_ref().unwrap().leg_count(), 3);
    assert_eq!(
        outcome.history.last().copied(),
        Some(CycleState::Idle)
    );
    assert!(!outcome.history.contains(&CycleState::Submitting));
    assert_eq!(vault.state().unwrap(), before);
}

#[test]
fn declined_confirmation_submits_nothing() {
    let vault = mixed_vault(0xe1);
    let asked = AtomicBool::new(false);
    let confirm = |order: &OrderData| {
        asked.store(true, Ordering::SeqCst);
        assert_eq!(order.leg_count(), 3);
        false
    };
    let outcome = run(
        &Rebalancer::new(settings()),
        &vault,
        &CycleOptions {
            dry_run: false,
            confirm: Some(&confirm),
        },
    )
    .unwrap();

    assert!(asked.load(Ordering::SeqCst));
    assert_eq!(outcome.disposition, Disposition::Declined);
    assert!(vault.submissions().is_empty());
}

#[test]
fn unroutable_leg_is_dropped_and_rest_submitted() {
    let vault = half_routable_vault(0xe3);
    let outcome = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap();

    assert_eq!(outcome.disposition, Disposition::Submitted);
    let included: Vec<_> = outcome.included().collect();
    let dropped: Vec<_> = outcome.dropped().collect();
    assert_eq!(included.len(), 1);
    assert_eq!(included[0].asset, addr(P));
    assert_eq!(included[0].amount_in, e18(500));
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].asset, addr(Q));
    assert_eq!(dropped[0].amount_in, e18(500));
    assert_eq!(
        dropped[0].status,
        LegStatus::Dropped(DropReason::InsufficientLiquidity)
    );

    let state = vault.state().unwrap();
    assert_eq!(state.base_balance, e18(500));
    assert_eq!(state.holding(addr(P)).unwrap().balance, e18(500));
}

#[test]
fn nothing_routable_returns_to_idle() {
    let vault = PaperVault::builder(addr(0xe4), addr(BASE))
        .base_balance(e18(1_000))
        .with_token(addr(Q), 18, e18(1))
        .with_target(addr(Q), Weight::FULL)
        .build();
    let outcome = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap();

    assert_eq!(outcome.disposition, Disposition::NothingRoutable);
    assert_eq!(outcome.final_state, CycleState::Idle);
    assert!(vault.submissions().is_empty());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn missing_price_aborts_before_submission() {
    let vault = mixed_vault(0xe1);
    let before = vault.state().unwrap();
    // Y is never priced
    let feed = PaperPriceFeed::new()
        .with_price(price_id(&addr(X)), e18(1))
        .with_price(price_id(&addr(Z)), e18(1));
    let router = vault.router().unwrap();
    let ctx = VaultContext {
        vault: &vault,
        prices: &feed,
        resolver: &router,
    };

    let err = Rebalancer::new(settings())
        .run_cycle(&ctx, &CycleOptions::default())
        .unwrap_err();
    match &err {
        Error::DataFetch { what, .. } => assert!(what.contains(&addr(Y).to_string())),
        other => panic!("expected DataFetch, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
    assert!(vault.submissions().is_empty());
    assert_eq!(vault.state().unwrap(), before);
}

#[test]
fn lowercase_only_prices_still_complete() {
    let vault = mixed_vault(0xe1);
    let feed = [X, Y, Z]
        .into_iter()
        .fold(PaperPriceFeed::new(), |f, t| {
            f.with_price(lowercase_price_id(&addr(t)), e18(1))
        });
    let router = vault.router().unwrap();
    let ctx = VaultContext {
        vault: &vault,
        prices: &feed,
        resolver: &router,
    };

    let outcome = Rebalancer::new(settings())
        .run_cycle(&ctx, &CycleOptions::default())
        .unwrap();
    assert_eq!(outcome.disposition, Disposition::Submitted);
}

#[test]
fn revert_leaves_vault_unchanged() {
    let vault = mixed_vault(0xe1);
    vault.set_revert(Some("minimum output not met".into()));
    let before = vault.state().unwrap();

    let err = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap_err();
    assert!(matches!(&err, Error::SubmissionRevert(r) if r == "minimum output not met"));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(vault.state().unwrap(), before);
    assert!(vault.submissions().is_empty());
}

#[test]
fn busy_vault_is_rejected() {
    let vault = mixed_vault(0xe1);
    let rebalancer = Rebalancer::new(settings());
    let lease = rebalancer.locks().try_acquire(addr(0xe1)).unwrap();

    let err = run(&rebalancer, &vault, &CycleOptions::default()).unwrap_err();
    assert!(matches!(err, Error::VaultBusy(v) if v == addr(0xe1)));

    drop(lease);
    assert!(run(&rebalancer, &vault, &CycleOptions::default()).is_ok());
    assert!(!rebalancer.locks().is_locked(addr(0xe1)));
}

#[test]
fn oversized_batch_is_rejected() {
    let vault = mixed_vault(0xe1);
    let rebalancer = Rebalancer::new(Settings {
        max_legs_per_batch: 2,
        ..settings()
    });
    let err = run(&rebalancer, &vault, &CycleOptions::default()).unwrap_err();
    assert!(matches!(err, Error::TooManyLegs { legs: 3, max: 2 }));
    assert!(vault.submissions().is_empty());
}

#[test]
fn skewed_weights_rejected_when_strict() {
    let vault = PaperVault::builder(addr(0xe5), addr(BASE))
        .base_balance(e18(100))
        .with_token(addr(P), 18, e18(1))
        .with_target(addr(P), Weight(90_000_000))
        .with_pool(pool(P))
        .build();

    let err = run(&Rebalancer::new(settings()), &vault, &CycleOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Allocation(_)));

    let lenient = Rebalancer::new(Settings {
        strict_weights: false,
        ..settings()
    });
    let outcome = run(&lenient, &vault, &CycleOptions::default()).unwrap();
    assert_eq!(outcome.disposition, Disposition::Submitted);
}

// ============================================================================
// Pool and audit
// ============================================================================

#[test]
fn pool_runs_distinct_vaults() {
    let a = mixed_vault(0xe1);
    let b = half_routable_vault(0xe3);
    let (fa, ra) = (a.price_feed().unwrap(), a.router().unwrap());
    let (fb, rb) = (b.price_feed().unwrap(), b.router().unwrap());
    let contexts = [
        VaultContext {
            vault: &a,
            prices: &fa,
            resolver: &ra,
        },
        VaultContext {
            vault: &b,
            prices: &fb,
            resolver: &rb,
        },
    ];

    let results = VaultPool::new(2).unwrap().run_all(
        &Rebalancer::new(settings()),
        &contexts,
        &CycleOptions::default(),
    );
    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(
            result.as_ref().unwrap().disposition,
            Disposition::Submitted
        );
    }
    assert_eq!(results[0].as_ref().unwrap().vault, addr(0xe1));
    assert_eq!(results[1].as_ref().unwrap().vault, addr(0xe3));
}

#[test]
fn audit_trail_records_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let audit = Arc::new(AuditLog::open(&path).unwrap());
    let rebalancer = Rebalancer::new(settings()).with_audit(audit);

    run(&rebalancer, &half_routable_vault(0xe3), &CycleOptions::default()).unwrap();

    let events = audit_events(&path);
    let names: Vec<_> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "cycle_started",
            "snapshot_fetched",
            "classified",
            "leg_included",
            "leg_dropped",
            "batch_submitted",
            "batch_executed",
            "cycle_verified",
        ]
    );
    assert_eq!(events[4]["reason"], "insufficient liquidity");
    assert!(events.iter().all(|e| e["ts"].is_string()));
}

#[test]
fn audit_trail_records_revert() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let audit = Arc::new(AuditLog::open(&path).unwrap());
    let rebalancer = Rebalancer::new(settings()).with_audit(audit);
    let vault = mixed_vault(0xe1);
    vault.set_revert(Some("paused".into()));

    run(&rebalancer, &vault, &CycleOptions::default()).unwrap_err();

    let events = audit_events(&path);
    let n = events.len();
    assert_eq!(events[n - 2]["event"], "submission_reverted");
    assert_eq!(events[n - 2]["reason"], "paused");
    assert_eq!(events[n - 1]["event"], "cycle_failed");
    assert_eq!(events[n - 1]["from"]["state"], "submitting");
    assert_eq!(events[n - 1]["state"]["state"], "failed");
}

// ============================================================================
// Demo files
// ============================================================================

#[test]
fn demo_config_and_vault_dry_run() {
    use detf_rebalancer::config::Config;
    use detf_vault::paper::PaperState;

    let demo = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demo");
    let config = Config::load(&demo.join("config.toml")).unwrap();
    let vault = PaperVault::from_state(PaperState::load(&demo.join("vault.json")).unwrap());

    let rebalancer = Rebalancer::new(Settings::from_config(&config).unwrap());
    let outcome = run(
        &rebalancer,
        &vault,
        &CycleOptions {
            dry_run: true,
            confirm: None,
        },
    )
    .unwrap();

    assert_eq!(outcome.disposition, Disposition::DryRun);
    let order = outcome.order.unwrap();
    assert_eq!(order.sell.as_ref().unwrap().legs.len(), 1);
    assert_eq!(order.adjust_to_sell.as_ref().unwrap().legs.len(), 1);
    // the second buy only routes through a two-hop path
    let buys = &order.buy.as_ref().unwrap().legs;
    assert_eq!(buys.len(), 2);
    assert!(buys.iter().any(|leg| leg.path.len() == 3));
}
