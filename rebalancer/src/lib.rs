//! detf-rebalancer: orchestrates rebalance cycles for detf index vaults.
//!
//! Fetches a per-cycle snapshot from the vault and price source, runs the
//! `detf` decision engine through the cycle state machine, submits the batch
//! atomically, verifies the result, and keeps a JSONL audit trail. Distinct
//! vaults run concurrently on a bounded worker pool; one vault never runs
//! two cycles at once.

pub mod allocation;
pub mod audit;
pub mod config;
pub mod cycle;
pub mod error;
pub mod execution;
pub mod fetch;
pub mod lock;
pub mod pool;
pub mod reconcile;
