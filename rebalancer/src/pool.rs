//! Bounded worker pool: distinct vaults rebalanced concurrently.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::cycle::{CycleOptions, CycleOutcome, Rebalancer, VaultContext};
use crate::error::{Error, Result};

/// A fixed-size pool of cycle workers.
///
/// The size bounds concurrent traffic to the price feed and chain RPC; it
/// should match their rate limits rather than the core count.
pub struct VaultPool {
    pool: ThreadPool,
}

impl VaultPool {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Pool("pool needs at least one worker".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("vault-worker-{i}"))
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// One cycle per context. Results are co-indexed with `vaults`; one
    /// vault failing does not stop the others.
    pub fn run_all(
        &self,
        rebalancer: &Rebalancer,
        vaults: &[VaultContext<'_>],
        opts: &CycleOptions<'_>,
    ) -> Vec<Result<CycleOutcome>> {
        self.pool.install(|| {
            vaults
                .par_iter()
                .map(|ctx| rebalancer.run_cycle(ctx, opts))
                .collect()
        })
    }
}
