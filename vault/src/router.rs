//! Static multi-venue router over a fixed pool list.
//!
//! Candidate paths are the direct pools between the two tokens plus every
//! two-hop path through a connector token whose two pools share a venue (a
//! leg settles through one factory). Each hop converts at table
//! prices less the pool fee, and fails if the hop's base-currency value
//! exceeds the pool's depth. The candidate with the largest output wins; no
//! candidate yields the empty route.

use detf::{Address, Route, TradeIntent, U256};
use log::debug;

use crate::LiquidityResolver;
use crate::error::Result;
use crate::paper::TokenTable;
use crate::types::Pool;

const FEE_SCALE: u32 = 10_000;

/// A resolver answering from static pools and prices.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    table: TokenTable,
    pools: Vec<Pool>,
}

impl StaticRouter {
    pub fn new(table: TokenTable, pools: Vec<Pool>) -> Self {
        Self { table, pools }
    }

    /// Output of one hop through `pool`, or `None` if the pool cannot take it.
    fn hop(&self, pool: &Pool, from: Address, to: Address, amount: U256) -> Option<U256> {
        if self.table.value(from, amount)? > pool.depth {
            return None;
        }
        let fair = self.table.convert(amount, from, to)?;
        let fee = pool.fee_bps.min(FEE_SCALE);
        detf::fixed::mul_div(fair, U256::from(FEE_SCALE - fee), U256::from(FEE_SCALE))
    }

    fn direct(&self, from: Address, to: Address) -> impl Iterator<Item = &Pool> {
        self.pools.iter().filter(move |p| p.connects(from, to))
    }

    /// All candidate routes with their output, in pool order.
    fn candidates(&self, from: Address, to: Address, amount: U256) -> Vec<Route> {
        let mut routes = Vec::new();

        for pool in self.direct(from, to) {
            if let Some(out) = self.hop(pool, from, to, amount) {
                routes.push(Route {
                    venue: pool.venue,
                    path: vec![from, to],
                    amount_out: out,
                });
            }
        }

        for first in self.pools.iter().filter(|p| p.other(from).is_some()) {
            let Some(mid) = first.other(from) else { continue };
            if mid == to {
                continue;
            }
            let Some(mid_amount) = self.hop(first, from, mid, amount) else {
                continue;
            };
            // a leg settles through one factory
            for second in self.direct(mid, to).filter(|p| p.venue == first.venue) {
                if let Some(out) = self.hop(second, mid, to, mid_amount) {
                    routes.push(Route {
                        venue: first.venue,
                        path: vec![from, mid, to],
                        amount_out: out,
                    });
                }
            }
        }

        routes
    }
}

impl LiquidityResolver for StaticRouter {
    fn quote(&self, intent: &TradeIntent) -> Result<Route> {
        let best = self
            .candidates(intent.token_in, intent.token_out, intent.amount_in)
            .into_iter()
            .filter(|r| !r.amount_out.is_zero())
            // first of equal outputs wins, keeping pool order
            .fold(None::<Route>, |best, r| match best {
                Some(b) if b.amount_out >= r.amount_out => Some(b),
                _ => Some(r),
            });

        match best {
            Some(route) => Ok(route),
            None => {
                debug!(
                    "no route {} -> {} for {}",
                    intent.token_in, intent.token_out, intent.amount_in
                );
                Ok(Route::none())
            }
        }
    }
}
