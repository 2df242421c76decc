//! Token routing through nested issue pools.
//!
//! A security issued in one pool can be the currency of another. Every pool therefore has a
//! set of main tokens: its own two tokens plus whatever the pools issuing those tokens can
//! reach. The [`PathTable`] resolves them once per catalog load.

use std::collections::{HashMap, HashSet};
use std::fmt;

use alloy::primitives::{Address, U256};

use crate::models::Pool;
use crate::pricing::{PoolPairData, SwapSide};
use crate::sync::PoolStateMap;

/// How many issuing pools deep a main token may be.
pub const MAX_NESTING: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hop {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
}

impl Hop {
    pub const fn new(pool: Address, token_in: Address, token_out: Address) -> Self {
        Self {
            pool,
            token_in,
            token_out,
        }
    }

    pub const fn reversed(&self) -> Self {
        Self::new(self.pool, self.token_out, self.token_in)
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} via {}", self.token_in, self.token_out, self.pool)
    }
}

/// Path from a main token to one of the pool's own tokens. Empty for the pool's own tokens.
pub type MainPath = Vec<Hop>;

/// End of `path` when starting from `token`.
fn path_end(token: Address, path: &[Hop]) -> Address {
    path.last().map_or(token, |hop| hop.token_out)
}

#[derive(Debug, Clone)]
pub struct Route {
    /// Pool the route is priced for
    pub pool: Address,
    pub hops: Vec<Hop>,
}

impl Route {
    pub fn pools(&self) -> Vec<Address> {
        self.hops.iter().map(|hop| hop.pool).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathTable {
    paths: HashMap<Address, HashMap<Address, MainPath>>,
}

impl PathTable {
    pub fn build(pools: &[Pool]) -> Self {
        let mut issuers: HashMap<Address, Vec<&Pool>> = HashMap::new();
        for pool in pools.iter().filter(|pool| issues_security(pool)) {
            issuers.entry(pool.security).or_default().push(pool);
        }
        for list in issuers.values_mut() {
            list.sort_by_key(|pool| pool.address);
        }

        let paths = pools
            .iter()
            .map(|pool| {
                let mut visited = HashSet::from([pool.address]);
                (pool.address, main_tokens(pool, &issuers, &mut visited, 0))
            })
            .collect();
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Main tokens of `pool`, sorted.
    pub fn main_tokens(&self, pool: &Address) -> Vec<Address> {
        let mut tokens: Vec<Address> = self
            .paths
            .get(pool)
            .map(|paths| paths.keys().copied().collect())
            .unwrap_or_default();
        tokens.sort();
        tokens
    }

    pub fn path(&self, pool: &Address, token: &Address) -> Option<&MainPath> {
        self.paths.get(pool)?.get(token)
    }

    /// Route `from -> to` priced in `pool`.
    ///
    /// # Returns
    /// * `None` - a token is not a main token of `pool`, both resolve to the same local token,
    ///   or the hops would pass a pool twice
    pub fn route(&self, pool: Address, from: Address, to: Address) -> Option<Route> {
        let paths = self.paths.get(&pool)?;
        let in_path = paths.get(&from)?;
        let out_path = paths.get(&to)?;

        let token_in = path_end(from, in_path);
        let token_out = path_end(to, out_path);
        if token_in == token_out {
            return None;
        }

        let hops: Vec<Hop> = in_path
            .iter()
            .copied()
            .chain(std::iter::once(Hop::new(pool, token_in, token_out)))
            .chain(out_path.iter().rev().map(Hop::reversed))
            .collect();

        let mut seen = HashSet::new();
        if !hops.iter().all(|hop| seen.insert(hop.pool)) {
            return None;
        }
        Some(Route { pool, hops })
    }

    /// Every distinct route for `from -> to`, by pool address.
    pub fn routes(&self, from: Address, to: Address) -> Vec<Route> {
        let mut pools: Vec<&Address> = self.paths.keys().collect();
        pools.sort();

        let mut seen = HashSet::new();
        pools
            .into_iter()
            .filter_map(|pool| self.route(*pool, from, to))
            .filter(|route| seen.insert(route.hops.clone()))
            .collect()
    }
}

/// Whether `pool` mints its security, making the security a claim on the pool. Secondary
/// pools only trade a security issued elsewhere.
fn issues_security(pool: &Pool) -> bool {
    pool.kind.is_primary() || pool.security == pool.address
}

/// Main tokens of `pool` reachable within the remaining nesting depth.
fn main_tokens(
    pool: &Pool,
    issuers: &HashMap<Address, Vec<&Pool>>,
    visited: &mut HashSet<Address>,
    depth: usize,
) -> HashMap<Address, MainPath> {
    let mut paths: HashMap<Address, MainPath> = pool
        .local_tokens()
        .into_iter()
        .map(|token| (token, Vec::new()))
        .collect();
    if depth >= MAX_NESTING {
        return paths;
    }

    for local in pool.local_tokens() {
        let Some(candidates) = issuers.get(&local) else {
            continue;
        };
        for issuer in candidates {
            if !visited.insert(issuer.address) {
                continue;
            }
            let nested = main_tokens(issuer, issuers, visited, depth + 1);
            visited.remove(&issuer.address);

            let mut nested: Vec<(Address, MainPath)> = nested.into_iter().collect();
            nested.sort_by_key(|(token, _)| *token);
            for (token, issuer_path) in nested {
                let end = path_end(token, &issuer_path);
                if end == local {
                    continue;
                }
                let mut path = issuer_path;
                path.push(Hop::new(issuer.address, end, local));

                let shorter = paths
                    .get(&token)
                    .map_or(true, |existing| path.len() < existing.len());
                if shorter {
                    paths.insert(token, path);
                }
            }
        }
    }
    paths
}

/// Quotes `amounts` along `route`.
///
/// Sell chains hop outputs forward. Buy walks the hops backwards, each hop pricing the
/// input the next one needs. A zero at any hop zeroes the amount.
pub fn quote_route(
    route: &Route,
    pools: &HashMap<Address, Pool>,
    states: &PoolStateMap,
    side: SwapSide,
    amounts: &[U256],
    creator: Option<Address>,
) -> Vec<U256> {
    let pairs: Option<Vec<PoolPairData<'_>>> = route
        .hops
        .iter()
        .map(|hop| {
            let pool = pools.get(&hop.pool)?;
            let state = states.get(&hop.pool)?;
            PoolPairData::new(pool, state, hop.token_in, hop.token_out)
        })
        .collect();
    let Some(pairs) = pairs else {
        return vec![U256::ZERO; amounts.len()];
    };

    amounts
        .iter()
        .map(|amount| {
            let mut amount = *amount;
            let mut step = |pair: &PoolPairData<'_>| {
                if !amount.is_zero() {
                    amount = pair.quote(side, amount, creator);
                }
            };
            match side {
                SwapSide::Sell => pairs.iter().for_each(&mut step),
                SwapSide::Buy => pairs.iter().rev().for_each(&mut step),
            }
            amount
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ONE;
    use crate::models::{Order, OrderBook, PoolKind};
    use crate::sync::{PoolLimits, PoolState};
    use crate::test_helpers::{bid, pool, units};
    use std::sync::Arc;

    const A: Address = Address::repeat_byte(0xaa);
    const B: Address = Address::repeat_byte(0xbb);
    const C: Address = Address::repeat_byte(0xcc);
    const D: Address = Address::repeat_byte(0xdd);
    const P: Address = Address::repeat_byte(0x01);
    const Q: Address = Address::repeat_byte(0x02);
    const R: Address = Address::repeat_byte(0x03);

    fn bid_for_b(reference: &str, amount: U256) -> Order {
        Order {
            token_in: C,
            token_out: B,
            ..bid(reference, amount, ONE * U256::from(95) / U256::from(100), 1)
        }
    }

    /// Q issues B against A, P trades B against C
    fn nested_pools(orders: Vec<Order>) -> Vec<Pool> {
        vec![
            pool(P, PoolKind::Secondary(OrderBook::new(orders, vec![])), (B, 18), (C, 18)),
            pool(Q, PoolKind::Primary, (B, 18), (A, 18)),
        ]
    }

    fn states() -> PoolStateMap {
        PoolStateMap::from([
            (
                Q,
                Arc::new(PoolState::new(
                    &[B, A],
                    &[units(2_000), U256::ZERO],
                    PoolLimits::Primary {
                        minimum_order_size: U256::from(1),
                        minimum_price: ONE,
                    },
                )),
            ),
            (
                P,
                Arc::new(PoolState::new(
                    &[B, C],
                    &[U256::ZERO, U256::ZERO],
                    PoolLimits::Secondary {
                        minimum_order_size: U256::from(1),
                    },
                )),
            ),
        ])
    }

    fn by_address(pools: Vec<Pool>) -> HashMap<Address, Pool> {
        pools.into_iter().map(|pool| (pool.address, pool)).collect()
    }

    #[test]
    fn test_nested_main_tokens() {
        let table = PathTable::build(&nested_pools(vec![]));

        assert_eq!(table.main_tokens(&P), vec![A, B, C]);
        assert_eq!(table.path(&P, &A), Some(&vec![Hop::new(Q, A, B)]));
        assert_eq!(table.path(&P, &B), Some(&vec![]));
        assert!(table.main_tokens(&Address::ZERO).is_empty());
    }

    #[test]
    fn test_route_composition() {
        let table = PathTable::build(&nested_pools(vec![]));

        let route = table.route(P, A, C).unwrap();
        assert_eq!(route.hops, vec![Hop::new(Q, A, B), Hop::new(P, B, C)]);

        let back = table.route(P, C, A).unwrap();
        assert_eq!(back.hops, vec![Hop::new(P, C, B), Hop::new(Q, B, A)]);

        // A and B both end at B in P
        assert!(table.route(P, A, B).is_none());
        assert!(table.route(P, A, D).is_none());

        // Only P's table reaches C from A
        assert_eq!(table.routes(A, C).len(), 1);
        assert!(table.route(Q, A, C).is_none());
    }

    #[test]
    fn test_secondary_pools_do_not_nest() {
        // Two order books trading the same security B
        let other = Address::repeat_byte(0x05);
        let pools = vec![
            pool(P, PoolKind::Secondary(OrderBook::default()), (B, 18), (C, 18)),
            pool(other, PoolKind::Secondary(OrderBook::default()), (B, 18), (D, 18)),
        ];
        let table = PathTable::build(&pools);

        assert_eq!(table.main_tokens(&P), vec![B, C]);
        assert_eq!(table.main_tokens(&other), vec![B, D]);
        assert!(table.routes(C, D).is_empty());
    }

    #[test]
    fn test_self_issued_security_nests() {
        // A secondary pool whose security is its own pool token
        let issuer = Address::repeat_byte(0x05);
        let pools = vec![
            pool(P, PoolKind::Secondary(OrderBook::default()), (issuer, 18), (C, 18)),
            pool(issuer, PoolKind::Secondary(OrderBook::default()), (issuer, 18), (D, 18)),
        ];
        let table = PathTable::build(&pools);

        assert_eq!(table.path(&P, &D), Some(&vec![Hop::new(issuer, D, issuer)]));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        // R issues A against D, so D is two issuers deep from P
        let mut pools = nested_pools(vec![]);
        pools.push(pool(R, PoolKind::Primary, (A, 18), (D, 18)));
        let table = PathTable::build(&pools);

        assert_eq!(
            table.path(&P, &D),
            Some(&vec![Hop::new(R, D, A), Hop::new(Q, A, B)])
        );

        // A third level is out of reach
        let e = Address::repeat_byte(0xee);
        pools.push(pool(Address::repeat_byte(0x04), PoolKind::Primary, (D, 18), (e, 18)));
        let table = PathTable::build(&pools);
        assert!(table.path(&P, &e).is_none());
        assert!(table.path(&Q, &e).is_some());
    }

    #[test]
    fn test_sell_through_primary_and_secondary() {
        let pools = nested_pools(vec![bid_for_b("r", units(950))]);
        let table = PathTable::build(&pools);
        let route = table.route(P, A, C).unwrap();
        let pools = by_address(pools);

        let prices = quote_route(&route, &pools, &states(), SwapSide::Sell, &[units(2_000)], None);
        assert_eq!(prices, vec![units(950)]);
    }

    #[test]
    fn test_thin_book_zeroes_route() {
        let pools = nested_pools(vec![bid_for_b("r", units(900))]);
        let table = PathTable::build(&pools);
        let route = table.route(P, A, C).unwrap();
        let pools = by_address(pools);

        let prices = quote_route(&route, &pools, &states(), SwapSide::Sell, &[units(2_000)], None);
        assert_eq!(prices, vec![U256::ZERO]);
    }

    #[test]
    fn test_buy_walks_backwards() {
        let pools = nested_pools(vec![bid_for_b("r", units(950))]);
        let table = PathTable::build(&pools);
        let route = table.route(P, A, C).unwrap();
        let pools = by_address(pools);

        // 950 C needs 1000 B, which needs 2000 A
        let prices = quote_route(&route, &pools, &states(), SwapSide::Buy, &[units(950)], None);
        assert_eq!(prices, vec![units(2_000)]);
    }

    #[test]
    fn test_missing_state_zeroes_route() {
        let pools = nested_pools(vec![bid_for_b("r", units(950))]);
        let table = PathTable::build(&pools);
        let route = table.route(P, A, C).unwrap();
        let pools = by_address(pools);
        let mut states = states();
        states.remove(&Q);

        let amounts = [units(1), units(2)];
        let prices = quote_route(&route, &pools, &states, SwapSide::Sell, &amounts, None);
        assert_eq!(prices, vec![U256::ZERO, U256::ZERO]);
    }
}
