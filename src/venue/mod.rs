//! One issue-pool venue: catalog, routes, live state and pricing behind a single handle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use eyre::Result;
use log::{debug, info};

use crate::catalog::{load_catalog, Catalog, CatalogCacheConfig, CatalogSource};
use crate::config::Config;
use crate::math;
use crate::models::Pool;
use crate::pricing::SwapSide;
use crate::router::{quote_route, Hop, PathTable, Route};
use crate::sync::{decode_log, BatchReader, BlockCache, EventOutcome, Synchronizer};

/// Prices of one route for the requested amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPrices {
    /// Route identifier, see [`IssueVenue::pool_identifiers`]
    pub pool: String,
    pub hops: Vec<Hop>,
    /// Result for one whole token of the fixed side
    pub unit: U256,
    /// One result per requested amount, zero where no price exists
    pub prices: Vec<U256>,
}

#[derive(Debug, Default)]
struct CatalogSnapshot {
    catalog: Catalog,
    pools: HashMap<Address, Pool>,
    paths: PathTable,
}

pub struct IssueVenue<R, S> {
    name: String,
    cache: CatalogCacheConfig,
    source: S,
    synchronizer: Synchronizer<R>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
}

impl<R: BatchReader, S: CatalogSource> IssueVenue<R, S> {
    pub fn new(config: &Config, reader: R, source: S) -> Self {
        Self {
            name: config.venue_name.clone(),
            cache: CatalogCacheConfig::new(
                &config.cache_dir,
                &config.venue_name,
                config.network_id,
                config.catalog_ttl,
            ),
            source,
            synchronizer: Synchronizer::new(
                config.venue_name.clone(),
                config.vault,
                config.multicall_chunk_size,
                reader,
            ),
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn synchronizer(&self) -> &Synchronizer<R> {
        &self.synchronizer
    }

    fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Loads the catalog. Must succeed before the venue can price anything.
    ///
    /// # Errors
    /// * `CatalogError::FetchFailure` if no pools could be loaded
    pub async fn initialize(&self) -> Result<()> {
        self.refresh_catalog().await?;
        Ok(())
    }

    /// Reloads the catalog, rebuilds the path table and retracks the pools.
    ///
    /// # Returns
    /// * Number of usable pools
    ///
    /// # Errors
    /// * `CatalogError::FetchFailure` if no pools could be loaded; the previous catalog stays
    pub async fn refresh_catalog(&self) -> Result<usize> {
        let catalog = load_catalog(&self.source, &self.cache).await?;
        let paths = PathTable::build(catalog.pools());
        let pools = catalog.by_address();
        self.synchronizer.track(catalog.pools());

        let count = catalog.len();
        info!("venue::refresh_catalog: {} has {count} pools", self.name);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(CatalogSnapshot {
            catalog,
            pools,
            paths,
        });
        Ok(count)
    }

    pub fn new_block_cache(&self) -> BlockCache {
        BlockCache::new(self.name.clone())
    }

    pub fn pools(&self) -> Vec<Pool> {
        self.snapshot().catalog.pools().to_vec()
    }

    pub fn decimals(&self, token: Address) -> Option<u8> {
        self.snapshot().catalog.decimals(token)
    }

    pub fn main_tokens(&self, pool: &Address) -> Vec<Address> {
        self.snapshot().paths.main_tokens(pool)
    }

    fn identifier(&self, route: &Route) -> String {
        let pools: Vec<String> = route
            .pools()
            .iter()
            .map(|pool| pool.to_string().to_lowercase())
            .collect();
        format!("{}_{}", self.name.to_lowercase(), pools.join("_"))
    }

    /// Identifiers of every route that can price `from -> to`.
    pub fn pool_identifiers(&self, from: Address, to: Address) -> Vec<String> {
        self.snapshot()
            .paths
            .routes(from, to)
            .iter()
            .map(|route| self.identifier(route))
            .collect()
    }

    /// Prices `amounts` of `from -> to` at `block_number` on every route.
    ///
    /// # Arguments
    /// * `cache` - pool states of this request; reused while the block stays the same
    /// * `amounts` - native amounts of `from` for a sell, of `to` for a buy
    /// * `creator` - requesting address, whose own resting orders are not matched
    ///
    /// # Returns
    /// * One entry per route with any price, empty when the pair is unknown
    ///
    /// # Errors
    /// * If pool states cannot be read at `block_number`
    #[allow(clippy::too_many_arguments)]
    pub async fn get_prices_volume(
        &self,
        cache: &mut BlockCache,
        from: Address,
        to: Address,
        amounts: &[U256],
        side: SwapSide,
        block_number: u64,
        creator: Option<Address>,
    ) -> Result<Vec<PoolPrices>> {
        let snapshot = self.snapshot();
        let routes = snapshot.paths.routes(from, to);
        if routes.is_empty() {
            return Ok(Vec::new());
        }

        let mut needed = HashSet::new();
        let addresses: Vec<Address> = routes
            .iter()
            .flat_map(Route::pools)
            .filter(|pool| needed.insert(*pool))
            .collect();
        let states = self
            .synchronizer
            .states_at(cache, block_number, &addresses)
            .await?;

        let fixed_token = match side {
            SwapSide::Sell => from,
            SwapSide::Buy => to,
        };
        let unit_amount = snapshot
            .catalog
            .decimals(fixed_token)
            .and_then(|decimals| math::one_token(decimals).ok());

        let mut prices = Vec::with_capacity(routes.len());
        for route in &routes {
            let quoted = quote_route(route, &snapshot.pools, &states, side, amounts, creator);
            let unit = unit_amount.map_or(U256::ZERO, |amount| {
                quote_route(route, &snapshot.pools, &states, side, &[amount], creator)[0]
            });

            if unit.is_zero() && quoted.iter().all(U256::is_zero) {
                debug!(
                    "venue::get_prices_volume: no price on {} at block {block_number}",
                    self.identifier(route)
                );
                continue;
            }
            prices.push(PoolPrices {
                pool: self.identifier(route),
                hops: route.hops.clone(),
                unit,
                prices: quoted,
            });
        }
        Ok(prices)
    }

    /// Reads every pool at `block_number` so that later logs have state to apply to.
    ///
    /// # Returns
    /// * Number of pools now live
    ///
    /// # Errors
    /// * If the batched read fails
    pub async fn sync_live_state(&self, block_number: u64) -> Result<usize> {
        self.synchronizer.resync_tracked(block_number).await
    }

    /// Feeds a raw vault log into the live state.
    ///
    /// # Returns
    /// * `None` - the log is not a balance-moving vault event
    ///
    /// # Errors
    /// * If a matching log does not decode
    pub fn handle_log(&self, log: &Log) -> Result<Option<EventOutcome>> {
        let Some(event) = decode_log(log)? else {
            return Ok(None);
        };
        let outcome = self.synchronizer.apply_event(&event);
        debug!(
            "venue::handle_log: {} for {} at block {}: {outcome:?}",
            event.event.name(),
            event.event.pool_address(),
            event.block_number
        );
        Ok(Some(outcome))
    }
}
