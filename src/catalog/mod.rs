//! The set of known issue pools and their static metadata.
//!
//! Pools come from the venue subgraph as [`RawPool`] records and are cached on disk with a
//! TTL. Parsing turns every decimal string into an 18-decimal integer without going
//! through floats.

pub mod cache;
pub mod subgraph;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::utils::{parse_units, ParseUnits};
use alloy::primitives::{Address, U256};
use derive_more::{Display, Error};
use eyre::Result;
use log::{info, warn};

use crate::math::FIXED_DECIMALS;
use crate::models::{Order, OrderBook, Pool, PoolId, PoolKind, PoolToken, Trade};

pub use cache::CachedCatalog;
pub use subgraph::{CatalogSource, RawOrder, RawPool, RawToken, RawTrade, SubgraphClient};

pub const PRIMARY_POOL_TYPE: &str = "PrimaryIssue";
pub const SECONDARY_POOL_TYPE: &str = "SecondaryIssue";

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum CatalogError {
    #[display("pool {pool} has unsupported type {pool_type}")]
    UnsupportedPoolKind { pool: String, pool_type: String },
    #[display("invalid {field} {value:?} in pool {pool}")]
    InvalidField {
        pool: String,
        field: &'static str,
        value: String,
    },
    #[display("catalog fetch failed: {reason}")]
    FetchFailure { reason: String },
}

fn invalid(pool: &RawPool, field: &'static str, value: &str) -> CatalogError {
    CatalogError::InvalidField {
        pool: pool.id.clone(),
        field,
        value: value.to_string(),
    }
}

fn parse_address(
    pool: &RawPool,
    field: &'static str,
    value: &str,
) -> Result<Address, CatalogError> {
    Address::from_str(value).map_err(|_| invalid(pool, field, value))
}

/// Parses a non-negative decimal string into 18-decimal fixed point.
fn parse_fixed(pool: &RawPool, field: &'static str, value: &str) -> Result<U256, CatalogError> {
    match parse_units(value, FIXED_DECIMALS) {
        Ok(ParseUnits::U256(amount)) => Ok(amount),
        _ => Err(invalid(pool, field, value)),
    }
}

fn parse_timestamp(pool: &RawPool, value: &str) -> Result<u64, CatalogError> {
    value.parse().map_err(|_| invalid(pool, "timestamp", value))
}

fn parse_order(pool: &RawPool, order: &RawOrder) -> Result<Order, CatalogError> {
    Ok(Order {
        id: order.id.clone(),
        creator: parse_address(pool, "order creator", &order.creator)?,
        token_in: parse_address(pool, "order tokenIn", &order.token_in.address)?,
        token_out: parse_address(pool, "order tokenOut", &order.token_out.address)?,
        amount_offered: parse_fixed(pool, "amountOffered", &order.amount_offered)?,
        price_offered: parse_fixed(pool, "priceOffered", &order.price_offered)?,
        timestamp: parse_timestamp(pool, &order.timestamp)?,
        order_reference: order.order_reference.clone(),
    })
}

fn parse_trade(pool: &RawPool, trade: &RawTrade) -> Result<Trade, CatalogError> {
    Ok(Trade {
        id: trade.id.clone(),
        order_reference: trade.order_reference.clone(),
        price: parse_fixed(pool, "trade price", &trade.price)?,
        amount: parse_fixed(pool, "trade amount", &trade.amount)?,
        timestamp: parse_timestamp(pool, &trade.timestamp)?,
    })
}

/// Converts one subgraph record.
///
/// # Errors
/// * `CatalogError::UnsupportedPoolKind` for pool types other than primary and secondary issue
/// * `CatalogError::InvalidField` for unparsable addresses, amounts or timestamps, or a
///   security or currency that is not one of the pool tokens
pub fn parse_pool(raw: &RawPool) -> Result<Pool, CatalogError> {
    let kind = match raw.pool_type.as_str() {
        PRIMARY_POOL_TYPE => PoolKind::Primary,
        SECONDARY_POOL_TYPE => {
            let orders = raw
                .orders
                .iter()
                .map(|order| parse_order(raw, order))
                .collect::<Result<_, _>>()?;
            let trades = raw
                .secondary_trades
                .iter()
                .map(|trade| parse_trade(raw, trade))
                .collect::<Result<_, _>>()?;
            PoolKind::Secondary(OrderBook::new(orders, trades))
        }
        other => {
            return Err(CatalogError::UnsupportedPoolKind {
                pool: raw.id.clone(),
                pool_type: other.to_string(),
            })
        }
    };

    let id = PoolId::try_from(raw.id.as_str()).map_err(|_| invalid(raw, "id", &raw.id))?;
    let tokens = raw
        .tokens
        .iter()
        .map(|token| {
            Ok(PoolToken::new(
                parse_address(raw, "token", &token.address)?,
                token.decimals,
            ))
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;
    let security = parse_address(raw, "security", &raw.security)?;
    let currency = parse_address(raw, "currency", &raw.currency)?;

    let pool = Pool::new(id, kind, tokens, security, currency);
    if pool.token(security).is_none() {
        return Err(invalid(raw, "security", &raw.security));
    }
    if pool.token(currency).is_none() || security == currency {
        return Err(invalid(raw, "currency", &raw.currency));
    }
    Ok(pool)
}

/// Validated pools of one venue, in subgraph order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pools: Vec<Pool>,
}

impl Catalog {
    /// Parses the usable pools. Pools that fail to parse are logged and skipped.
    ///
    /// # Errors
    /// * `CatalogError::FetchFailure` if no pool survives
    pub fn from_raw(raw: &[RawPool]) -> Result<Self, CatalogError> {
        let mut pools = Vec::with_capacity(raw.len());
        for record in raw {
            match parse_pool(record) {
                Ok(pool) => pools.push(pool),
                Err(e) => warn!("catalog: skipping pool: {e}"),
            }
        }
        if pools.is_empty() {
            return Err(CatalogError::FetchFailure {
                reason: format!("none of {} pools are usable", raw.len()),
            });
        }
        Ok(Self { pools })
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn by_address(&self) -> HashMap<Address, Pool> {
        self.pools.iter().map(|pool| (pool.address, pool.clone())).collect()
    }

    /// Decimals of `token` as listed by any pool.
    pub fn decimals(&self, token: Address) -> Option<u8> {
        self.pools
            .iter()
            .find_map(|pool| pool.token(token))
            .map(|token| token.decimals)
    }
}

/// Where and for how long the catalog is cached.
#[derive(Debug, Clone)]
pub struct CatalogCacheConfig {
    pub dir: PathBuf,
    pub key: String,
    pub ttl: Duration,
}

impl CatalogCacheConfig {
    pub fn new(dir: impl Into<PathBuf>, venue: &str, network_id: u64, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            key: cache::cache_key(venue, network_id),
            ttl,
        }
    }
}

/// Loads the catalog, from the disk cache while it is fresh and from `source` otherwise.
///
/// # Errors
/// * `CatalogError::FetchFailure` if the fetch fails, returns nothing or nothing parses
pub async fn load_catalog<S: CatalogSource>(
    source: &S,
    cache: &CatalogCacheConfig,
) -> Result<Catalog> {
    let now = chrono::Utc::now().timestamp();

    if let Some(cached) = cache::read(&cache.dir, &cache.key).await {
        if cached.is_fresh(now, cache.ttl) {
            info!(
                "catalog: using {} cached pools from {}",
                cached.pools.len(),
                cache.key
            );
            return Ok(Catalog::from_raw(&cached.pools)?);
        }
    }

    let raw = source
        .fetch_pools()
        .await
        .map_err(|e| CatalogError::FetchFailure {
            reason: e.to_string(),
        })?;
    if raw.is_empty() {
        return Err(CatalogError::FetchFailure {
            reason: "query returned no pools".to_string(),
        }
        .into());
    }

    let catalog = Catalog::from_raw(&raw)?;
    let entry = CachedCatalog {
        fetched_at: now,
        pools: raw,
    };
    if let Err(e) = cache::write(&cache.dir, &cache.key, &entry).await {
        warn!("catalog: failed to cache pools under {}: {e}", cache.key);
    }
    Ok(catalog)
}
