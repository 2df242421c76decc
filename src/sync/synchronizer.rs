//! Keeps issue-pool state consistent with the chain.
//!
//! Two sources feed the state of a pool:
//! - decoded vault events, applied copy-on-write to the live store as logs arrive
//! - full batched reads at an explicit block, issued when a request needs a pool the live
//!   store cannot serve
//!
//! A batched read at block N is canonical for N: events at or before N for that pool are
//! already reflected in it and are dropped when they arrive late. Events that arrive while a
//! pool has no live state cannot be applied. The highest such block is remembered, and a read
//! older than it serves its request without becoming live state.
//!
//! Pricing requests carry their own [`BlockCache`]. A cache built for another block is
//! discarded, never merged.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use alloy::primitives::Address;
use eyre::Result;
use log::{debug, error, info, warn};

use super::events::BlockEvent;
use super::multicall::{aggregate_chunked, decode_state, state_calls, BatchReader, ResultCursor};
use super::state::{PoolState, PoolStateMap};
use crate::models::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    Resync,
    Event,
}

/// Live state of one pool and where it came from
#[derive(Debug, Clone)]
pub struct TrackedState {
    pub state: Arc<PoolState>,
    pub block_number: u64,
    pub source: StateSource,
}

/// What happened to a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    /// Address not in the catalog
    Untracked,
    /// Tracked, but no live state to apply it to; reads older than this block are not kept
    NoBaseState,
    /// Already reflected in a newer or canonical state
    Stale,
    /// The delta faulted; the live state was dropped so the next request resyncs at or
    /// after this block
    Invalidated,
}

/// Pool states for one pricing request, valid for exactly one (venue, block) pair.
#[derive(Debug, Clone)]
pub struct BlockCache {
    venue: String,
    block_number: Option<u64>,
    states: PoolStateMap,
}

impl BlockCache {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            block_number: None,
            states: HashMap::new(),
        }
    }

    pub const fn block_number(&self) -> Option<u64> {
        self.block_number
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, pool: &Address) -> Option<&Arc<PoolState>> {
        self.states.get(pool)
    }

    /// Discards the entries if they belong to another venue or block.
    fn claim(&mut self, venue: &str, block_number: u64) {
        if self.venue != venue || self.block_number != Some(block_number) {
            if !self.states.is_empty() {
                debug!(
                    "sync::cache: discarding {} states of {} at block {:?} for block {}",
                    self.states.len(),
                    self.venue,
                    self.block_number,
                    block_number
                );
            }
            venue.clone_into(&mut self.venue);
            self.block_number = Some(block_number);
            self.states.clear();
        }
    }
}

pub struct Synchronizer<R> {
    venue: String,
    vault: Address,
    chunk_size: usize,
    reader: R,
    tracked: RwLock<Arc<HashMap<Address, Pool>>>,
    live: RwLock<Arc<HashMap<Address, TrackedState>>>,
    /// Highest block of an event that found no live state, per pool. Locked after `live`.
    missed: Mutex<HashMap<Address, u64>>,
}

impl<R: BatchReader> Synchronizer<R> {
    pub fn new(venue: impl Into<String>, vault: Address, chunk_size: usize, reader: R) -> Self {
        Self {
            venue: venue.into(),
            vault,
            chunk_size,
            reader,
            tracked: RwLock::new(Arc::new(HashMap::new())),
            live: RwLock::new(Arc::new(HashMap::new())),
            missed: Mutex::new(HashMap::new()),
        }
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    /// Replaces the tracked pool set. Live state of pools that left the catalog is dropped.
    pub fn track(&self, pools: &[Pool]) {
        let tracked: HashMap<Address, Pool> =
            pools.iter().map(|p| (p.address, p.clone())).collect();

        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        let retained: HashMap<Address, TrackedState> = live
            .iter()
            .filter(|(address, _)| tracked.contains_key(*address))
            .map(|(address, entry)| (*address, entry.clone()))
            .collect();
        let dropped = live.len() - retained.len();
        *live = Arc::new(retained);
        self.missed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|address, _| tracked.contains_key(address));
        drop(live);

        info!(
            "sync::synchronizer: tracking {} {} pools ({dropped} dropped)",
            tracked.len(),
            self.venue
        );
        *self.tracked.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(tracked);
    }

    pub fn is_tracked(&self, pool: &Address) -> bool {
        self.tracked_snapshot().contains_key(pool)
    }

    fn tracked_snapshot(&self) -> Arc<HashMap<Address, Pool>> {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A complete snapshot of the live store. Later events never mutate it.
    pub fn live_snapshot(&self) -> Arc<HashMap<Address, TrackedState>> {
        self.live.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn live_state(&self, pool: &Address) -> Option<TrackedState> {
        self.live_snapshot().get(pool).cloned()
    }

    /// Applies a decoded vault event. Never performs I/O.
    pub fn apply_event(&self, event: &BlockEvent) -> EventOutcome {
        let pool = event.event.pool_address();
        if !self.is_tracked(&pool) {
            return EventOutcome::Untracked;
        }

        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = live.get(&pool) else {
            self.record_missed(pool, event.block_number);
            debug!(
                "sync::events: no live state for {pool}, remembering block {}",
                event.block_number
            );
            return EventOutcome::NoBaseState;
        };

        let stale = match current.source {
            StateSource::Resync => event.block_number <= current.block_number,
            StateSource::Event => event.block_number < current.block_number,
        };
        if stale {
            debug!(
                "sync::events: skipping {} for {pool} at block {}, state is at block {}",
                event.event.name(),
                event.block_number,
                current.block_number
            );
            return EventOutcome::Stale;
        }

        let mut next = (**live).clone();
        match current.state.apply(&event.event) {
            Ok(state) => {
                next.insert(
                    pool,
                    TrackedState {
                        state: Arc::new(state),
                        block_number: event.block_number,
                        source: StateSource::Event,
                    },
                );
                *live = Arc::new(next);
                debug!(
                    "sync::events: applied {} to {pool} at block {}",
                    event.event.name(),
                    event.block_number
                );
                EventOutcome::Applied
            }
            Err(e) => {
                error!("sync::events: {e}, dropping live state of {pool}");
                next.remove(&pool);
                *live = Arc::new(next);
                self.record_missed(pool, event.block_number);
                EventOutcome::Invalidated
            }
        }
    }

    fn record_missed(&self, pool: Address, block_number: u64) {
        let mut missed = self.missed.lock().unwrap_or_else(PoisonError::into_inner);
        let highest = missed.entry(pool).or_insert(block_number);
        *highest = (*highest).max(block_number);
    }

    /// Stores a canonical state unless the live store already holds a newer one, or an event
    /// newer than `block_number` went unapplied.
    ///
    /// # Returns
    /// * Whether the state became live
    fn seed(&self, pool: Address, state: Arc<PoolState>, block_number: u64) -> bool {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        if live
            .get(&pool)
            .is_some_and(|current| current.block_number > block_number)
        {
            return false;
        }

        let mut missed = self.missed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&missed_block) = missed.get(&pool) {
            if missed_block > block_number {
                debug!(
                    "sync::synchronizer: not keeping {pool} at block {block_number}, \
                     an event at block {missed_block} was not applied"
                );
                return false;
            }
            missed.remove(&pool);
        }
        drop(missed);

        let mut next = (**live).clone();
        next.insert(
            pool,
            TrackedState {
                state,
                block_number,
                source: StateSource::Resync,
            },
        );
        *live = Arc::new(next);
        true
    }

    /// Reads every tracked pool at `block_number` into the live store.
    ///
    /// # Returns
    /// * Number of pools whose state became live
    ///
    /// # Errors
    /// * If the batched read fails or a result cannot be decoded; nothing is stored
    pub async fn resync_tracked(&self, block_number: u64) -> Result<usize> {
        let mut pools: Vec<Pool> = self.tracked_snapshot().values().cloned().collect();
        pools.sort_by_key(|pool| pool.address);

        let mut seeded = 0;
        for (address, state) in self.resync(&pools, block_number).await? {
            if self.seed(address, Arc::new(state), block_number) {
                seeded += 1;
            }
        }
        info!(
            "sync::synchronizer: {seeded} of {} {} pools live at block {block_number}",
            pools.len(),
            self.venue
        );
        Ok(seeded)
    }

    /// Pool states at `block_number` for the requested pools.
    ///
    /// Served from `cache` when it is already at `block_number`, then from the live store,
    /// and whatever is still missing is read in one batched call at exactly that block.
    ///
    /// # Errors
    /// * If the batched read fails
    /// * `SyncError::Decode` if any result of the batch cannot be decoded; none of the
    ///   pools of that batch are stored
    pub async fn states_at(
        &self,
        cache: &mut BlockCache,
        block_number: u64,
        pools: &[Address],
    ) -> Result<PoolStateMap> {
        cache.claim(&self.venue, block_number);

        let live = self.live_snapshot();
        let tracked = self.tracked_snapshot();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for address in pools {
            if !seen.insert(*address) || cache.states.contains_key(address) {
                continue;
            }
            if let Some(entry) = live
                .get(address)
                .filter(|entry| entry.block_number <= block_number)
            {
                cache.states.insert(*address, entry.state.clone());
                continue;
            }
            match tracked.get(address) {
                Some(pool) => missing.push(pool.clone()),
                None => warn!(
                    "sync::synchronizer: {address} is not a tracked {} pool",
                    self.venue
                ),
            }
        }

        if !missing.is_empty() {
            let fetched = self.resync(&missing, block_number).await?;
            for (address, state) in fetched {
                let state = Arc::new(state);
                cache.states.insert(address, state.clone());
                self.seed(address, state, block_number);
            }
        }

        Ok(pools
            .iter()
            .filter_map(|address| cache.states.get(address).map(|s| (*address, s.clone())))
            .collect())
    }

    /// Reads full state for `pools` at `block_number`.
    ///
    /// # Errors
    /// * If the batched read fails
    /// * `SyncError::Decode` on the first pool whose results cannot be decoded
    pub async fn resync(
        &self,
        pools: &[Pool],
        block_number: u64,
    ) -> Result<Vec<(Address, PoolState)>> {
        let plans: Vec<_> = pools.iter().map(|pool| state_calls(pool, self.vault)).collect();
        let call_counts: Vec<usize> = plans.iter().map(Vec::len).collect();
        let calls = plans.into_iter().flatten().collect();

        info!(
            "sync::resync: reading {} {} pools at block {block_number}",
            pools.len(),
            self.venue
        );
        let results =
            aggregate_chunked(&self.reader, calls, self.chunk_size, block_number).await?;

        let mut cursor = ResultCursor::new(&results);
        let mut states = Vec::with_capacity(pools.len());
        for (pool, count) in pools.iter().zip(call_counts) {
            let mut pool_cursor = cursor.split(count);
            match decode_state(pool, &mut pool_cursor) {
                Ok(state) => states.push((pool.address, state)),
                Err(e) => {
                    error!("sync::resync: {e}");
                    return Err(e.into());
                }
            }
        }
        Ok(states)
    }
}
