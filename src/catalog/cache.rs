use std::path::Path;
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use super::RawPool;

/// Catalog snapshot as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCatalog {
    /// Unix seconds
    pub fetched_at: i64,
    pub pools: Vec<RawPool>,
}

impl CachedCatalog {
    pub fn is_fresh(&self, now: i64, ttl: Duration) -> bool {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(self.fetched_at) < ttl
    }
}

pub fn cache_key(venue: &str, network_id: u64) -> String {
    format!("{venue}_{network_id}_pools")
}

/// Cached catalog under `key`, if there is a readable one.
pub async fn read(dir: &Path, key: &str) -> Option<CachedCatalog> {
    let bytes = match cacache::read(dir, key).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("catalog::cache: no entry for {key}: {e}");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(cached) => Some(cached),
        Err(e) => {
            debug!("catalog::cache: discarding unreadable entry {key}: {e}");
            None
        }
    }
}

/// # Errors
/// * If the entry cannot be serialized or written
pub async fn write(dir: &Path, key: &str, catalog: &CachedCatalog) -> Result<()> {
    let bytes = serde_json::to_vec(catalog)?;
    cacache::write(dir, key, bytes).await?;
    Ok(())
}
