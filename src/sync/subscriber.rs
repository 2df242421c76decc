use alloy::{
    eips::BlockNumberOrTag,
    primitives::Address,
    providers::Provider,
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use eyre::Result;
use futures::StreamExt;
use tokio::time::{sleep, Duration};

use super::events::{PoolBalanceChanged, Swap};

/// Filter for the vault events that move issue-pool balances
pub fn vault_filter(vault: Address) -> Filter {
    Filter::new()
        .address(vault)
        .event_signature(vec![Swap::SIGNATURE_HASH, PoolBalanceChanged::SIGNATURE_HASH])
        .from_block(BlockNumberOrTag::Latest)
}

/// Subscribes to vault logs and hands every log to `on_log`
///
/// Resubscribes after a failed subscription or a closed stream, so it only returns when the
/// task is cancelled. `on_subscribed` runs after every successful subscription; logs from
/// before it may have been missed.
pub async fn subscribe_vault_logs<P, S, F>(
    provider: &P,
    vault: Address,
    mut on_subscribed: S,
    mut on_log: F,
) -> Result<()>
where
    P: Provider,
    S: FnMut(),
    F: FnMut(Log),
{
    let filter = vault_filter(vault);

    loop {
        // Subscribe to vault events
        let mut stream = loop {
            match provider.subscribe_logs(&filter).await {
                Ok(sub) => break sub.into_stream(),
                Err(e) => {
                    log::error!("sync::subscriber: Failed to subscribe to logs: {e}");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        log::info!("sync::subscriber: subscribed to vault {vault}");
        on_subscribed();

        while let Some(log) = stream.next().await {
            on_log(log);
        }
        log::warn!("sync::subscriber: log stream closed, resubscribing");
    }
}
