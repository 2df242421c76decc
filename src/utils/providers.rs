use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use eyre::Result;
use log::info;
use url::Url;

/// Creates an HTTP provider for batched reads
pub fn create_http_provider(url: &Url) -> impl Provider + Clone + 'static {
    info!("Using HTTP provider at {url}");
    ProviderBuilder::new().on_http(url.clone())
}

/// Creates a WebSocket provider for log subscriptions
///
/// # Errors
/// * If the WebSocket connection cannot be established
pub async fn create_ws_provider(url: &Url) -> Result<impl Provider + Clone + 'static> {
    info!("Using WebSocket provider at {url}");
    let ws = WsConnect::new(url.as_str());
    Ok(ProviderBuilder::new().on_ws(ws).await?)
}
