use std::future::Future;
use std::time::Duration;

use eyre::{bail, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

/// Page size of the pools query
pub const PAGE_SIZE: usize = 100;

const POOLS_QUERY: &str = r"
query Pools($first: Int!, $skip: Int!) {
  pools(first: $first, skip: $skip, orderBy: id) {
    id
    address
    poolType
    security
    currency
    tokens { address decimals }
    orders {
      id
      creator
      tokenIn { address }
      tokenOut { address }
      amountOffered
      priceOffered
      timestamp
      orderReference
    }
    secondaryTrades {
      id
      orderReference
      price
      amount
      timestamp
    }
  }
}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawToken {
    pub address: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTokenRef {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub id: String,
    pub creator: String,
    pub token_in: RawTokenRef,
    pub token_out: RawTokenRef,
    /// Decimal string in whole tokens
    pub amount_offered: String,
    pub price_offered: String,
    pub timestamp: String,
    pub order_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    pub id: String,
    pub order_reference: String,
    pub price: String,
    pub amount: String,
    pub timestamp: String,
}

/// A pool exactly as the subgraph returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPool {
    pub id: String,
    pub address: String,
    pub pool_type: String,
    pub security: String,
    pub currency: String,
    pub tokens: Vec<RawToken>,
    #[serde(default)]
    pub orders: Vec<RawOrder>,
    #[serde(default)]
    pub secondary_trades: Vec<RawTrade>,
}

/// Where the catalog comes from.
pub trait CatalogSource: Send + Sync {
    fn fetch_pools(&self) -> impl Future<Output = Result<Vec<RawPool>>> + Send;
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct PoolsPage {
    pools: Vec<RawPool>,
}

#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: reqwest::Client,
    url: Url,
    page_size: usize,
}

impl SubgraphClient {
    /// # Errors
    /// * If the HTTP client cannot be built
    pub fn new(url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url,
            page_size: PAGE_SIZE,
        })
    }

    /// Pools per request, at least one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn fetch_page(&self, skip: usize) -> Result<Vec<RawPool>> {
        let body = json!({
            "query": POOLS_QUERY,
            "variables": { "first": self.page_size, "skip": skip },
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let page: GraphQlResponse<PoolsPage> = response.json().await?;

        if let Some(error) = page.errors.first() {
            bail!("subgraph query failed: {}", error.message);
        }
        let Some(data) = page.data else {
            bail!("subgraph returned no data");
        };
        Ok(data.pools)
    }
}

impl CatalogSource for SubgraphClient {
    async fn fetch_pools(&self) -> Result<Vec<RawPool>> {
        let mut pools = Vec::new();
        loop {
            let page = self.fetch_page(pools.len()).await?;
            let done = page.len() < self.page_size;
            debug!(
                "catalog::subgraph: page at {} returned {} pools",
                pools.len(),
                page.len()
            );
            pools.extend(page);
            if done {
                break;
            }
        }
        info!("catalog::subgraph: fetched {} pools from {}", pools.len(), self.url);
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pools_page() {
        let body = r#"{
            "data": {
                "pools": [{
                    "id": "0x1a5f6d9e5c4a6e2b2a3f4c5d6e7f8091a2b3c4d5000100000000000000000123",
                    "address": "0x1a5f6d9e5c4a6e2b2a3f4c5d6e7f8091a2b3c4d5",
                    "poolType": "SecondaryIssue",
                    "security": "0x00000000000000000000000000000000000000a1",
                    "currency": "0x00000000000000000000000000000000000000c1",
                    "tokens": [
                        { "address": "0x00000000000000000000000000000000000000a1", "decimals": 18 },
                        { "address": "0x00000000000000000000000000000000000000c1", "decimals": 6 }
                    ],
                    "orders": [{
                        "id": "o-1",
                        "creator": "0x0000000000000000000000000000000000000077",
                        "tokenIn": { "address": "0x00000000000000000000000000000000000000c1" },
                        "tokenOut": { "address": "0x00000000000000000000000000000000000000a1" },
                        "amountOffered": "950.5",
                        "priceOffered": "0.95",
                        "timestamp": "1700000000",
                        "orderReference": "ref-1"
                    }],
                    "secondaryTrades": []
                }]
            }
        }"#;

        let page: GraphQlResponse<PoolsPage> = serde_json::from_str(body).unwrap();
        let pools = page.data.unwrap().pools;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].pool_type, "SecondaryIssue");
        assert_eq!(pools[0].tokens[1].decimals, 6);
        assert_eq!(
            pools[0].orders[0].token_in.address,
            "0x00000000000000000000000000000000000000c1"
        );
        assert!(page.errors.is_empty());
    }

    #[test]
    fn test_primary_pool_without_book() {
        let body = r#"{
            "id": "0x1a5f6d9e5c4a6e2b2a3f4c5d6e7f8091a2b3c4d5000100000000000000000123",
            "address": "0x1a5f6d9e5c4a6e2b2a3f4c5d6e7f8091a2b3c4d5",
            "poolType": "PrimaryIssue",
            "security": "0x00000000000000000000000000000000000000a1",
            "currency": "0x00000000000000000000000000000000000000c1",
            "tokens": []
        }"#;
        let pool: RawPool = serde_json::from_str(body).unwrap();
        assert!(pool.orders.is_empty());
        assert!(pool.secondary_trades.is_empty());
    }

    #[test]
    fn test_page_size_is_at_least_one() {
        let url = Url::parse("http://localhost:8000/subgraphs/name/verified/vault").unwrap();
        let client = SubgraphClient::new(url).unwrap();
        assert_eq!(client.page_size, PAGE_SIZE);
        assert_eq!(client.clone().with_page_size(0).page_size, 1);
        assert_eq!(client.with_page_size(25).page_size, 25);
    }

    #[test]
    fn test_graphql_errors() {
        let body = r#"{ "errors": [{ "message": "indexing error" }] }"#;
        let page: GraphQlResponse<PoolsPage> = serde_json::from_str(body).unwrap();
        assert!(page.data.is_none());
        assert_eq!(page.errors[0].message, "indexing error");
    }
}
