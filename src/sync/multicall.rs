//! Batched on-chain reads through Multicall3.
//!
//! A resync builds one flat list of calls for every pool it needs, splits it into chunks of
//! at most `chunk_size` calls, runs the chunks concurrently and stitches the results back in
//! request order. Decoding walks the flat result list with a [`ResultCursor`].

use std::future::Future;

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, U256},
    providers::Provider,
    sol,
    sol_types::SolCall,
};
use eyre::{bail, Result};
use futures::future::try_join_all;

use super::state::{PoolLimits, PoolState};
use super::SyncError;
use crate::models::{Pool, PoolKind};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct CallResult {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (CallResult[] memory returnData);
    }
}

sol! {
    interface IVault {
        function getPoolTokens(bytes32 poolId)
            external
            view
            returns (address[] memory tokens, uint256[] memory balances, uint256 lastChangeBlock);
    }

    interface IIssuePool {
        function getMinimumOrderSize() external view returns (uint256);
        function getMinimumPrice() external view returns (uint256);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub target: Address,
    pub call_data: Bytes,
}

impl BatchCall {
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self {
            target,
            call_data: call.abi_encode().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Executes one batch of read calls at a block. Remote failures are returned, not retried.
pub trait BatchReader: Send + Sync {
    fn aggregate(
        &self,
        calls: Vec<BatchCall>,
        block_number: u64,
    ) -> impl Future<Output = Result<Vec<BatchResult>>> + Send;
}

/// `BatchReader` backed by a Multicall3 deployment
#[derive(Debug, Clone)]
pub struct AlloyBatchReader<P> {
    provider: P,
    multicall: Address,
}

impl<P> AlloyBatchReader<P> {
    pub const fn new(provider: P, multicall: Address) -> Self {
        Self {
            provider,
            multicall,
        }
    }
}

impl<P> BatchReader for AlloyBatchReader<P>
where
    P: Provider + Clone + 'static,
{
    async fn aggregate(
        &self,
        calls: Vec<BatchCall>,
        block_number: u64,
    ) -> Result<Vec<BatchResult>> {
        let multicall = IMulticall3::new(self.multicall, self.provider.clone());
        let calls = calls
            .into_iter()
            .map(|call| IMulticall3::Call3 {
                target: call.target,
                allowFailure: true,
                callData: call.call_data,
            })
            .collect();

        let results = multicall
            .aggregate3(calls)
            .block(BlockId::number(block_number))
            .call()
            .await?
            .returnData;

        Ok(results
            .into_iter()
            .map(|result| BatchResult {
                success: result.success,
                return_data: result.returnData,
            })
            .collect())
    }
}

/// Runs `calls` in concurrent chunks and returns the results in request order.
///
/// # Errors
/// * If any chunk fails
/// * If the reader returns a different number of results than calls
pub async fn aggregate_chunked<R: BatchReader>(
    reader: &R,
    calls: Vec<BatchCall>,
    chunk_size: usize,
    block_number: u64,
) -> Result<Vec<BatchResult>> {
    let expected = calls.len();
    let requests = calls
        .chunks(chunk_size.max(1))
        .map(|chunk| reader.aggregate(chunk.to_vec(), block_number));

    let results: Vec<BatchResult> = try_join_all(requests).await?.into_iter().flatten().collect();

    if results.len() != expected {
        bail!(
            "sync::multicall: expected {expected} results at block {block_number}, got {}",
            results.len()
        );
    }
    Ok(results)
}

/// Running index into a flat multicall result list.
pub struct ResultCursor<'a> {
    results: &'a [BatchResult],
    index: usize,
}

impl<'a> ResultCursor<'a> {
    pub const fn new(results: &'a [BatchResult]) -> Self {
        Self { results, index: 0 }
    }

    /// Decodes the next result as the return of `C`.
    ///
    /// # Errors
    /// * `SyncError::Decode` if the call reverted, the cursor is exhausted or the bytes
    ///   do not decode
    pub fn next<C: SolCall>(&mut self, pool: Address) -> Result<C::Return, SyncError> {
        let result = self.results.get(self.index).ok_or_else(|| SyncError::Decode {
            pool,
            reason: format!("missing result #{} for {}", self.index, C::SIGNATURE),
        })?;
        self.index += 1;

        if !result.success {
            return Err(SyncError::Decode {
                pool,
                reason: format!("{} reverted", C::SIGNATURE),
            });
        }

        C::abi_decode_returns(&result.return_data, true).map_err(|e| SyncError::Decode {
            pool,
            reason: format!("{}: {e}", C::SIGNATURE),
        })
    }

    /// Hands out the next `len` results as their own cursor and moves past them, so a
    /// failure inside one pool never shifts the pools after it.
    pub fn split(&mut self, len: usize) -> ResultCursor<'a> {
        let start = self.index.min(self.results.len());
        let end = (start + len).min(self.results.len());
        self.index = start + len;
        ResultCursor::new(&self.results[start..end])
    }
}

/// Calls needed to rebuild one pool's state, in decode order.
pub fn state_calls(pool: &Pool, vault: Address) -> Vec<BatchCall> {
    let mut calls = vec![
        BatchCall::new(
            vault,
            &IVault::getPoolTokensCall {
                poolId: pool.id.as_b256(),
            },
        ),
        BatchCall::new(pool.address, &IIssuePool::getMinimumOrderSizeCall {}),
    ];
    if pool.kind.is_primary() {
        calls.push(BatchCall::new(
            pool.address,
            &IIssuePool::getMinimumPriceCall {},
        ));
    }
    calls
}

/// Decodes the results produced by [`state_calls`] for the same pool.
///
/// # Errors
/// * `SyncError::Decode` on any reverted or malformed result
pub fn decode_state(pool: &Pool, cursor: &mut ResultCursor<'_>) -> Result<PoolState, SyncError> {
    let pool_tokens = cursor.next::<IVault::getPoolTokensCall>(pool.address)?;
    if pool_tokens.tokens.len() != pool_tokens.balances.len() {
        return Err(SyncError::Decode {
            pool: pool.address,
            reason: "getPoolTokens returned mismatched arrays".to_string(),
        });
    }

    let minimum_order_size: U256 = cursor
        .next::<IIssuePool::getMinimumOrderSizeCall>(pool.address)?
        ._0;

    let limits = match pool.kind {
        PoolKind::Primary => PoolLimits::Primary {
            minimum_order_size,
            minimum_price: cursor.next::<IIssuePool::getMinimumPriceCall>(pool.address)?._0,
        },
        PoolKind::Secondary(_) => PoolLimits::Secondary { minimum_order_size },
    };

    Ok(PoolState::new(
        &pool_tokens.tokens,
        &pool_tokens.balances,
        limits,
    ))
}
