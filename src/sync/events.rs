use alloy::{
    primitives::{Address, I256, U256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use eyre::Result;

use crate::models::PoolId;

sol! {
    event Swap(
        bytes32 indexed poolId,
        address indexed tokenIn,
        address indexed tokenOut,
        uint256 amountIn,
        uint256 amountOut
    );

    event PoolBalanceChanged(
        bytes32 indexed poolId,
        address indexed liquidityProvider,
        address[] tokens,
        int256[] deltas,
        uint256[] protocolFeeAmounts
    );
}

/// The vault events that move issue-pool balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Swap {
        pool_id: PoolId,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
    },
    PoolBalanceChanged {
        pool_id: PoolId,
        tokens: Vec<Address>,
        deltas: Vec<I256>,
        protocol_fee_amounts: Vec<U256>,
    },
}

impl PoolEvent {
    pub const fn pool_id(&self) -> PoolId {
        match self {
            Self::Swap { pool_id, .. } | Self::PoolBalanceChanged { pool_id, .. } => *pool_id,
        }
    }

    pub fn pool_address(&self) -> Address {
        self.pool_id().address()
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Swap { .. } => "Swap",
            Self::PoolBalanceChanged { .. } => "PoolBalanceChanged",
        }
    }
}

/// A decoded event and the block it was mined in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub block_number: u64,
    pub event: PoolEvent,
}

/// Decodes a raw vault log.
///
/// # Returns
/// * `Ok(None)` - the log is not one of the two balance-moving events
/// * `Ok(Some(event))` - the decoded event
///
/// # Errors
/// * If the topic matches but the payload does not decode
/// * If the log carries no block number (pending logs are not applied)
pub fn decode_log(log: &Log) -> Result<Option<BlockEvent>> {
    let Some(topic) = log.topic0() else {
        return Ok(None);
    };

    let event = if *topic == Swap::SIGNATURE_HASH {
        let swap = Swap::decode_log(&log.inner, true)?;
        PoolEvent::Swap {
            pool_id: PoolId::new(swap.poolId),
            token_in: swap.tokenIn,
            token_out: swap.tokenOut,
            amount_in: swap.amountIn,
            amount_out: swap.amountOut,
        }
    } else if *topic == PoolBalanceChanged::SIGNATURE_HASH {
        let changed = PoolBalanceChanged::decode_log(&log.inner, true)?;
        PoolEvent::PoolBalanceChanged {
            pool_id: PoolId::new(changed.poolId),
            tokens: changed.tokens.clone(),
            deltas: changed.deltas.clone(),
            protocol_fee_amounts: changed.protocolFeeAmounts.clone(),
        }
    } else {
        return Ok(None);
    };

    let block_number = log
        .block_number
        .ok_or_else(|| eyre::eyre!("{} log without block number", event.name()))?;

    Ok(Some(BlockEvent {
        block_number,
        event,
    }))
}
