//! Mutable on-chain state of one pool and the event deltas that move it.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};

use super::events::PoolEvent;
use super::SyncError;
use crate::math;

/// Venue minimums read from the pool contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLimits {
    Primary {
        minimum_order_size: U256,
        minimum_price: U256,
    },
    Secondary {
        minimum_order_size: U256,
    },
}

impl PoolLimits {
    pub const fn minimum_order_size(&self) -> U256 {
        match self {
            Self::Primary {
                minimum_order_size, ..
            }
            | Self::Secondary { minimum_order_size } => *minimum_order_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub balances: HashMap<Address, U256>,
    /// Always zero for issue pools
    pub swap_fee: U256,
    pub limits: PoolLimits,
}

impl PoolState {
    pub fn new(tokens: &[Address], balances: &[U256], limits: PoolLimits) -> Self {
        Self {
            balances: tokens.iter().copied().zip(balances.iter().copied()).collect(),
            swap_fee: U256::ZERO,
            limits,
        }
    }

    pub fn balance(&self, token: Address) -> U256 {
        self.balances.get(&token).copied().unwrap_or_default()
    }

    /// Returns a new state with the event delta applied. The receiver is left untouched.
    ///
    /// # Errors
    /// * `SyncError::Arithmetic` if a balance would overflow or go negative, which means the
    ///   local state diverged from the chain
    /// * `SyncError::MalformedEvent` if the per-token arrays disagree in length
    pub fn apply(&self, event: &PoolEvent) -> Result<Self, SyncError> {
        let pool = event.pool_address();
        let fault = |fault| SyncError::Arithmetic { pool, fault };
        let mut next = self.clone();
        match event {
            PoolEvent::Swap {
                token_in,
                token_out,
                amount_in,
                amount_out,
                ..
            } => {
                let balance_in = next.balances.entry(*token_in).or_default();
                *balance_in = math::add(*balance_in, *amount_in).map_err(fault)?;
                let balance_out = next.balances.entry(*token_out).or_default();
                *balance_out = math::sub(*balance_out, *amount_out).map_err(fault)?;
            }
            PoolEvent::PoolBalanceChanged {
                tokens,
                deltas,
                protocol_fee_amounts,
                ..
            } => {
                if tokens.len() != deltas.len() || tokens.len() != protocol_fee_amounts.len() {
                    return Err(SyncError::MalformedEvent {
                        pool,
                        event: event.name(),
                    });
                }
                for ((token, delta), fee) in tokens.iter().zip(deltas).zip(protocol_fee_amounts) {
                    let balance = next.balances.entry(*token).or_default();
                    *balance = math::add_signed(*balance, *delta)
                        .and_then(|b| math::sub(b, *fee))
                        .map_err(fault)?;
                }
            }
        }
        Ok(next)
    }
}

pub type PoolStateMap = HashMap<Address, Arc<PoolState>>;
