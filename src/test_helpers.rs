use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use eyre::Result;
use tokio::sync::Semaphore;

use crate::math::ONE;
use crate::models::{Order, OrderBook, Pool, PoolId, PoolKind, PoolToken, Trade};
use crate::sync::multicall::{BatchCall, BatchReader, BatchResult, IIssuePool, IVault};

pub const SECURITY: Address = Address::repeat_byte(0xa1);
pub const CURRENCY: Address = Address::repeat_byte(0xc1);
pub const TRADER: Address = Address::repeat_byte(0x77);

/// `n` whole 18-decimal tokens
pub fn units(n: u64) -> U256 {
    U256::from(n) * ONE
}

/// Pool id whose leading 20 bytes are `address`
pub fn pool_id(address: Address) -> PoolId {
    let mut id = B256::ZERO;
    id[..20].copy_from_slice(address.as_slice());
    PoolId::new(id)
}

#[allow(dead_code)]
pub fn pool(
    address: Address,
    kind: PoolKind,
    security: (Address, u8),
    currency: (Address, u8),
) -> Pool {
    Pool::new(
        pool_id(address),
        kind,
        vec![
            PoolToken::new(security.0, security.1),
            PoolToken::new(currency.0, currency.1),
        ],
        security.0,
        currency.0,
    )
}

pub fn primary_pool(address: Address) -> Pool {
    pool(address, PoolKind::Primary, (SECURITY, 18), (CURRENCY, 18))
}

pub fn secondary_pool(address: Address, orders: Vec<Order>, trades: Vec<Trade>) -> Pool {
    pool(
        address,
        PoolKind::Secondary(OrderBook::new(orders, trades)),
        (SECURITY, 18),
        (CURRENCY, 18),
    )
}

/// Order offering `amount` of currency for security at `price`
#[allow(dead_code)]
pub fn bid(reference: &str, amount: U256, price: U256, timestamp: u64) -> Order {
    Order {
        id: format!("{reference}-{timestamp}"),
        creator: Address::repeat_byte(0x0c),
        token_in: CURRENCY,
        token_out: SECURITY,
        amount_offered: amount,
        price_offered: price,
        timestamp,
        order_reference: reference.to_string(),
    }
}

/// Order offering `amount` of security for currency at `price`
#[allow(dead_code)]
pub fn ask(reference: &str, amount: U256, price: U256, timestamp: u64) -> Order {
    Order {
        token_in: SECURITY,
        token_out: CURRENCY,
        ..bid(reference, amount, price, timestamp)
    }
}

#[allow(dead_code)]
pub fn trade(reference: &str, amount: U256, price: U256, timestamp: u64) -> Trade {
    Trade {
        id: format!("trade-{reference}-{timestamp}"),
        order_reference: reference.to_string(),
        price,
        amount,
        timestamp,
    }
}

#[derive(Default)]
struct Fixture {
    balances: Vec<(Address, U256)>,
    failing: bool,
}

/// In-memory Multicall3 stand-in.
///
/// `echo` mode returns every call's data as its result. Otherwise it answers the pool state
/// calls from fixtures registered with [`MockBatchReader::set_balances`]. A gated reader
/// holds every batch until the test adds permits to the gate.
#[derive(Default)]
pub struct MockBatchReader {
    echo: bool,
    gate: Option<Arc<Semaphore>>,
    fixtures: Mutex<HashMap<Address, Fixture>>,
    minimum_order_size: U256,
    minimum_price: U256,
    batches: AtomicUsize,
    calls: AtomicUsize,
}

impl MockBatchReader {
    pub fn new() -> Self {
        Self {
            minimum_order_size: U256::from(1),
            minimum_price: ONE,
            ..Self::default()
        }
    }

    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let reader = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (reader, gate)
    }

    pub fn set_balances(&self, pool: Address, balances: &[(Address, u64)]) {
        let mut fixtures = self.fixtures.lock().unwrap();
        fixtures.entry(pool).or_default().balances = balances
            .iter()
            .map(|(token, balance)| (*token, U256::from(*balance)))
            .collect();
    }

    pub fn set_scaled_balances(&self, pool: Address, balances: &[(Address, U256)]) {
        let mut fixtures = self.fixtures.lock().unwrap();
        fixtures.entry(pool).or_default().balances = balances.to_vec();
    }

    /// Makes every `getPoolTokens` call for `pool` revert
    pub fn fail_pool(&self, pool: Address) {
        self.fixtures.lock().unwrap().entry(pool).or_default().failing = true;
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, call: &BatchCall) -> BatchResult {
        let reverted = BatchResult {
            success: false,
            return_data: Bytes::new(),
        };
        let fixtures = self.fixtures.lock().unwrap();
        let selector = call.call_data.get(..4).unwrap_or_default();

        let return_data: Vec<u8> = if selector == IVault::getPoolTokensCall::SELECTOR {
            let Ok(request) = IVault::getPoolTokensCall::abi_decode(&call.call_data, true) else {
                return reverted;
            };
            let pool = PoolId::new(request.poolId).address();
            match fixtures.get(&pool) {
                Some(fixture) if !fixture.failing => {
                    let (tokens, balances): (Vec<Address>, Vec<U256>) =
                        fixture.balances.iter().copied().unzip();
                    (tokens, balances, U256::ZERO).abi_encode_params()
                }
                _ => return reverted,
            }
        } else if selector == IIssuePool::getMinimumOrderSizeCall::SELECTOR {
            self.minimum_order_size.abi_encode()
        } else if selector == IIssuePool::getMinimumPriceCall::SELECTOR {
            self.minimum_price.abi_encode()
        } else {
            return reverted;
        };

        BatchResult {
            success: true,
            return_data: return_data.into(),
        }
    }
}

impl BatchReader for MockBatchReader {
    async fn aggregate(
        &self,
        calls: Vec<BatchCall>,
        _block_number: u64,
    ) -> Result<Vec<BatchResult>> {
        if let Some(gate) = &self.gate {
            let _open = gate.acquire().await?;
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.calls.fetch_add(calls.len(), Ordering::SeqCst);
        if self.echo {
            return Ok(calls
                .into_iter()
                .map(|call| BatchResult {
                    success: true,
                    return_data: call.call_data,
                })
                .collect());
        }
        Ok(calls.iter().map(|call| self.answer(call)).collect())
    }
}
