//! Resting orders and historical trades of a secondary issue pool.
//!
//! Amounts are normalized to 18 decimals when the catalog is parsed, prices are 18-decimal
//! fixed-point currency per security.
use alloy::primitives::{Address, U256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Order {
    pub id: String,
    pub creator: Address,
    /// What the creator gives
    pub token_in: Address,
    /// What the creator receives
    pub token_out: Address,
    /// Amount of `token_in` on offer
    pub amount_offered: U256,
    pub price_offered: U256,
    pub timestamp: u64,
    /// Shared by every edit or cancellation of the same logical order
    pub order_reference: String,
}

impl Order {
    /// Zero price marks a cancelled order.
    pub fn is_dead(&self) -> bool {
        self.price_offered.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trade {
    pub id: String,
    pub order_reference: String,
    pub price: U256,
    /// Security amount matched
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
}

impl OrderBook {
    pub const fn new(orders: Vec<Order>, trades: Vec<Trade>) -> Self {
        Self { orders, trades }
    }
}
