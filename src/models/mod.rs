pub mod order;
pub mod pool;

pub use order::{Order, OrderBook, Trade};
pub use pool::{Pool, PoolId, PoolKind, PoolToken};
