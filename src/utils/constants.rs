use alloy::primitives::{address, Address};

pub const POLYGON_CHAIN_ID: u64 = 137;

/// Balancer-style vault the issue pools are registered in
pub const VAULT: Address = address!("0xBA12222222228d8Ba445958a75a0704d566BF2C8");

/// Multicall3, same address on every supported chain
pub const MULTICALL3: Address = address!("0xcA11bde05977b3631167028862bE2a173976CA11");
