pub mod events;
pub mod multicall;
pub mod state;
pub mod subscriber;
pub mod synchronizer;

use alloy::primitives::Address;
use derive_more::{Display, Error};

use crate::math::ArithmeticFault;

pub use events::{decode_log, BlockEvent, PoolEvent};
pub use multicall::{AlloyBatchReader, BatchCall, BatchReader, BatchResult};
pub use state::{PoolLimits, PoolState, PoolStateMap};
pub use synchronizer::{BlockCache, EventOutcome, StateSource, Synchronizer, TrackedState};

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SyncError {
    #[display("failed to decode state of pool {pool}: {reason}")]
    Decode {
        pool: Address,
        reason: String,
    },
    #[display("malformed {event} event for pool {pool}")]
    MalformedEvent {
        pool: Address,
        event: &'static str,
    },
    #[display("{fault} while updating pool {pool}")]
    Arithmetic { pool: Address, fault: ArithmeticFault },
}
