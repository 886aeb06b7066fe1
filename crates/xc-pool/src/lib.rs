//! Bounded-concurrency scheduling over local and remote commands.

pub mod error;
pub mod foreach;
pub mod pool;
pub mod poolable;

pub use error::{CommandPoolFailed, PoolFailure};
pub use foreach::foreach;
pub use pool::{CommandPool, RunError};
pub use poolable::Poolable;
