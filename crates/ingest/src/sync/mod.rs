//! Sync engine and its coordination primitives
//!
//! The engine pulls pages from a [`Resource`], throttled by a
//! [`RateLimiter`], and stops cooperatively when the [`InterruptController`]
//! reports a termination request.

mod engine;
mod interrupt;
mod limiter;
mod progress;
pub mod timing;

pub use engine::{Resource, SyncEngine, SyncOutcome, SyncReport};
pub use interrupt::{
    CallbackId, FORCED_EXIT_CODE, InterruptController, InterruptDelegate, InterruptStage, Signal,
};
pub use limiter::{Cancelled, RateLimiter};
pub use progress::ProgressTracker;
