//! Ingest crate - Resumable, rate-limited sync of paginated APIs
//!
//! This crate provides:
//! - A generic sync engine driving any [`Resource`] page by page
//! - A continuous-refill rate limiter with cooperative cancellation
//! - Two-stage interrupt handling (drain, then force)
//! - File-based checkpoints and failed-record tracking
//! - Document storage trait with SQLite and in-memory implementations
//! - A DIP API client and resource
//!
//! The engine has no dependency on the DIP API; any type implementing
//! [`Resource`] can be synced.

pub mod config;
pub mod dip;
pub mod error;
pub mod models;
pub mod storage;
pub mod sync;

pub use config::{ApiSettings, ConfigError, RateLimit, SyncConfig};
pub use dip::{DipApiError, DipClient, DipEndpoint, DipResource};
pub use error::{FailureKind, StoreError, SyncError};
pub use models::{Batch, Checkpoint, Document, FailedRecord, PageRequest};
pub use storage::{
    CheckpointStore, CheckpointTracker, DocumentStore, FailedRecordTracker,
    InMemoryDocumentStore, SqliteDocumentStore,
};
pub use sync::{
    // Engine
    Resource, SyncEngine, SyncOutcome, SyncReport,
    // Coordination
    CallbackId, FORCED_EXIT_CODE, InterruptController, InterruptDelegate, InterruptStage, Signal,
    Cancelled, RateLimiter, ProgressTracker,
};
