mod io_utils;
pub mod sync;
pub mod tracker;

// Re-export core engine components
pub use sync::remote::{HttpRemoteSource, RemoteBody, RemoteSource};
pub use sync::retry::RetryPolicy;
pub use sync::{
    default_engine, DefaultSyncEngine, SyncError, SyncEvent, SyncOptions, SyncPhase, SyncReport,
    SyncRequest,
};
pub use tracker::{ProgressSnapshot, SyncProgress};

// Re-export scanner types often needed by consumers
pub use longship_scanner::ScanStats;
