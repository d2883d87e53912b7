pub mod debounce;
pub mod retry;
pub mod synchronizer;
pub mod watermark;

pub use retry::RetryPolicy;
pub use synchronizer::{
    DraftSynchronizer, Lifecycle, SaveResult, SyncConfig, SyncError, SyncHandle, SyncStatus,
};
pub use watermark::StaleResponse;
