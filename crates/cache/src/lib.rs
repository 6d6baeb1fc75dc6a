//! Inkpage page cache
//!
//! Bounded multi-page working set with neighbor prefetch, LRU eviction and
//! debounced persistence of edits.

pub mod config;
pub mod entry;
pub mod error;
pub mod journal;
pub mod manager;
pub mod write_coordinator;

pub use config::{parse_env, CacheConfig, ConfigError};
pub use entry::{CachedBitmap, Layer, PageEdit, PageEntry, PageItem, PageSnapshot};
pub use error::{CacheError, CacheResult};
pub use journal::DirtyJournal;
pub use manager::{CacheStats, LoadHandle, PageCacheManager};
pub use write_coordinator::{WriteCoordinator, WriteCoordinatorConfig};
