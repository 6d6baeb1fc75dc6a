//! Reference [`PageStore`](inkpage_model::PageStore) implementations
//!
//! [`MemoryStore`] backs tests and demos and can inject faults;
//! [`FileStore`] keeps one directory per page on disk.

mod file;
mod memory;

pub use file::{FileStore, StorageError};
pub use memory::{MemoryStore, StoreCalls};
