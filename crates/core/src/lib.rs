//! Inkpage engine core
//!
//! Undo/redo history, the edit control surface, selection and clipboard,
//! input modelling and the wiring that ties the page cache, the viewport
//! renderer and the worker pool into one engine.
//!
//! # Example
//!
//! ```
//! use inkpage_core::{Display, Engine, EngineConfig, InputBatch, InputPoint, InputTool};
//! use inkpage_model::Background;
//! use inkpage_storage::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(MemoryStore::new());
//! let page = uuid::Uuid::new_v4();
//! store.insert_page(page, Background::native("lined"));
//!
//! let engine = Engine::new(EngineConfig::default(), store, Display::new(300, 400)).unwrap();
//! engine.open_page(page, Duration::from_secs(5)).unwrap();
//!
//! let batch = InputBatch::new(
//!     InputTool::Pen,
//!     vec![InputPoint::new(10.0, 10.0, 0), InputPoint::new(90.0, 40.0, 16)],
//! );
//! engine.editor().commit_input(&batch).unwrap();
//! engine.editor().undo().unwrap();
//! engine.shutdown().unwrap();
//! ```

pub mod clipboard;
pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod history;
pub mod input;
pub mod logging;
pub mod refresh;
pub mod selection;

pub use clipboard::Clipboard;
pub use config::EngineConfig;
pub use editor::{EditController, EditorSettings, ScrollResponse};
pub use engine::{Display, Engine};
pub use error::{EditError, EditResult, HistoryError, HistoryResult};
pub use history::{History, Operation, OperationGroup, Replay, DEFAULT_HISTORY_LIMIT};
pub use input::{straighten, EditMode, EraserKind, InputBatch, InputPoint, InputTool, PenSettings};
pub use refresh::{DisplayRefresh, NoopRefresh, RefreshGate};
pub use selection::Selection;
