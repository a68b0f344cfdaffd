//! # recommender-core
//!
//! Shared, persisted memory for components that recommend other components.
//!
//! Several independent processes (editor windows, unrelated plugins) read and
//! change one JSON document in a shared directory. This crate keeps that safe:
//!
//! - **Lock manager** ([`lock`]): advisory lock file with staleness reclaim
//!   and nonce verification.
//! - **Model store** ([`store`]): load → session rollover → mutate → save,
//!   all under the lock.
//! - **Engine** ([`engine`]): registration, ignore and time-lock bookkeeping,
//!   and prompting through an [`ExtensionHost`].
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Waiting is `thread::sleep`.
//! - **Graceful degradation**: Missing or corrupt files read as defaults.
//! - **All-or-nothing writes**: A mutation is persisted whole or not at all.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recommender_core::{ModelStore, StoragePaths};
//!
//! let store = ModelStore::new(StoragePaths::platform_default()?, session_id);
//! let new_session = store.run_with_lock(|mut model| {
//!     model.timelock("redhat.java");
//!     Ok(Some(model))
//! })?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod host;
pub mod lock;
pub mod model;
pub mod storage;
pub mod store;

pub use config::{load_config, load_config_from, save_config_to, RecommenderConfig};
pub use engine::{RecommendationEngine, Registration};
pub use error::{RecommenderError, Result};
pub use host::{ChoiceEvent, ExtensionHost, Prompt};
pub use lock::{LockFile, LockGuard, LockStatus, LockTimings};
pub use model::{IgnoreBehavior, Level, Recommendation, RecommendationModel, UserChoice};
pub use storage::StoragePaths;
pub use store::{ModelStore, StoreOptions};
