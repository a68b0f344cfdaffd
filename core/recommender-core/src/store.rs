//! Session-aware read-modify-write over the shared recommendation model.
//!
//! The model is one JSON document in the storage directory. Every change goes
//! through [`ModelStore::run_with_lock`], which holds the directory's lock file
//! for the whole load → session check → mutate → save sequence.
//!
//! # Defensive Loading
//!
//! Other processes write this file too, and users occasionally edit it:
//! - Missing file → default model
//! - Empty file → default model
//! - Corrupt JSON → default model (logged)
//! - Missing fields → serde defaults
//!
//! # Session Rollover
//!
//! The store is created with the host's current session id. When a locked
//! round trip finds a different id in the model, it adopts the new id, resets
//! the session timestamp and clears every time lock. The caller learns about
//! it through the `bool` returned by `run_with_lock`.
//!
//! # Persist Policy
//!
//! A mutation that returns `None` writes nothing, even when the model was just
//! synthesized for an empty directory. Session rollover alone is therefore
//! only persisted by the next mutation that returns a model.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RecommenderError, Result};
use crate::fsutil;
use crate::lock::{LockFile, LockStatus, LockTimings};
use crate::model::{now_ms, RecommendationModel};
use crate::storage::StoragePaths;

/// Tunables for a [`ModelStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long `run_with_lock` waits for the lock before giving up.
    pub acquire_timeout: Duration,
    pub lock: LockTimings,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            acquire_timeout: Duration::from_secs(15),
            lock: LockTimings::default(),
        }
    }
}

/// Lock-protected access to one storage directory's model.
///
/// `ModelStore` is `Send + Sync`; threads sharing one store queue through the
/// same lock file that separates processes.
#[derive(Debug, Clone)]
pub struct ModelStore {
    paths: StoragePaths,
    /// `None` joins whatever session the model already records.
    session_id: Option<String>,
    lock: LockFile,
    acquire_timeout: Duration,
}

impl ModelStore {
    pub fn new(paths: StoragePaths, session_id: impl Into<String>) -> Self {
        Self::with_options(paths, session_id, StoreOptions::default())
    }

    pub fn with_options(
        paths: StoragePaths,
        session_id: impl Into<String>,
        options: StoreOptions,
    ) -> Self {
        Self::build(paths, Some(session_id.into()), options)
    }

    /// A store with no session of its own. It never rolls the model over, so
    /// tools that run outside any host session leave time locks alone.
    pub fn joining(paths: StoragePaths, options: StoreOptions) -> Self {
        Self::build(paths, None, options)
    }

    fn build(paths: StoragePaths, session_id: Option<String>, options: StoreOptions) -> Self {
        let lock = LockFile::new(paths.lock_file(), options.lock);
        ModelStore {
            paths,
            session_id,
            lock,
            acquire_timeout: options.acquire_timeout,
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Runs `mutate` against the current model while holding the lock.
    ///
    /// `mutate` receives the loaded (or default) model after session rollover
    /// has been applied. Returning `Ok(Some(model))` persists that model;
    /// `Ok(None)` leaves the file untouched. An `Err` from `mutate` is returned
    /// unchanged after the lock is released.
    ///
    /// Returns whether this call observed a new session (always false for a
    /// [`joining`](Self::joining) store).
    pub fn run_with_lock<F>(&self, mutate: F) -> Result<bool>
    where
        F: FnOnce(RecommendationModel) -> Result<Option<RecommendationModel>>,
    {
        self.ensure_storage_dir()?;

        let _guard = self
            .lock
            .acquire(self.acquire_timeout)
            .ok_or_else(|| RecommenderError::LockTimeout {
                path: self.lock.path().to_path_buf(),
                waited: self.acquire_timeout,
            })?;

        let now = now_ms();
        let mut model = self.load_or_default(now);
        let new_session = match &self.session_id {
            Some(session_id) => model.roll_session(session_id, now),
            None => false,
        };
        if new_session {
            tracing::info!(
                session_id = %model.session_id,
                "New session observed, time locks cleared"
            );
        }
        model.last_updated = now;

        if let Some(mut updated) = mutate(model)? {
            updated.last_updated = now_ms();
            self.save(&updated)?;
        }

        Ok(new_session)
    }

    /// Best-effort snapshot of the persisted model, without taking the lock.
    ///
    /// Never use the result as the basis of a write; go through
    /// [`run_with_lock`](Self::run_with_lock) instead.
    pub fn read_recommendation_model(&self) -> Result<Option<RecommendationModel>> {
        self.ensure_storage_dir()?;
        Ok(self.load())
    }

    /// Writes an auxiliary `rec_<key>` file and returns its path.
    ///
    /// Auxiliary files are advisory and bypass the lock.
    pub fn write_key(&self, key: &str, contents: &str) -> Result<PathBuf> {
        let path = self.paths.key_file(key)?;
        self.ensure_storage_dir()?;
        fsutil::write_atomic(&path, contents)
            .map_err(|e| RecommenderError::io(format!("writing {}", path.display()), e))?;
        Ok(path)
    }

    /// Current lock file state, for diagnostics.
    pub fn lock_status(&self) -> Option<LockStatus> {
        self.lock.status()
    }

    fn ensure_storage_dir(&self) -> Result<()> {
        fsutil::ensure_dir(self.paths.root()).map_err(|e| {
            RecommenderError::io(
                format!("creating storage directory {}", self.paths.root().display()),
                e,
            )
        })
    }

    fn load(&self) -> Option<RecommendationModel> {
        let path = self.paths.model_file();
        let content = fsutil::read_optional(&path)?;

        if content.trim().is_empty() {
            tracing::warn!(path = %path.display(), "Empty model file, using default model");
            return None;
        }

        match serde_json::from_str::<RecommendationModel>(&content) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to parse model file, using default model"
                );
                None
            }
        }
    }

    fn load_or_default(&self, now: i64) -> RecommendationModel {
        self.load()
            .unwrap_or_else(|| RecommendationModel::empty_at(now))
    }

    fn save(&self, model: &RecommendationModel) -> Result<()> {
        let path = self.paths.model_file();
        let content = serde_json::to_string(model).map_err(|e| RecommenderError::Json {
            context: "serializing recommendation model".to_string(),
            source: e,
        })?;
        fsutil::write_atomic(&path, &content)
            .map_err(|e| RecommenderError::io(format!("writing {}", path.display()), e))?;
        tracing::debug!(
            path = %path.display(),
            recommendations = model.recommendations.len(),
            timelocked = model.timelocked.len(),
            "Model saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::tests_helper::write_lock;
    use crate::model::Recommendation;
    use std::panic::{self, AssertUnwindSafe};
    use tempfile::tempdir;

    fn fast_options() -> StoreOptions {
        StoreOptions {
            acquire_timeout: Duration::from_secs(5),
            lock: LockTimings {
                stale_after: Duration::from_secs(30),
                poll_interval: Duration::from_millis(5),
                settle_delay: Duration::from_millis(10),
            },
        }
    }

    fn store_in(root: &std::path::Path, session: &str) -> ModelStore {
        ModelStore::with_options(StoragePaths::with_root(root), session, fast_options())
    }

    fn rec(source: &str, target: &str) -> Recommendation {
        Recommendation {
            source_id: source.to_string(),
            extension_id: target.to_string(),
            extension_display_name: target.to_string(),
            description: "because".to_string(),
            should_show_on_startup: true,
            timestamp: now_ms(),
            user_ignored: false,
        }
    }

    #[test]
    fn test_read_on_empty_directory_is_none() {
        let temp = tempdir().unwrap();
        let store = store_in(&temp.path().join("nested").join("dir"), "S1");
        assert_eq!(store.read_recommendation_model().unwrap(), None);
        assert!(store.paths().root().is_dir());
    }

    #[test]
    fn test_noop_mutation_on_empty_directory_writes_nothing() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");

        let mut seen = None;
        let new_session = store
            .run_with_lock(|model| {
                seen = Some(model);
                Ok(None)
            })
            .unwrap();

        assert!(new_session);
        let seen = seen.unwrap();
        assert_eq!(seen.session_id, "S1");
        assert!(seen.recommendations.is_empty());
        assert!(!store.paths().model_file().exists());
        assert!(!store.paths().lock_file().exists());
    }

    #[test]
    fn test_mutation_is_persisted() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");

        store
            .run_with_lock(|mut model| {
                model.recommendations.push(rec("a", "x"));
                Ok(Some(model))
            })
            .unwrap();

        let model = store.read_recommendation_model().unwrap().unwrap();
        assert_eq!(model.session_id, "S1");
        assert_eq!(model.recommendations.len(), 1);
        assert_eq!(model.recommendations[0].extension_id, "x");
    }

    #[test]
    fn test_serial_mutations_apply_in_order() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");

        for target in ["x", "y", "z"] {
            store
                .run_with_lock(|mut model| {
                    model.recommendations.push(rec("a", target));
                    Ok(Some(model))
                })
                .unwrap();
        }

        let model = store.read_recommendation_model().unwrap().unwrap();
        let targets: Vec<_> = model
            .recommendations
            .iter()
            .map(|r| r.extension_id.as_str())
            .collect();
        assert_eq!(targets, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_session_rollover_clears_timelocks() {
        let temp = tempdir().unwrap();
        let first = store_in(temp.path(), "S1");
        first
            .run_with_lock(|mut model| {
                model.recommendations.push(rec("a", "a.b"));
                model.timelock("a.b");
                Ok(Some(model))
            })
            .unwrap();

        let second = store_in(temp.path(), "S2");
        let new_session = second.run_with_lock(|model| Ok(Some(model))).unwrap();
        assert!(new_session);

        let model = second.read_recommendation_model().unwrap().unwrap();
        assert!(model.timelocked.is_empty());
        assert_eq!(model.session_id, "S2");
        assert_eq!(model.recommendations.len(), 1);

        let again = second.run_with_lock(|model| Ok(Some(model))).unwrap();
        assert!(!again);
    }

    #[test]
    fn test_joining_store_keeps_host_session() {
        let temp = tempdir().unwrap();
        let editor = store_in(temp.path(), "EDITOR-1");
        editor
            .run_with_lock(|mut model| {
                model.timelock("x.dst");
                Ok(Some(model))
            })
            .unwrap();

        let tool = ModelStore::joining(StoragePaths::with_root(temp.path()), fast_options());
        assert_eq!(tool.session_id(), None);
        let new_session = tool
            .run_with_lock(|mut model| {
                model.recommendations.push(rec("a.src", "y.dst"));
                Ok(Some(model))
            })
            .unwrap();
        assert!(!new_session);

        let model = tool.read_recommendation_model().unwrap().unwrap();
        assert_eq!(model.session_id, "EDITOR-1");
        assert_eq!(model.timelocked, vec!["x.dst".to_string()]);

        let again = editor.run_with_lock(|model| Ok(Some(model))).unwrap();
        assert!(!again);
    }

    #[test]
    fn test_joining_store_on_empty_directory_reports_no_session() {
        let temp = tempdir().unwrap();
        let tool = ModelStore::joining(StoragePaths::with_root(temp.path()), fast_options());
        let new_session = tool
            .run_with_lock(|mut model| {
                model.timelock("x.dst");
                Ok(Some(model))
            })
            .unwrap();
        assert!(!new_session);

        // The first host write still sees its own session as new.
        let editor = store_in(temp.path(), "EDITOR-1");
        assert!(editor.run_with_lock(|model| Ok(Some(model))).unwrap());
    }

    #[test]
    fn test_same_session_keeps_timelocks() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        store
            .run_with_lock(|mut model| {
                model.timelock("a.b");
                Ok(Some(model))
            })
            .unwrap();
        let new_session = store.run_with_lock(|_| Ok(None)).unwrap();
        assert!(!new_session);
        let model = store.read_recommendation_model().unwrap().unwrap();
        assert_eq!(model.timelocked, vec!["a.b".to_string()]);
    }

    #[test]
    fn test_last_updated_is_stamped_on_save() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        let before = now_ms();
        store
            .run_with_lock(|mut model| {
                model.last_updated = 0;
                Ok(Some(model))
            })
            .unwrap();
        let model = store.read_recommendation_model().unwrap().unwrap();
        assert!(model.last_updated >= before);
    }

    #[test]
    fn test_corrupt_model_is_replaced_by_default() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        std::fs::write(store.paths().model_file(), "{not json").unwrap();

        assert_eq!(store.read_recommendation_model().unwrap(), None);

        store
            .run_with_lock(|mut model| {
                assert!(model.recommendations.is_empty());
                model.recommendations.push(rec("a", "x"));
                Ok(Some(model))
            })
            .unwrap();
        let model = store.read_recommendation_model().unwrap().unwrap();
        assert_eq!(model.recommendations.len(), 1);
    }

    #[test]
    fn test_round_trip_is_faithful() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        let mut written = None;
        store
            .run_with_lock(|mut model| {
                let mut ignored = rec("src", "dst");
                ignored.user_ignored = true;
                ignored.should_show_on_startup = false;
                model.recommendations.push(ignored);
                written = Some(model.clone());
                Ok(Some(model))
            })
            .unwrap();

        let loaded = store.read_recommendation_model().unwrap().unwrap();
        let written = written.unwrap();
        assert_eq!(loaded.recommendations, written.recommendations);
        assert_eq!(loaded.timelocked, written.timelocked);
        assert_eq!(loaded.session_id, written.session_id);
        assert_eq!(loaded.session_timestamp, written.session_timestamp);
    }

    #[test]
    fn test_lock_timeout_skips_mutation() {
        let temp = tempdir().unwrap();
        let options = StoreOptions {
            acquire_timeout: Duration::from_millis(150),
            ..fast_options()
        };
        let store = ModelStore::with_options(StoragePaths::with_root(temp.path()), "S1", options);
        write_lock(&store.paths().lock_file(), now_ms(), "busy");

        let mut called = false;
        let result = store.run_with_lock(|model| {
            called = true;
            Ok(Some(model))
        });

        assert!(matches!(result, Err(RecommenderError::LockTimeout { .. })));
        assert!(!called);
        assert!(!store.paths().model_file().exists());
    }

    #[test]
    fn test_mutation_error_releases_lock_and_propagates() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");

        let result = store.run_with_lock(|_| Err(RecommenderError::Mutation("boom".to_string())));
        assert!(matches!(result, Err(RecommenderError::Mutation(ref m)) if m == "boom"));
        assert!(!store.paths().lock_file().exists());
        assert!(!store.paths().model_file().exists());
    }

    #[test]
    fn test_panicking_mutation_releases_lock() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = store.run_with_lock(|_| panic!("mutation exploded"));
        }));
        assert!(outcome.is_err());
        assert!(!store.paths().lock_file().exists());

        assert!(store.run_with_lock(|_| Ok(None)).is_ok());
    }

    #[test]
    fn test_save_failure_is_a_hard_error() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        // A directory where the model file should be makes the rename fail.
        std::fs::create_dir(store.paths().model_file()).unwrap();

        let result = store.run_with_lock(|model| Ok(Some(model)));
        assert!(matches!(result, Err(RecommenderError::Io { .. })));
        assert!(!store.paths().lock_file().exists());
    }

    #[test]
    fn test_write_key_uses_prefixed_file() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        let path = store.write_key("redhat.java", "# report").unwrap();
        assert_eq!(path, temp.path().join("rec_redhat.java"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# report");
        assert!(!store.paths().lock_file().exists());
    }

    #[test]
    fn test_write_key_rejects_escaping_keys() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path(), "S1");
        let result = store.write_key("../outside", "x");
        assert!(matches!(result, Err(RecommenderError::InvalidKey(_))));
    }
}
