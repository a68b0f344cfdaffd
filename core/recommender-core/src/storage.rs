//! Storage path management for the shared recommendation directory.
//!
//! Every process that recommends extensions points at the same directory.
//! This module is the single place that decides what lives in it:
//!
//! ```text
//! <root>/
//! ├── extension-recommender.model.json   # the persisted RecommendationModel
//! ├── extension-recommender.lock         # ephemeral advisory lock
//! └── rec_<key>                          # auxiliary files written by write_key
//! ```
//!
//! Auxiliary files carry a `rec_` prefix so no key can ever name the model or
//! the lock file.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RecommenderError, Result};

pub const MODEL_FILENAME: &str = "extension-recommender.model.json";
pub const LOCK_FILENAME: &str = "extension-recommender.lock";
pub const KEY_PREFIX: &str = "rec_";

/// Directory name used under the platform data directory.
pub const DEFAULT_DIR_NAME: &str = "extension-recommender";

static RE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// Paths inside one shared storage directory.
///
/// Production code uses [`StoragePaths::platform_default`], which points at
/// `<data_dir>/extension-recommender`. Tests use [`StoragePaths::with_root`]
/// with a temp directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the per-user default location.
    pub fn platform_default() -> Result<Self> {
        dirs::data_dir()
            .map(|d| Self::with_root(d.join(DEFAULT_DIR_NAME)))
            .ok_or(RecommenderError::StorageDirUnavailable)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_file(&self) -> PathBuf {
        self.root.join(MODEL_FILENAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILENAME)
    }

    /// Path of the auxiliary file for `key`.
    ///
    /// Keys are restricted to `[A-Za-z0-9._-]` and may not be `.` or `..`,
    /// so the result is always a direct child of the root.
    pub fn key_file(&self, key: &str) -> Result<PathBuf> {
        if !Self::is_valid_key(key) {
            return Err(RecommenderError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}{}", KEY_PREFIX, key)))
    }

    pub fn is_valid_key(key: &str) -> bool {
        key != "." && key != ".." && RE_KEY.is_match(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_files_live_under_root() {
        let paths = StoragePaths::with_root("/tmp/recs");
        assert_eq!(
            paths.model_file(),
            PathBuf::from("/tmp/recs/extension-recommender.model.json")
        );
        assert_eq!(
            paths.lock_file(),
            PathBuf::from("/tmp/recs/extension-recommender.lock")
        );
    }

    #[test]
    fn test_key_file_is_prefixed() {
        let paths = StoragePaths::with_root("/tmp/recs");
        assert_eq!(
            paths.key_file("redhat.java").unwrap(),
            PathBuf::from("/tmp/recs/rec_redhat.java")
        );
    }

    #[test]
    fn test_key_cannot_collide_with_reserved_names() {
        let paths = StoragePaths::with_root("/tmp/recs");
        let key_path = paths.key_file(MODEL_FILENAME).unwrap();
        assert_ne!(key_path, paths.model_file());
        let key_path = paths.key_file(LOCK_FILENAME).unwrap();
        assert_ne!(key_path, paths.lock_file());
    }

    #[test]
    fn test_key_with_separators_is_rejected() {
        let paths = StoragePaths::with_root("/tmp/recs");
        for key in ["../escape", "a/b", "a\\b", "..", ".", "", "white space"] {
            assert!(
                matches!(paths.key_file(key), Err(RecommenderError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }
}
