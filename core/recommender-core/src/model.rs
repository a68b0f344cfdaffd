//! The persisted recommendation model and the value types around it.
//!
//! Field names serialize in camelCase so the document stays readable by every
//! producer that shares the storage directory.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, the timestamp unit used on disk.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Persisted Types
// ═══════════════════════════════════════════════════════════════════════════════

/// One recommendation fact: `source_id` recommends `extension_id`.
///
/// `(source_id, extension_id)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Recommendation {
    pub source_id: String,
    pub extension_id: String,
    pub extension_display_name: String,
    pub description: String,
    pub should_show_on_startup: bool,
    pub timestamp: i64,
    pub user_ignored: bool,
}

impl Recommendation {
    pub fn same_pair(&self, other: &Recommendation) -> bool {
        self.is_pair(&other.source_id, &other.extension_id)
    }

    pub fn is_pair(&self, source_id: &str, extension_id: &str) -> bool {
        self.source_id == source_id && self.extension_id == extension_id
    }

    /// Display name, falling back to the id when the label is empty.
    pub fn label(&self) -> &str {
        if self.extension_display_name.is_empty() {
            &self.extension_id
        } else {
            &self.extension_display_name
        }
    }
}

/// The single document shared by every recommender on the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationModel {
    pub last_updated: i64,
    pub session_id: String,
    pub session_timestamp: i64,
    pub recommendations: Vec<Recommendation>,
    pub timelocked: Vec<String>,
}

impl RecommendationModel {
    /// The model synthesized for a directory that has none yet.
    pub fn empty_at(now: i64) -> Self {
        RecommendationModel {
            last_updated: now,
            session_id: String::new(),
            session_timestamp: now,
            recommendations: Vec::new(),
            timelocked: Vec::new(),
        }
    }

    /// Adopts `session_id` if it differs from the stored one.
    ///
    /// A new session clears every time lock but leaves recommendations alone.
    /// Returns true when a rollover happened.
    pub fn roll_session(&mut self, session_id: &str, now: i64) -> bool {
        if self.session_id == session_id {
            return false;
        }
        self.session_id = session_id.to_string();
        self.session_timestamp = now;
        self.timelocked.clear();
        true
    }

    pub fn is_timelocked(&self, extension_id: &str) -> bool {
        self.timelocked.iter().any(|id| id == extension_id)
    }

    /// Returns false if the id was already time-locked.
    pub fn timelock(&mut self, extension_id: &str) -> bool {
        if self.is_timelocked(extension_id) {
            return false;
        }
        self.timelocked.push(extension_id.to_string());
        true
    }

    pub fn find(&self, source_id: &str, extension_id: &str) -> Option<&Recommendation> {
        self.recommendations
            .iter()
            .find(|r| r.is_pair(source_id, extension_id))
    }

    /// Merges `incoming` by natural key.
    ///
    /// Existing pairs keep their slot and their `user_ignored` flag but take
    /// every other field from the incoming fact. New pairs are appended in
    /// input order. Duplicate pairs collapse to the first occurrence.
    pub fn merge(&mut self, incoming: Vec<Recommendation>) {
        let current = std::mem::take(&mut self.recommendations);
        let mut pending: Vec<Option<Recommendation>> = incoming.into_iter().map(Some).collect();
        let mut merged: Vec<Recommendation> = Vec::with_capacity(current.len() + pending.len());

        for existing in current {
            if merged.iter().any(|r| r.same_pair(&existing)) {
                continue;
            }
            let replacement = pending
                .iter_mut()
                .find(|slot| matches!(slot, Some(r) if r.same_pair(&existing)))
                .and_then(Option::take);
            match replacement {
                Some(mut fact) => {
                    fact.user_ignored = existing.user_ignored;
                    merged.push(fact);
                }
                None => merged.push(existing),
            }
        }

        for fact in pending.into_iter().flatten() {
            if !merged.iter().any(|r| r.same_pair(&fact)) {
                merged.push(fact);
            }
        }

        self.recommendations = merged;
    }

    /// Marks every recommendation of `extension_id` as ignored.
    ///
    /// With `startup_only`, only entries eligible for startup prompting are
    /// touched. Returns the number of entries changed.
    pub fn mark_ignored(&mut self, extension_id: &str, startup_only: bool) -> usize {
        let mut changed = 0;
        for rec in self
            .recommendations
            .iter_mut()
            .filter(|r| r.extension_id == extension_id)
        {
            if (!startup_only || rec.should_show_on_startup) && !rec.user_ignored {
                rec.user_ignored = true;
                changed += 1;
            }
        }
        changed
    }

    /// Marks the single `(source_id, extension_id)` entry as ignored.
    pub fn mark_pair_ignored(&mut self, source_id: &str, extension_id: &str) -> usize {
        let mut changed = 0;
        for rec in self
            .recommendations
            .iter_mut()
            .filter(|r| r.is_pair(source_id, extension_id))
        {
            if !rec.user_ignored {
                rec.user_ignored = true;
                changed += 1;
            }
        }
        changed
    }

    /// Distinct recommended ids, in first-seen order.
    pub fn recommended_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for rec in &self.recommendations {
            if !ids.contains(&rec.extension_id.as_str()) {
                ids.push(&rec.extension_id);
            }
        }
        ids
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Prompt Vocabulary
// ═══════════════════════════════════════════════════════════════════════════════

/// What the user answered when a recommendation was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserChoice {
    Install,
    Never,
    Later,
}

/// Severity a prompt is shown with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    #[default]
    Info,
    Warn,
    Error,
}

/// Which entries a "never" answer applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreBehavior {
    /// Every startup-eligible recommendation for the id.
    StartupOnly,
    /// Every recommendation for the id.
    All,
    /// Only the recommendation that was shown.
    SingleRecommendation,
}
