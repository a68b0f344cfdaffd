//! RecommendationEngine - the entry point for a component that recommends others.
//!
//! Each recommending component creates one engine with its own `source_id`.
//! All engines on a machine share state through the same [`ModelStore`]
//! directory, so a user who said "never" to one prompt is not asked again by a
//! different window, and a prompt shown once per session stays quiet until
//! the next session.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use recommender_core::{ModelStore, RecommendationEngine, StoragePaths};
//!
//! let store = Arc::new(ModelStore::new(StoragePaths::platform_default()?, session_id));
//! let engine = RecommendationEngine::new(store, host, "redhat.vscode-yaml");
//! let rec = engine.create("redhat.java", "Java", "Adds Java schema support", true);
//! engine.register(vec![rec])?;
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{RecommenderError, Result};
use crate::host::{ChoiceEvent, ExtensionHost, Prompt};
use crate::model::{now_ms, IgnoreBehavior, Level, Recommendation, UserChoice};
use crate::store::ModelStore;

pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(6);

/// Outcome of [`RecommendationEngine::register`].
#[derive(Debug)]
pub struct Registration {
    pub new_session: bool,
    /// The deferred startup pass, spawned when a new session was observed.
    /// Dropping the handle detaches it.
    pub startup_pass: Option<JoinHandle<()>>,
}

pub struct RecommendationEngine<H> {
    store: Arc<ModelStore>,
    host: Arc<H>,
    source_id: String,
    startup_delay: Duration,
}

impl<H> Clone for RecommendationEngine<H> {
    fn clone(&self) -> Self {
        RecommendationEngine {
            store: Arc::clone(&self.store),
            host: Arc::clone(&self.host),
            source_id: self.source_id.clone(),
            startup_delay: self.startup_delay,
        }
    }
}

impl<H: ExtensionHost + 'static> RecommendationEngine<H> {
    pub fn new(store: Arc<ModelStore>, host: Arc<H>, source_id: impl Into<String>) -> Self {
        RecommendationEngine {
            store,
            host,
            source_id: source_id.into(),
            startup_delay: DEFAULT_STARTUP_DELAY,
        }
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────────

    /// Builds a recommendation from this engine's source.
    pub fn create(
        &self,
        extension_id: &str,
        extension_display_name: &str,
        description: &str,
        should_show_on_startup: bool,
    ) -> Recommendation {
        Recommendation {
            source_id: self.source_id.clone(),
            extension_id: extension_id.to_string(),
            extension_display_name: extension_display_name.to_string(),
            description: description.to_string(),
            should_show_on_startup,
            timestamp: now_ms(),
            user_ignored: false,
        }
    }

    /// Merges `facts` into the model. On the first registration of a session
    /// the startup pass is scheduled in the background and not waited for.
    pub fn register(&self, facts: Vec<Recommendation>) -> Result<Registration> {
        let new_session = self.add_recommendations_to_model(facts)?;
        let startup_pass = if new_session {
            Some(self.spawn_startup_pass()?)
        } else {
            None
        };
        Ok(Registration {
            new_session,
            startup_pass,
        })
    }

    /// Merges `facts` by natural key, keeping each existing pair's ignore flag.
    /// Returns whether a new session was observed.
    pub fn add_recommendations_to_model(&self, facts: Vec<Recommendation>) -> Result<bool> {
        let count = facts.len();
        let new_session = self.store.run_with_lock(move |mut model| {
            model.merge(facts);
            Ok(Some(model))
        })?;
        tracing::debug!(source_id = %self.source_id, count, new_session, "Recommendations registered");
        Ok(new_session)
    }

    fn spawn_startup_pass(&self) -> Result<JoinHandle<()>> {
        let engine = self.clone();
        thread::Builder::new()
            .name("recommender-startup".to_owned())
            .spawn(move || {
                thread::sleep(engine.startup_delay);
                if let Err(e) = engine.show_startup_recommendations() {
                    tracing::warn!(error = %e, "Startup recommendation pass failed");
                }
            })
            .map_err(|e| RecommenderError::io("spawning startup recommendation pass", e))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ignore / Time-lock
    // ─────────────────────────────────────────────────────────────────────────────

    /// Marks every current recommendation of `extension_id` as ignored.
    /// Recommendations registered later by other sources are unaffected.
    pub fn mark_ignored(&self, extension_id: &str, startup_only: bool) -> Result<()> {
        self.store.run_with_lock(|mut model| {
            let changed = model.mark_ignored(extension_id, startup_only);
            Ok((changed > 0).then_some(model))
        })?;
        Ok(())
    }

    pub fn mark_ignored_single_rec(&self, rec: &Recommendation) -> Result<()> {
        self.store.run_with_lock(|mut model| {
            let changed = model.mark_pair_ignored(&rec.source_id, &rec.extension_id);
            Ok((changed > 0).then_some(model))
        })?;
        Ok(())
    }

    /// Suppresses unsolicited prompts for `extension_id` until the next session.
    pub fn timelock_recommendation_for(&self, extension_id: &str) -> Result<()> {
        self.store.run_with_lock(|mut model| {
            let added = model.timelock(extension_id);
            Ok(added.then_some(model))
        })?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Showing
    // ─────────────────────────────────────────────────────────────────────────────

    /// Shows this source's recommendation of `to_extension` right away.
    ///
    /// Nothing is shown unless this source is installed, the target is not,
    /// the pair is registered and not ignored, and the target is not
    /// time-locked (`force` skips only the time-lock check).
    pub fn show(
        &self,
        to_extension: &str,
        force: bool,
        override_description: Option<&str>,
        level: Level,
        hide_never: bool,
    ) -> Result<Option<UserChoice>> {
        if !self.host.is_installed(&self.source_id) || self.host.is_installed(to_extension) {
            return Ok(None);
        }
        let Some(model) = self.store.read_recommendation_model()? else {
            return Ok(None);
        };
        if !force && model.is_timelocked(to_extension) {
            return Ok(None);
        }
        let Some(mut primary) = model
            .find(&self.source_id, to_extension)
            .filter(|r| !r.user_ignored)
            .cloned()
        else {
            return Ok(None);
        };

        let display_name = primary.label().to_string();
        if let Some(description) = override_description {
            primary.description = description.to_string();
        }
        let recommendations = model
            .recommendations
            .iter()
            .filter(|r| r.extension_id == to_extension && self.host.is_installed(&r.source_id))
            .cloned()
            .collect();

        self.display(Prompt {
            extension_id: to_extension.to_string(),
            display_name,
            primary: Some(primary),
            recommendations,
            level,
            ignore_behavior: IgnoreBehavior::SingleRecommendation,
            hide_never,
        })
    }

    /// Prompts once for every recommended extension that is not installed and
    /// has at least one non-ignored startup recommendation from an installed
    /// source. Returns how many prompts were shown.
    pub fn show_startup_recommendations(&self) -> Result<usize> {
        let Some(model) = self.store.read_recommendation_model()? else {
            return Ok(0);
        };

        let mut shown = 0;
        for extension_id in model.recommended_ids() {
            if self.host.is_installed(extension_id) {
                continue;
            }
            let startup: Vec<Recommendation> = model
                .recommendations
                .iter()
                .filter(|r| r.extension_id == extension_id)
                .filter(|r| r.should_show_on_startup)
                .filter(|r| self.host.is_installed(&r.source_id))
                .cloned()
                .collect();
            if startup.is_empty() || startup.iter().all(|r| r.user_ignored) {
                continue;
            }

            let display_name = most_common_display_name(&startup)
                .unwrap_or(extension_id)
                .to_string();
            let prompt = Prompt {
                extension_id: extension_id.to_string(),
                display_name,
                primary: None,
                recommendations: startup,
                level: Level::Info,
                ignore_behavior: IgnoreBehavior::StartupOnly,
                hide_never: false,
            };
            match self.display(prompt) {
                Ok(_) => shown += 1,
                Err(e) => {
                    tracing::warn!(error = %e, extension_id, "Startup recommendation failed")
                }
            }
        }
        Ok(shown)
    }

    /// Every recommendation of `extension_id`, non-ignored ones first.
    pub fn recommendations_for(&self, extension_id: &str) -> Result<Vec<Recommendation>> {
        let Some(model) = self.store.read_recommendation_model()? else {
            return Ok(Vec::new());
        };
        let mut recs: Vec<Recommendation> = model
            .recommendations
            .into_iter()
            .filter(|r| r.extension_id == extension_id)
            .collect();
        recs.sort_by_key(|r| r.user_ignored);
        Ok(recs)
    }

    /// Asks the host, then applies the answer.
    ///
    /// The id is time-locked whatever the answer, including a dismissal.
    fn display(&self, prompt: Prompt) -> Result<Option<UserChoice>> {
        let choice = self.host.prompt(&prompt);
        self.timelock_recommendation_for(&prompt.extension_id)?;

        let Some(choice) = choice else {
            return Ok(None);
        };
        tracing::info!(
            extension_id = %prompt.extension_id,
            choice = ?choice,
            "Recommendation answered"
        );
        self.host.record_choice(&ChoiceEvent {
            extension_id: prompt.extension_id.clone(),
            recommenders: prompt.recommenders(),
            choice,
        });

        match choice {
            UserChoice::Never => match prompt.ignore_behavior {
                IgnoreBehavior::All => self.mark_ignored(&prompt.extension_id, false)?,
                IgnoreBehavior::StartupOnly => self.mark_ignored(&prompt.extension_id, true)?,
                IgnoreBehavior::SingleRecommendation => {
                    if let Some(primary) = &prompt.primary {
                        self.mark_ignored_single_rec(primary)?;
                    }
                }
            },
            UserChoice::Install => self
                .host
                .install(&prompt.extension_id, &prompt.display_name)
                .map_err(|details| RecommenderError::InstallFailed {
                    extension_id: prompt.extension_id.clone(),
                    details,
                })?,
            UserChoice::Later => {}
        }
        Ok(Some(choice))
    }
}

/// The display name used by most recommendations. Ties go to the name seen
/// last. Empty names never win.
fn most_common_display_name(recs: &[Recommendation]) -> Option<&str> {
    let mut best: Option<(&str, usize)> = None;
    for rec in recs {
        let name = rec.extension_display_name.as_str();
        if name.is_empty() {
            continue;
        }
        let count = recs
            .iter()
            .filter(|r| r.extension_display_name == name)
            .count();
        if best.map_or(true, |(_, best_count)| count >= best_count) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name)
}
