//! The seam between the recommendation engine and whatever application hosts it.
//!
//! The engine decides *when* and *what* to show; the host owns everything
//! user-facing: wording, dialogs, installation, telemetry.

use crate::model::{IgnoreBehavior, Level, Recommendation, UserChoice};

/// Everything a host needs to render one recommendation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub extension_id: String,
    pub display_name: String,
    /// The recommendation being shown on demand. `None` for startup prompts,
    /// which speak for every recommender at once.
    pub primary: Option<Recommendation>,
    /// All recommendations of `extension_id` whose recommender is installed.
    pub recommendations: Vec<Recommendation>,
    pub level: Level,
    pub ignore_behavior: IgnoreBehavior,
    /// Hide the "never" option.
    pub hide_never: bool,
}

impl Prompt {
    /// Source ids credited with this prompt.
    pub fn recommenders(&self) -> Vec<String> {
        match &self.primary {
            Some(primary) => vec![primary.source_id.clone()],
            None => self
                .recommendations
                .iter()
                .map(|r| r.source_id.clone())
                .collect(),
        }
    }
}

/// Reported to the host after the user answered a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceEvent {
    pub extension_id: String,
    pub recommenders: Vec<String>,
    pub choice: UserChoice,
}

/// Application hosting the recommender.
///
/// Implementors should:
/// - Never panic; report "not installed" when unsure
/// - Block in `prompt` until the user answers or dismisses
pub trait ExtensionHost: Send + Sync {
    fn is_installed(&self, extension_id: &str) -> bool;

    /// Shows the prompt. `None` means it was dismissed without a choice.
    fn prompt(&self, prompt: &Prompt) -> Option<UserChoice>;

    fn install(&self, extension_id: &str, display_name: &str) -> Result<(), String>;

    /// Telemetry hook, called once per answered prompt.
    fn record_choice(&self, _event: &ChoiceEvent) {}
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// Scripted host for engine tests.
    #[derive(Default)]
    pub struct ScriptedHost {
        pub installed: Mutex<HashSet<String>>,
        pub answers: Mutex<VecDeque<Option<UserChoice>>>,
        pub prompts: Mutex<Vec<Prompt>>,
        pub installs: Mutex<Vec<String>>,
        pub choices: Mutex<Vec<ChoiceEvent>>,
    }

    impl ScriptedHost {
        pub fn with_installed(ids: &[&str]) -> Self {
            let host = Self::default();
            host.installed
                .lock()
                .unwrap()
                .extend(ids.iter().map(|s| s.to_string()));
            host
        }

        pub fn answer(&self, choice: Option<UserChoice>) {
            self.answers.lock().unwrap().push_back(choice);
        }

        pub fn prompts(&self) -> Vec<Prompt> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl ExtensionHost for ScriptedHost {
        fn is_installed(&self, extension_id: &str) -> bool {
            self.installed.lock().unwrap().contains(extension_id)
        }

        fn prompt(&self, prompt: &Prompt) -> Option<UserChoice> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.answers.lock().unwrap().pop_front().flatten()
        }

        fn install(&self, extension_id: &str, _display_name: &str) -> Result<(), String> {
            self.installs.lock().unwrap().push(extension_id.to_string());
            self.installed
                .lock()
                .unwrap()
                .insert(extension_id.to_string());
            Ok(())
        }

        fn record_choice(&self, event: &ChoiceEvent) {
            self.choices.lock().unwrap().push(event.clone());
        }
    }
}
