//! Rules-based decision collaborator.

use crate::task::{
    domain::{Classification, TaskRecord},
    ports::{DecisionCollaborator, DecisionError},
};
use async_trait::async_trait;
use std::collections::BTreeSet;

const DEFAULT_SAFE_ACTIONS: [&str; 8] = [
    "acknowledge",
    "archive",
    "categorize",
    "file",
    "log",
    "review",
    "summarize",
    "tag",
];

/// Fragments that mark an action as externally visible or irreversible.
const SENSITIVE_MARKERS: [&str; 5] = ["send", "reply", "post", "delete", "pay"];

/// Classifies records from the operating handbook rules: nothing is sent,
/// deleted, or paid without approval.
///
/// Only action names on the safe list auto-execute. A missing action name
/// requires approval.
#[derive(Debug, Clone)]
pub struct HandbookClassifier {
    safe_actions: BTreeSet<String>,
}

impl Default for HandbookClassifier {
    fn default() -> Self {
        Self::with_safe_actions(DEFAULT_SAFE_ACTIONS)
    }
}

impl HandbookClassifier {
    /// Creates a classifier with the default safe list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier that auto-executes only `actions`.
    #[must_use]
    pub fn with_safe_actions<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            safe_actions: actions
                .into_iter()
                .map(|action| normalize(action.as_ref()))
                .collect(),
        }
    }

    /// Classifies an action name without consulting a record.
    #[must_use]
    pub fn classify_action(&self, action: Option<&str>) -> Classification {
        let Some(name) = action.map(normalize).filter(|name| !name.is_empty()) else {
            return Classification::RequiresApproval;
        };
        let is_sensitive = SENSITIVE_MARKERS
            .iter()
            .any(|marker| name.contains(marker));
        if !is_sensitive && self.safe_actions.contains(&name) {
            Classification::AutoExecute
        } else {
            Classification::RequiresApproval
        }
    }
}

fn normalize(action: &str) -> String {
    action.trim().to_ascii_lowercase()
}

#[async_trait]
impl DecisionCollaborator for HandbookClassifier {
    async fn classify(&self, record: &TaskRecord) -> Result<Classification, DecisionError> {
        Ok(self.classify_action(record.action_name()))
    }
}
