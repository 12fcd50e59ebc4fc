//! Detected changes, before they become notifications.

use serde::Serialize;

use vigil_store::ChangeType;

/// One detected change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedChange {
    pub change_type: ChangeType,
    /// Trait name, topic label, activity sub-kind, `"count"` or `"@username"`.
    pub dimension: String,
    pub before_value: Option<f64>,
    pub after_value: Option<f64>,
    pub metadata: serde_json::Value,
    /// Filled in by the explainer, or by the detector for template-only
    /// signals.
    pub explanation: Option<String>,
}

impl DetectedChange {
    pub fn new(change_type: ChangeType, dimension: impl Into<String>) -> Self {
        Self {
            change_type,
            dimension: dimension.into(),
            before_value: None,
            after_value: None,
            metadata: serde_json::Value::Null,
            explanation: None,
        }
    }

    pub fn values(mut self, before: f64, after: f64) -> Self {
        self.before_value = Some(before);
        self.after_value = Some(after);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn explained(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}
