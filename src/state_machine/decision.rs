//! Routing decisions produced by the decision oracle

use super::state::TaskId;
use serde::{Deserialize, Serialize};

/// How the current turn relates to the task in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Start a fresh task
    New,
    /// Keep feeding the active task
    Continue,
    /// Switch away from the active task before it finished
    Interrupt,
    /// Go back to the most recently suspended task
    Resume,
}

impl Intent {
    /// Parse an intent label, accepting the long-form aliases classifiers tend to emit
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "new" | "new_flow" | "new_task" => Some(Self::New),
            "continue" | "continue_flow" | "continuation" => Some(Self::Continue),
            "interrupt" | "interruption" | "interrupt_flow" => Some(Self::Interrupt),
            "resume" | "resume_flow" => Some(Self::Resume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,
    /// Required for `New` and `Interrupt`; implied by session state otherwise
    pub target_task: Option<TaskId>,
    /// Only meaningful for `Interrupt`
    pub save_current: bool,
    pub confidence: f32,
    pub reason: String,
}

impl RoutingDecision {
    fn with_intent(intent: Intent, target_task: Option<TaskId>) -> Self {
        Self {
            intent,
            target_task,
            save_current: false,
            confidence: 1.0,
            reason: String::new(),
        }
    }

    pub fn new_task(target: impl Into<TaskId>) -> Self {
        Self::with_intent(Intent::New, Some(target.into()))
    }

    pub fn continue_active() -> Self {
        Self::with_intent(Intent::Continue, None)
    }

    pub fn interrupt(target: impl Into<TaskId>, save_current: bool) -> Self {
        Self {
            save_current,
            ..Self::with_intent(Intent::Interrupt, Some(target.into()))
        }
    }

    pub fn resume() -> Self {
        Self::with_intent(Intent::Resume, None)
    }

    #[must_use]
    pub fn with_target(mut self, target: Option<TaskId>) -> Self {
        self.target_task = target;
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}
