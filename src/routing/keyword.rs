//! Offline decision oracle based on phrases and keywords

use super::{DecisionOracle, RoutingError, TurnSnapshot};
use crate::state_machine::{Intent, RoutingDecision, TaskId};
use crate::tasks::BuiltinTask;
use async_trait::async_trait;
use regex::Regex;

/// Phrases that ask to go back to a suspended task
const RESUME_PHRASES: &[&str] = &[
    "back to",
    "continue with",
    "let's go back",
    "where were we",
    "anyway",
    "as i was saying",
    "resume my previous task",
    "back to what we were doing",
];

struct KeywordRule {
    task_id: TaskId,
    pattern: Regex,
}

/// Heuristic oracle for running without a language model.
///
/// A keyword for another task while one is active interrupts it and keeps it
/// for later. No keyword means the active task continues.
pub struct KeywordOracle {
    rules: Vec<KeywordRule>,
}

impl KeywordOracle {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_catalog(tasks: &[BuiltinTask]) -> Result<Self, regex::Error> {
        tasks
            .iter()
            .try_fold(Self::new(), |oracle, task| oracle.with_rule(task.id, task.keywords))
    }

    /// Add a rule matching any of `keywords` as whole words, case-insensitively
    pub fn with_rule(mut self, task_id: impl Into<TaskId>, keywords: &[&str]) -> Result<Self, regex::Error> {
        if keywords.is_empty() {
            return Ok(self);
        }
        let alternatives = keywords.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))?;
        self.rules.push(KeywordRule {
            task_id: task_id.into(),
            pattern,
        });
        Ok(self)
    }

    fn best_match(&self, snapshot: &TurnSnapshot) -> Option<TaskId> {
        let mut best: Option<(&TaskId, usize)> = None;
        for rule in &self.rules {
            if !snapshot.knows_task(rule.task_id.as_str()) {
                continue;
            }
            let hits = rule.pattern.find_iter(&snapshot.input).count();
            if hits > best.map_or(0, |(_, most)| most) {
                best = Some((&rule.task_id, hits));
            }
        }
        best.map(|(task_id, _)| task_id.clone())
    }
}

impl Default for KeywordOracle {
    fn default() -> Self {
        Self::new()
    }
}

fn asks_to_resume(input: &str) -> bool {
    let lowered = input.to_lowercase();
    RESUME_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

#[async_trait]
impl DecisionOracle for KeywordOracle {
    async fn classify(&self, snapshot: &TurnSnapshot) -> Result<RoutingDecision, RoutingError> {
        if snapshot.resumable_task.is_some() && asks_to_resume(&snapshot.input) {
            return Ok(RoutingDecision::resume()
                .with_confidence(0.8)
                .with_reason("resume phrase"));
        }

        let decision = match (self.best_match(snapshot), snapshot.active_task.as_ref()) {
            (Some(target), None) => RoutingDecision::new_task(target).with_confidence(0.6),
            (Some(target), Some(active)) if &target == active => {
                RoutingDecision::continue_active().with_confidence(0.7)
            }
            (Some(target), Some(_)) => RoutingDecision::interrupt(target, true).with_confidence(0.6),
            (None, Some(_)) => RoutingDecision::continue_active().with_confidence(0.5),
            (None, None) => RoutingDecision {
                intent: Intent::New,
                target_task: None,
                save_current: false,
                confidence: 0.2,
                reason: String::new(),
            },
        };
        Ok(decision.with_reason("keyword match"))
    }
}
