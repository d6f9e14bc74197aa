//! Language-model decision oracle

use super::{DecisionOracle, RoutingError, TurnSnapshot};
use crate::llm::{extract_json, LlmRequest, LlmService};
use crate::state_machine::{Intent, RoutingDecision, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

const ORACLE_MAX_TOKENS: u32 = 300;
const DEFAULT_CONFIDENCE: f32 = 0.5;

const ROUTER_INSTRUCTIONS: &str = "You route messages in a health and wellness assistant. \
Decide how the user's latest message relates to the conversation and which task should handle it.

Intents:
- new: the user starts something unrelated to any task in progress
- continue: the message answers or follows up on the active task
- interrupt: the user switches to another task while the active task is unfinished
- resume: the user wants to go back to the suspended task (\"back to\", \"where were we\", \"anyway\")

Set save_current to true on interrupt when the active task should be resumed later.
If nothing fits, use the general_query task.

Answer with a JSON object only:
{\"intent\": \"new|continue|interrupt|resume\", \"target_task\": \"<task id or null>\", \
\"save_current\": true|false, \"confidence\": 0.0-1.0, \"reason\": \"<short explanation>\"}";

/// Oracle that asks a language model to classify the turn
pub struct LlmOracle {
    llm: Arc<dyn LlmService>,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    fn build_request(snapshot: &TurnSnapshot) -> LlmRequest {
        let mut system = String::from(ROUTER_INSTRUCTIONS);
        system.push_str("\n\nAvailable tasks:\n");
        for capability in &snapshot.capabilities {
            let _ = writeln!(system, "- {}: {}", capability.id, capability.description);
        }
        let _ = write!(
            system,
            "\nActive task: {}\nSuspended tasks (most recent first): {}\nTurn: {}",
            snapshot.active_task.as_ref().map_or("none", TaskId::as_str),
            snapshot.stack_summary,
            snapshot.turn_count,
        );

        LlmRequest::single(system, snapshot.input.clone()).with_max_tokens(ORACLE_MAX_TOKENS)
    }

    /// Parse the model's answer into a decision.
    ///
    /// Accepts code fences around the JSON, intent aliases, and task names
    /// written as `HealthMonitor` or `health-monitor`. The router still
    /// validates the result.
    pub fn parse_decision(text: &str, snapshot: &TurnSnapshot) -> Result<RoutingDecision, RoutingError> {
        let json = extract_json(text).ok_or_else(|| {
            RoutingError::Oracle(format!("No JSON object in oracle reply: {}", truncate(text)))
        })?;
        let raw: RawDecision = serde_json::from_str(json)
            .map_err(|e| RoutingError::Oracle(format!("Malformed oracle reply: {e}")))?;

        let intent = match raw.intent.as_deref() {
            Some(label) => Intent::from_label(label)
                .ok_or_else(|| RoutingError::Oracle(format!("Unknown intent: {label}")))?,
            None if raw.is_interruption.unwrap_or(false) => Intent::Interrupt,
            None => Intent::New,
        };

        let target = raw
            .target_task
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("null") && !t.eq_ignore_ascii_case("none"))
            .map(|t| resolve_task_name(t, snapshot));

        let decision = RoutingDecision {
            intent,
            target_task: target,
            save_current: raw.save_current.unwrap_or(false),
            confidence: 0.0,
            reason: String::new(),
        };
        Ok(decision
            .with_confidence(raw.confidence.unwrap_or(DEFAULT_CONFIDENCE))
            .with_reason(raw.reason.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    intent: Option<String>,
    #[serde(default, alias = "target_agent", alias = "task")]
    target_task: Option<String>,
    #[serde(default, alias = "should_resume_after")]
    save_current: Option<bool>,
    #[serde(default)]
    is_interruption: Option<bool>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    confidence: Option<f32>,
    reason: Option<String>,
}

/// Models send confidence as a number, a numeric string, or null
#[allow(clippy::cast_possible_truncation)]
fn lenient_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Map a loosely written task name onto a registered id when one matches
fn resolve_task_name(name: &str, snapshot: &TurnSnapshot) -> TaskId {
    if snapshot.knows_task(name) {
        return TaskId::from(name);
    }
    let wanted = squash(name);
    snapshot
        .capabilities
        .iter()
        .find(|c| squash(c.id.as_str()) == wanted)
        .map_or_else(|| TaskId::from(name), |c| c.id.clone())
}

fn squash(name: &str) -> String {
    let lowered: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match lowered.strip_suffix("agent") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => lowered,
    }
}

fn truncate(text: &str) -> &str {
    text.char_indices()
        .nth(200)
        .and_then(|(idx, _)| text.get(..idx))
        .unwrap_or(text)
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn classify(&self, snapshot: &TurnSnapshot) -> Result<RoutingDecision, RoutingError> {
        let request = Self::build_request(snapshot);
        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| RoutingError::Oracle(e.to_string()))?;
        Self::parse_decision(&response.text, snapshot)
    }
}
