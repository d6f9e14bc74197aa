//! Task handler backed by a language model prompt

use super::{TaskError, TaskHandler, TaskOutput};
use crate::llm::{extract_json, LlmRequest, LlmService};
use crate::state_machine::{SessionView, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;

const REPLY_FORMAT: &str = "\n\nAnswer with a JSON object only: \
{\"reply\": \"<what to say to the user>\", \"continues\": <true if you need another \
message from the user to finish this task, otherwise false>}";

/// A task whose behaviour is entirely described by its instructions.
///
/// The session context is shown to the model so a resumed task sees the
/// state it was suspended with. The model's last reply is recorded under
/// `<task_id>.last_reply`.
pub struct PromptTask {
    id: TaskId,
    description: String,
    instructions: String,
    llm: Arc<dyn LlmService>,
}

impl PromptTask {
    pub fn new(
        id: impl Into<TaskId>,
        description: impl Into<String>,
        instructions: impl Into<String>,
        llm: Arc<dyn LlmService>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            instructions: instructions.into(),
            llm,
        }
    }

    fn build_request(&self, input: &str, session: &SessionView<'_>) -> LlmRequest {
        let context = serde_json::to_string_pretty(session.context()).unwrap_or_default();
        let system = format!(
            "{}\n\nSession context (JSON):\n{context}{REPLY_FORMAT}",
            self.instructions
        );
        LlmRequest::single(system, input)
    }
}

#[derive(Debug, Deserialize)]
struct PromptReply {
    reply: String,
    #[serde(default, deserialize_with = "lenient_flag")]
    continues: bool,
}

/// `true`, `"true"` and `"yes"` count as set; null and anything else as unset
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    })
}

/// Interpret the model's answer.
///
/// Plain text, or JSON without a readable `reply`, is taken as a finished reply.
fn parse_reply(text: &str) -> TaskOutput {
    extract_json(text)
        .and_then(|json| serde_json::from_str::<PromptReply>(json).ok())
        .map_or_else(
            || TaskOutput::done(text.trim()),
            |reply| TaskOutput {
                response: reply.reply,
                continues: reply.continues,
            },
        )
}

#[async_trait]
impl TaskHandler for PromptTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        input: &str,
        session: &mut SessionView<'_>,
    ) -> Result<TaskOutput, TaskError> {
        let request = self.build_request(input, session);
        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| TaskError::new(format!("{} is unavailable: {e}", self.id)))?;

        let output = parse_reply(&response.text);
        if output.response.is_empty() {
            return Err(TaskError::new(format!("{} returned an empty reply", self.id)));
        }

        session.set(format!("{}.last_reply", self.id), output.response.clone());
        Ok(output)
    }
}
