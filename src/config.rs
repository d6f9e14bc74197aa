//! Runtime configuration
//!
//! Flow settings are read from the environment once at startup. Invalid values
//! are logged and replaced by defaults rather than aborting the process.

use crate::state_machine::TaskId;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// Task used when routing cannot be resolved
pub const DEFAULT_FALLBACK_TASK: &str = "general_query";

/// Default bound on suspended-task depth
pub const DEFAULT_STACK_CAPACITY: usize = 4;

/// What to do with the active task when a turn interrupts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Honor the oracle's `save_current` flag
    #[default]
    FollowOracle,
    /// Always suspend the active task onto the flow stack
    AlwaysSave,
    /// Always discard the active task
    NeverSave,
}

impl InterruptPolicy {
    /// Resolve whether the active task is saved, given the oracle's request
    pub fn should_save(self, requested: bool) -> bool {
        match self {
            InterruptPolicy::FollowOracle => requested,
            InterruptPolicy::AlwaysSave => true,
            InterruptPolicy::NeverSave => false,
        }
    }
}

impl FromStr for InterruptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "follow_oracle" | "oracle" => Ok(Self::FollowOracle),
            "always_save" | "always" => Ok(Self::AlwaysSave),
            "never_save" | "never" => Ok(Self::NeverSave),
            other => Err(format!("unknown interrupt policy: {other}")),
        }
    }
}

/// Settings consumed by the flow controller
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub fallback_task: TaskId,
    pub stack_capacity: NonZeroUsize,
    pub interrupt_policy: InterruptPolicy,
    /// Upper bound on a single handler invocation; a timeout counts as a handler failure
    pub handler_timeout: Option<Duration>,
}

impl FlowConfig {
    #[must_use]
    pub fn with_stack_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }

    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            fallback_task: TaskId::from(DEFAULT_FALLBACK_TASK),
            stack_capacity: NonZeroUsize::new(DEFAULT_STACK_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            interrupt_policy: InterruptPolicy::default(),
            handler_timeout: None,
        }
    }
}

/// Which decision oracle the service uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OracleKind {
    /// Language-model classifier
    #[default]
    Llm,
    /// Offline phrase/keyword heuristic
    Keyword,
}

impl FromStr for OracleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "keyword" | "keywords" => Ok(Self::Keyword),
            other => Err(format!("unknown oracle: {other}")),
        }
    }
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub port: u16,
    pub oracle: OracleKind,
    pub flow: FlowConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("WELLFLOW_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.wellflow/sessions.db")
        });

        let port = parse_env("WELLFLOW_PORT").unwrap_or(8000);
        let oracle = parse_env("WELLFLOW_ORACLE").unwrap_or_default();

        let mut flow = FlowConfig::default();
        if let Ok(task) = std::env::var("WELLFLOW_FALLBACK_TASK") {
            if !task.trim().is_empty() {
                flow.fallback_task = TaskId::from(task.trim());
            }
        }
        if let Some(capacity) = parse_env::<usize>("WELLFLOW_STACK_CAPACITY") {
            match NonZeroUsize::new(capacity) {
                Some(capacity) => flow.stack_capacity = capacity,
                None => tracing::warn!("WELLFLOW_STACK_CAPACITY must be positive, using default"),
            }
        }
        if let Some(policy) = parse_env("WELLFLOW_INTERRUPT_POLICY") {
            flow.interrupt_policy = policy;
        }
        if let Some(secs) = parse_env::<u64>("WELLFLOW_HANDLER_TIMEOUT_SECS") {
            flow.handler_timeout = Some(Duration::from_secs(secs));
        }

        Self {
            db_path,
            port,
            oracle,
            flow,
        }
    }
}

fn parse_env<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_policy_parsing() {
        assert_eq!("always".parse::<InterruptPolicy>(), Ok(InterruptPolicy::AlwaysSave));
        assert_eq!("NEVER_SAVE".parse::<InterruptPolicy>(), Ok(InterruptPolicy::NeverSave));
        assert_eq!(
            "follow_oracle".parse::<InterruptPolicy>(),
            Ok(InterruptPolicy::FollowOracle)
        );
        assert!("sometimes".parse::<InterruptPolicy>().is_err());
    }

    #[test]
    fn test_interrupt_policy_resolution() {
        assert!(InterruptPolicy::FollowOracle.should_save(true));
        assert!(!InterruptPolicy::FollowOracle.should_save(false));
        assert!(InterruptPolicy::AlwaysSave.should_save(false));
        assert!(!InterruptPolicy::NeverSave.should_save(true));
    }

    #[test]
    fn test_flow_config_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.fallback_task.as_str(), DEFAULT_FALLBACK_TASK);
        assert_eq!(config.stack_capacity.get(), DEFAULT_STACK_CAPACITY);
        assert_eq!(config.interrupt_policy, InterruptPolicy::FollowOracle);
        assert!(config.handler_timeout.is_none());
    }
}
