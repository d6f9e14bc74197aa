//! Turn routing
//!
//! The decision oracle classifies a user turn; the [`Router`] is the only
//! place that checks the oracle's answer against the registry and the
//! session before the flow controller acts on it.

mod keyword;
mod llm_oracle;
mod oracle;
mod router;

#[cfg(test)]
mod proptests;

pub use keyword::KeywordOracle;
pub use llm_oracle::LlmOracle;
pub use oracle::{DecisionOracle, RoutingError, TurnSnapshot};
pub use router::{RoutedTurn, Router};
