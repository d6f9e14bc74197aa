//! Wellflow - conversation flow controller
//!
//! Routes each user turn of a multi-task assistant session to one task
//! handler, suspending and resuming unfinished tasks on a bounded stack.

pub mod api;
pub mod config;
pub mod db;
pub mod llm;
pub mod routing;
pub mod runtime;
pub mod state_machine;
pub mod tasks;
