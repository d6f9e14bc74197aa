//! Built-in task catalog for the health assistant

use super::{PromptTask, TaskRegistry};
use crate::llm::LlmService;
use std::sync::Arc;

/// Static description of a built-in task
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTask {
    pub id: &'static str,
    pub description: &'static str,
    pub instructions: &'static str,
    /// Words that suggest the task, used by the keyword oracle
    pub keywords: &'static [&'static str],
}

pub const BUILTIN_TASKS: &[BuiltinTask] = &[
    BuiltinTask {
        id: "greeter",
        description: "Greets the user and handles introductions or identity changes",
        instructions: "You are the friendly front desk of a health and wellness assistant. \
            Greet the user warmly and briefly explain that you can help with meal plans, \
            health logs, affirmations and wellbeing.",
        keywords: &["hello", "hi", "hey", "good morning", "good evening"],
    },
    BuiltinTask {
        id: "planner",
        description: "Builds meal plans, schedules and health goals",
        instructions: "You help the user plan meals, schedules and health goals. \
            Ask for missing details (days, preferences, restrictions) one question at a time.",
        keywords: &["plan", "meal", "schedule", "goal", "diet", "recipe"],
    },
    BuiltinTask {
        id: "health_monitor",
        description: "Logs health readings such as glucose, heart rate, sleep and food intake",
        instructions: "You record the user's health readings. Confirm the value and unit \
            you logged; ask for the value if it is missing.",
        keywords: &["glucose", "sugar", "log", "blood", "heart rate", "sleep", "weight", "ate"],
    },
    BuiltinTask {
        id: "general_query",
        description: "Answers general health and wellness questions",
        instructions: "You answer general health and wellness questions concisely. \
            You are not a doctor; suggest professional advice for medical concerns.",
        keywords: &["what", "why", "how", "question"],
    },
    BuiltinTask {
        id: "affirmation",
        description: "Offers positive affirmations and motivation",
        instructions: "You give the user a short, sincere positive affirmation.",
        keywords: &["affirmation", "motivate", "motivation", "encourage", "cheer"],
    },
    BuiltinTask {
        id: "wellbeing",
        description: "Supports stress management, mindfulness and emotional wellbeing",
        instructions: "You support the user's mental wellbeing: stress, anxiety, \
            mindfulness and breathing exercises. Be calm and gentle.",
        keywords: &["stress", "stressed", "anxious", "anxiety", "meditate", "breathe", "calm"],
    },
];

/// Registry holding every built-in task, all backed by the same model
pub fn builtin_registry(llm: &Arc<dyn LlmService>) -> TaskRegistry {
    BUILTIN_TASKS.iter().fold(TaskRegistry::new(), |registry, task| {
        registry.with_task(Arc::new(PromptTask::new(
            task.id,
            task.description,
            task.instructions,
            Arc::clone(llm),
        )))
    })
}
