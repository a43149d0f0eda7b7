//! Step handlers
//!
//! The engine runs the same five-phase loop for every actor. What a plan step
//! actually *does* is delegated to an injected [`StepHandler`], so new actor
//! kinds are new handler types rather than new engines.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::gateway::ModelGateway;
use super::input::ActorInput;
use super::planner::StepSpec;
use super::records::clamp_unit;
use crate::autonomous::goals::Goal;
use crate::autonomous::memory::MemoryBank;

/// Outcome of executing one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepSpec,
    /// Clamped to [0, 1]
    pub success: f64,
    pub outcome: String,
    pub learned_info: Map<String, Value>,
    pub next_action_hint: String,
}

impl StepResult {
    pub fn new(step: &StepSpec, success: f64, outcome: &str) -> Self {
        Self {
            step: step.clone(),
            success: clamp_unit(success),
            outcome: outcome.to_string(),
            learned_info: Map::new(),
            next_action_hint: "continue".to_string(),
        }
    }

    pub fn with_info(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.learned_info.insert(key.to_string(), value.into());
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.next_action_hint = hint.to_string();
        self
    }
}

/// Everything a handler may read while executing a step
pub struct StepContext<'a> {
    pub actor_id: &'a str,
    pub step: &'a StepSpec,
    pub input: &'a ActorInput,
    pub previous: &'a [StepResult],
    pub goals: &'a [Goal],
    pub memory: &'a MemoryBank,
    pub gateway: &'a ModelGateway,
}

impl StepContext<'_> {
    pub fn goal(&self, kind: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.kind == kind)
    }
}

/// Actor-kind specific step interpretation
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Short actor-kind label ("document", "risk", ...)
    fn kind(&self) -> &'static str;

    /// Execute one step. Must not fail: degrade to a low-success result instead.
    async fn execute_step(&self, ctx: &StepContext<'_>) -> StepResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_result_clamps_and_builds() {
        let step = StepSpec::new(1, "choose_strategy");
        let result = StepResult::new(&step, 1.3, "done")
            .with_info("strategy", "rural_optimized")
            .with_hint("proceed");

        assert_eq!(result.success, 1.0);
        assert_eq!(result.learned_info["strategy"], "rural_optimized");
        assert_eq!(result.next_action_hint, "proceed");
        assert_eq!(StepResult::new(&step, -0.2, "x").success, 0.0);
    }
}
