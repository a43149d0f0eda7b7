//! Autonomous Step Engine
//!
//! One [`Actor`] runs the five-phase control loop:
//! 1. ANALYZE the situation against goals and recent memory
//! 2. PLAN an ordered list of steps
//! 3. EXECUTE steps through the injected [`StepHandler`], replanning on weak results
//! 4. REFLECT on the execution and record exactly one memory
//! 5. ADAPT goal priorities and thresholds (monotonic)
//!
//! Model failures never escape a phase: each one degrades to the documented
//! fallback record. Only internal invariant violations surface as errors.
//!
//! Industry standard: OODA loop with plan-and-execute and post-hoc reflection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::gateway::{CallOptions, ModelGateway};
use super::handler::{StepContext, StepHandler, StepResult};
use super::input::ActorInput;
use super::planner::{self, Plan};
use super::records::{LearningInsight, NegotiationStrategy, SituationAnalysis};
use super::reflection::{AdaptationReport, ReflectionEngine};
use crate::autonomous::goals::Goal;
use crate::autonomous::memory::{MemoryBank, MemoryRecord};
use crate::error::EngineError;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Steps scoring below this ask the model whether to replan
    pub adaptation_threshold: f64,
    /// Replans allowed within one execution
    pub max_plan_adaptations: u32,
    /// Memories shown to the analysis prompt
    pub analysis_memory_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adaptation_threshold: 0.5,
            max_plan_adaptations: 2,
            analysis_memory_window: 5,
        }
    }
}

/// EXECUTE output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The plan in force when execution finished
    pub executed_plan: Plan,
    pub step_results: Vec<StepResult>,
    /// Replans during this execution
    pub adaptations_made: u32,
    /// Mean step success, 0 with no steps
    pub overall_success: f64,
}

impl ExecutionResult {
    pub fn from_steps(executed_plan: Plan, step_results: Vec<StepResult>, adaptations_made: u32) -> Self {
        let overall_success = if step_results.is_empty() {
            0.0
        } else {
            step_results.iter().map(|r| r.success).sum::<f64>() / step_results.len() as f64
        };
        Self {
            executed_plan,
            step_results,
            adaptations_made,
            overall_success,
        }
    }

    /// Compact view for prompts
    pub fn summary(&self) -> Value {
        let steps: Vec<Value> = self
            .step_results
            .iter()
            .map(|r| {
                json!({
                    "action": r.step.action,
                    "success": r.success,
                    "outcome": r.outcome,
                    "next_action_hint": r.next_action_hint,
                })
            })
            .collect();
        json!({
            "plan_id": self.executed_plan.id,
            "steps": steps,
            "adaptations_made": self.adaptations_made,
            "overall_success": self.overall_success,
        })
    }
}

/// One entry of the reflection history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionEntry {
    pub plan_id: String,
    pub overall_success: f64,
    pub insight: LearningInsight,
    pub created_at: DateTime<Utc>,
}

/// One entry of the negotiation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    pub with_actor_id: String,
    pub topic: String,
    pub strategy: NegotiationStrategy,
    pub created_at: DateTime<Utc>,
}

/// Read-only view of an actor, shown to its negotiation counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: String,
    pub goals: Vec<Goal>,
}

/// Everything one cycle produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorOutcome {
    pub agent_id: String,
    pub situation_analysis: SituationAnalysis,
    pub plan: Plan,
    pub execution: ExecutionResult,
    pub learning_insight: LearningInsight,
    /// Lifetime replan count of the actor
    pub adaptation_level: u32,
}

/// An autonomous actor and all of its state
pub struct Actor {
    id: String,
    goals: Vec<Goal>,
    memory: MemoryBank,
    current_plan: Option<Plan>,
    reflection_history: Vec<ReflectionEntry>,
    negotiation_history: Vec<NegotiationRecord>,
    adaptation_count: u32,
    gateway: ModelGateway,
    handler: Arc<dyn StepHandler>,
    config: EngineConfig,
    reflection: ReflectionEngine,
}

impl Actor {
    /// Create an actor; the id must be non-empty and at least one goal given
    pub fn new(
        id: &str,
        goals: Vec<Goal>,
        handler: Arc<dyn StepHandler>,
        gateway: ModelGateway,
    ) -> Result<Self, EngineError> {
        if id.trim().is_empty() {
            return Err(EngineError::InvalidGoal("actor id is empty".to_string()));
        }
        if goals.is_empty() {
            return Err(EngineError::InvalidGoal(format!("actor {} has no goals", id)));
        }

        Ok(Self {
            id: id.to_string(),
            goals,
            memory: MemoryBank::new(),
            current_plan: None,
            reflection_history: vec![],
            negotiation_history: vec![],
            adaptation_count: 0,
            gateway,
            handler,
            config: EngineConfig::default(),
            reflection: ReflectionEngine::new(),
        })
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reflection(mut self, reflection: ReflectionEngine) -> Self {
        self.reflection = reflection;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &'static str {
        self.handler.kind()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn memory(&self) -> &MemoryBank {
        &self.memory
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.current_plan.as_ref()
    }

    pub fn reflection_history(&self) -> &[ReflectionEntry] {
        &self.reflection_history
    }

    pub fn negotiation_history(&self) -> &[NegotiationRecord] {
        &self.negotiation_history
    }

    pub fn adaptation_count(&self) -> u32 {
        self.adaptation_count
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    pub fn profile(&self) -> ActorProfile {
        ActorProfile {
            id: self.id.clone(),
            goals: self.goals.clone(),
        }
    }

    /// Append a memory record, enforcing the cap
    pub fn record_memory(&mut self, record: MemoryRecord) {
        self.memory.push(record);
    }

    /// Run one full analyze → plan → execute → reflect → adapt cycle
    pub async fn autonomous_process(&mut self, input: &ActorInput) -> Result<ActorOutcome, EngineError> {
        info!("Agent {} starting autonomous cycle", self.id);

        let analysis = self.analyze(input).await;
        debug!(
            "Agent {} situation: {} (confidence {:.2})",
            self.id, analysis.situation_type, analysis.confidence_level
        );

        let plan = planner::draft_plan(&self.gateway, &self.id, &analysis, &self.goals, &self.memory, None).await?;
        self.current_plan = Some(plan.clone());

        let execution = self.execute(plan.clone(), input).await?;
        let insight = self.reflect(&execution).await;
        let report = self.adapt_behavior(&insight);
        if !report.is_empty() {
            debug!("Agent {} adapted: {:?}", self.id, report);
        }

        info!(
            "Agent {} finished cycle: success {:.2}, {} adaptation(s)",
            self.id, execution.overall_success, execution.adaptations_made
        );

        Ok(ActorOutcome {
            agent_id: self.id.clone(),
            situation_analysis: analysis,
            plan,
            execution,
            learning_insight: insight,
            adaptation_level: self.adaptation_count,
        })
    }

    async fn analyze(&self, input: &ActorInput) -> SituationAnalysis {
        let prompt = format!(
            r#"You are autonomous agent {id}. Analyze the current situation.

Your Goals:
{goals}

Recent Experiences:
{memory}

Input:
{input}

Identify the situation, its challenges and opportunities, and which goals matter most.
Respond in JSON:
{{
    "situation_type": "type of situation",
    "key_challenges": ["challenge1"],
    "opportunities": ["opportunity1"],
    "relevant_goals": ["goal_kind"],
    "strategic_approach": "recommended approach",
    "confidence_level": 0.0,
    "reasoning": "detailed reasoning",
    "learned_patterns": ["pattern1"]
}}"#,
            id = self.id,
            goals = serde_json::to_string_pretty(&self.goals).unwrap_or_default(),
            memory = serde_json::to_string_pretty(&self.memory.recent(self.config.analysis_memory_window))
                .unwrap_or_default(),
            input = serde_json::to_string_pretty(&input.sanitized()).unwrap_or_default(),
        );

        self.gateway
            .ask("analysis", &prompt, CallOptions::ANALYSIS, SituationAnalysis::fallback())
            .await
    }

    /// Run steps in order, replanning on weak results
    ///
    /// Each step may trigger at most one replan, and one execution at most
    /// `max_plan_adaptations`. A replan replaces all remaining steps.
    async fn execute(&mut self, plan: Plan, input: &ActorInput) -> Result<ExecutionResult, EngineError> {
        let mut current = plan;
        let mut pending: VecDeque<_> = current.steps.iter().cloned().collect();
        let mut results: Vec<StepResult> = Vec::with_capacity(pending.len());
        let mut adaptations = 0u32;

        while let Some(step) = pending.pop_front() {
            let result = {
                let ctx = StepContext {
                    actor_id: &self.id,
                    step: &step,
                    input,
                    previous: &results,
                    goals: &self.goals,
                    memory: &self.memory,
                    gateway: &self.gateway,
                };
                self.handler.execute_step(&ctx).await
            };
            debug!(
                "Agent {} step {} '{}' scored {:.2}",
                self.id, step.index, step.action, result.success
            );

            let weak = result.success < self.config.adaptation_threshold;
            if weak && adaptations >= self.config.max_plan_adaptations {
                warn!(
                    "Agent {} step '{}' is weak but the replan limit ({}) is reached",
                    self.id, step.action, self.config.max_plan_adaptations
                );
            }

            if weak && adaptations < self.config.max_plan_adaptations {
                let decision =
                    planner::decide_adaptation(&self.gateway, &self.id, &current, &result, &results).await;

                if decision.should_adapt {
                    info!("Agent {} adapting plan: {}", self.id, decision.reason);
                    let analysis = SituationAnalysis {
                        situation_type: "plan_adaptation".to_string(),
                        reasoning: decision.reason.clone(),
                        ..Default::default()
                    };
                    let replacement = planner::draft_plan(
                        &self.gateway,
                        &self.id,
                        &analysis,
                        &self.goals,
                        &self.memory,
                        Some(&result),
                    )
                    .await?;

                    pending = replacement.steps.iter().cloned().collect();
                    current = replacement;
                    self.current_plan = Some(current.clone());
                    self.adaptation_count += 1;
                    adaptations += 1;
                }
            }

            results.push(result);
        }

        Ok(ExecutionResult::from_steps(current, results, adaptations))
    }

    async fn reflect(&mut self, execution: &ExecutionResult) -> LearningInsight {
        let plan = &execution.executed_plan;
        let insight = self
            .reflection
            .reflect(&self.gateway, &self.id, plan, execution, &self.memory)
            .await;

        let record = self.reflection.memory_from_outcome(plan, execution, &insight);
        self.record_memory(record);
        self.reflection_history.push(ReflectionEntry {
            plan_id: plan.id.clone(),
            overall_success: execution.overall_success,
            insight: insight.clone(),
            created_at: Utc::now(),
        });
        insight
    }

    fn adapt_behavior(&mut self, insight: &LearningInsight) -> AdaptationReport {
        self.reflection.adapt_goals(&mut self.goals, insight, &self.memory)
    }

    /// Form a negotiating position towards another actor on a topic
    pub async fn negotiate(&mut self, other: &ActorProfile, topic: &str, context: &Value) -> NegotiationStrategy {
        let prompt = format!(
            r#"You are autonomous agent {id} negotiating with agent {other}.

Topic: {topic}

Your Goals:
{own_goals}

Their Goals:
{other_goals}

Context:
{context}

Recent Experiences:
{memory}

Find an arrangement that serves both sets of goals. If the topic is how to
coordinate, name the mode you prefer: sequential, parallel, or negotiated.
Respond in JSON:
{{
    "negotiation_position": "your stance",
    "must_have_requirements": ["requirement1"],
    "compromise_areas": ["area1"],
    "value_proposition": "what you offer",
    "batna": "best alternative if no agreement",
    "opening_offer": "initial proposal",
    "concession_strategy": "how you would concede",
    "success_metrics": ["metric1"],
    "preferred_mode": "sequential"
}}"#,
            id = self.id,
            other = other.id,
            topic = topic,
            own_goals = serde_json::to_string_pretty(&self.goals).unwrap_or_default(),
            other_goals = serde_json::to_string_pretty(&other.goals).unwrap_or_default(),
            context = serde_json::to_string_pretty(context).unwrap_or_default(),
            memory = serde_json::to_string_pretty(&self.memory.recent(3)).unwrap_or_default(),
        );

        let strategy = self
            .gateway
            .ask("negotiation", &prompt, CallOptions::NEGOTIATION, NegotiationStrategy::fallback())
            .await;

        info!(
            "Agent {} negotiated '{}' with {}: {}",
            self.id, topic, other.id, strategy.negotiation_position
        );
        self.negotiation_history.push(NegotiationRecord {
            with_actor_id: other.id.clone(),
            topic: topic.to_string(),
            strategy: strategy.clone(),
            created_at: Utc::now(),
        });
        strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::recovery::RetryPolicy;
    use crate::autonomous::goals::document_goals;
    use crate::error::InvokeError;
    use crate::providers::mock::ScriptedModel;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Scores steps by action name, 0.8 for anything unlisted
    struct TableHandler(Vec<(&'static str, f64)>);

    #[async_trait]
    impl StepHandler for TableHandler {
        fn kind(&self) -> &'static str {
            "table"
        }

        async fn execute_step(&self, ctx: &StepContext<'_>) -> StepResult {
            let score = self
                .0
                .iter()
                .find(|(action, _)| ctx.step.action == *action)
                .map(|(_, s)| *s)
                .unwrap_or(0.8);
            StepResult::new(ctx.step, score, "done")
        }
    }

    const TWO_STEP_PLAN: &str = r#"{"primary_goal": "onboard", "customer_segment": "Rural",
        "steps": [{"action": "choose_strategy"}, {"action": "analyze_document"}],
        "overall_confidence": 0.8}"#;

    fn actor(model: ScriptedModel, handler: TableHandler) -> (Actor, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let gateway = ModelGateway::new(
            model.clone(),
            RetryPolicy::standard().with_base_delay(Duration::from_millis(1)),
        );
        let actor = Actor::new("doc", document_goals().unwrap(), Arc::new(handler), gateway).unwrap();
        (actor, model)
    }

    #[test]
    fn test_new_validates() {
        let gateway = ModelGateway::with_default_policy(Arc::new(ScriptedModel::new()));
        let handler: Arc<dyn StepHandler> = Arc::new(TableHandler(vec![]));
        assert!(Actor::new(" ", document_goals().unwrap(), handler.clone(), gateway.clone()).is_err());
        assert!(Actor::new("doc", vec![], handler, gateway).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_without_adaptation() {
        let (mut actor, model) = actor(
            ScriptedModel::new().on("Create a strategic plan", TWO_STEP_PLAN),
            TableHandler(vec![]),
        );

        let outcome = actor.autonomous_process(&ActorInput::default()).await.unwrap();

        assert_eq!(outcome.agent_id, "doc");
        assert_eq!(outcome.plan.steps.len(), 2);
        assert_eq!(outcome.execution.step_results.len(), 2);
        assert!((outcome.execution.overall_success - 0.8).abs() < 1e-9);
        assert_eq!(outcome.execution.adaptations_made, 0);
        assert_eq!(outcome.adaptation_level, 0);
        assert_eq!(actor.memory().len(), 1);
        assert_eq!(actor.reflection_history().len(), 1);
        assert_eq!(actor.memory().last().unwrap().segment_label, "Rural");
        // analysis, plan, reflection
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replanning_is_bounded() {
        let plan = r#"{"steps": [{"action": "weak_step"}, {"action": "finish"}]}"#;
        let (mut actor, model) = actor(
            ScriptedModel::new()
                .on("Create a strategic plan", plan)
                .on("produced a weak result", r#"{"should_adapt": true, "reason": "too weak"}"#),
            TableHandler(vec![("weak_step", 0.2)]),
        );
        let first_plan_id;
        {
            let outcome = actor.autonomous_process(&ActorInput::default()).await.unwrap();
            first_plan_id = outcome.plan.id.clone();

            let actions: Vec<&str> = outcome
                .execution
                .step_results
                .iter()
                .map(|r| r.step.action.as_str())
                .collect();
            assert_eq!(actions, vec!["weak_step", "weak_step", "weak_step", "finish"]);
            assert_eq!(outcome.execution.adaptations_made, 2);
            assert_ne!(outcome.execution.executed_plan.id, first_plan_id);
        }
        assert_eq!(actor.adaptation_count(), 2);
        assert_ne!(actor.current_plan().unwrap().id, first_plan_id);

        let replans = model
            .prompts()
            .iter()
            .filter(|p| p.contains("replacement plan"))
            .count();
        assert_eq!(replans, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_adaptation_keeps_plan() {
        let (mut actor, _model) = actor(
            ScriptedModel::new()
                .on("Create a strategic plan", TWO_STEP_PLAN)
                .on("produced a weak result", r#"{"should_adapt": false}"#),
            TableHandler(vec![("choose_strategy", 0.1)]),
        );
        let outcome = actor.autonomous_process(&ActorInput::default()).await.unwrap();
        assert_eq!(outcome.execution.step_results.len(), 2);
        assert_eq!(outcome.execution.executed_plan.id, outcome.plan.id);
        assert_eq!(actor.adaptation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_model_degrades_every_phase() {
        let (mut actor, _model) = actor(
            ScriptedModel::new().otherwise(Err(InvokeError::Upstream("service down".into()))),
            TableHandler(vec![]),
        );

        let outcome = actor.autonomous_process(&ActorInput::default()).await.unwrap();

        assert_eq!(outcome.situation_analysis.situation_type, "unknown");
        assert_eq!(outcome.plan.steps.len(), 1);
        assert_eq!(outcome.plan.lead_action(), "Use basic processing");
        assert_eq!(outcome.learning_insight.headline(), "Reflection process failed");
        assert_eq!(actor.memory().len(), 1);
        assert_eq!(actor.memory().last().unwrap().insight, "Reflection process failed");
        assert_eq!(actor.reflection_history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_adaptation_call_uses_success_rule() {
        let (mut actor, _model) = actor(
            ScriptedModel::new()
                .on("Create a strategic plan", r#"{"steps": [{"action": "very_weak"}]}"#)
                .fail_on("produced a weak result", InvokeError::Upstream("boom".into())),
            TableHandler(vec![("very_weak", 0.1)]),
        );
        let outcome = actor.autonomous_process(&ActorInput::default()).await.unwrap();
        // 0.1 < 0.3 so each failed decision still replans, until the limit
        assert_eq!(outcome.execution.adaptations_made, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reflection_escalates_named_goal() {
        let (mut actor, _model) = actor(
            ScriptedModel::new().on(
                "Reflect on the plan",
                r#"{"key_learnings": ["photos need retries"],
                    "future_goal_adjustments": ["Raise priority of document intelligence"]}"#,
            ),
            TableHandler(vec![]),
        );
        actor.autonomous_process(&ActorInput::default()).await.unwrap();

        let goal = actor.goals().iter().find(|g| g.kind == "document_intelligence").unwrap();
        assert_eq!(goal.priority, 10);
        assert_eq!(actor.memory().last().unwrap().insight, "photos need retries");
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cap_across_cycles() {
        let (mut actor, _model) = actor(ScriptedModel::new(), TableHandler(vec![]));
        for _ in 0..21 {
            actor.autonomous_process(&ActorInput::default()).await.unwrap();
        }
        assert_eq!(actor.memory().len(), 15);
        assert_eq!(actor.reflection_history().len(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiate_records_history() {
        let (mut actor, model) = actor(
            ScriptedModel::new().on(
                "negotiating with agent risk",
                r#"{"negotiation_position": "Share extraction results early", "preferred_mode": "negotiated"}"#,
            ),
            TableHandler(vec![]),
        );
        let other = ActorProfile { id: "risk".into(), goals: vec![] };

        let strategy = actor
            .negotiate(&other, "coordination_strategy", &json!({"application_id": "A1"}))
            .await;

        assert_eq!(strategy.negotiation_position, "Share extraction results early");
        assert_eq!(strategy.preferred_mode.as_deref(), Some("negotiated"));
        assert_eq!(actor.negotiation_history().len(), 1);
        assert_eq!(actor.negotiation_history()[0].with_actor_id, "risk");
        assert!(model.prompts()[0].contains("coordination_strategy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_reflection_keeps_real_learning() {
        let (mut actor, _model) = actor(
            ScriptedModel::new().on(
                "Reflect on the plan you just executed",
                r#"{"success_factors": ["clear scan"], "confidence_in_learning": 0.9}"#,
            ),
            TableHandler(vec![]),
        );

        let outcome = actor.autonomous_process(&ActorInput::default()).await.unwrap();

        assert_eq!(outcome.learning_insight.confidence_in_learning, 0.9);
        assert_eq!(outcome.learning_insight.headline(), "No specific learning");
        assert_eq!(actor.memory().last().unwrap().insight, "No specific learning");
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiate_fallback() {
        let (mut actor, _model) = actor(
            ScriptedModel::new().otherwise(Err(InvokeError::Upstream("down".into()))),
            TableHandler(vec![]),
        );
        let other = actor.profile();
        let strategy = actor.negotiate(&other, "topic", &Value::Null).await;
        assert_eq!(strategy.negotiation_position, "Cooperative approach");
        assert_eq!(actor.negotiation_history().len(), 1);
    }

    #[test]
    fn test_execution_result_mean() {
        let plan = Plan::fallback();
        let empty = ExecutionResult::from_steps(plan.clone(), vec![], 0);
        assert_eq!(empty.overall_success, 0.0);

        let results = vec![
            StepResult::new(&plan.steps[0], 0.4, "a"),
            StepResult::new(&plan.steps[0], 0.8, "b"),
        ];
        let exec = ExecutionResult::from_steps(plan, results, 0);
        assert!((exec.overall_success - 0.6).abs() < 1e-9);
        assert_eq!(exec.summary()["steps"].as_array().unwrap().len(), 2);
    }
}
