//! Planning
//!
//! Turns a situation analysis into an ordered, validated plan:
//! - Model drafts the plan as JSON ([`PlanDraft`])
//! - Drafts are normalized: steps without an action are dropped, indices renumbered from 1
//! - An empty draft falls back to a single basic-processing step
//! - Mid-execution replanning reuses the same prompt, seeded with the failing step
//!
//! Industry standard: plan-and-execute agents with contingency branches

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::gateway::{CallOptions, ModelGateway};
use super::handler::StepResult;
use super::records::{clamp_unit, AdaptationDecision, PlanDraft, SituationAnalysis, StepDraft};
use crate::autonomous::goals::Goal;
use crate::autonomous::memory::MemoryBank;
use crate::error::EngineError;

/// Memory records scoring above this seed the planner with past actions
pub const SUCCESSFUL_MEMORY_THRESHOLD: f64 = 0.7;

/// A single step in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// 1-indexed position
    pub index: u32,
    pub action: String,
    pub reasoning: String,
    pub success_criteria: String,
    pub resources_needed: Vec<String>,
    pub estimated_confidence: f64,
}

impl StepSpec {
    pub fn new(index: u32, action: &str) -> Self {
        Self {
            index,
            action: action.to_string(),
            reasoning: String::new(),
            success_criteria: String::new(),
            resources_needed: vec![],
            estimated_confidence: 0.5,
        }
    }

    /// Case-insensitive substring match on the action text
    pub fn action_mentions(&self, needle: &str) -> bool {
        self.action.to_lowercase().contains(needle)
    }

    pub fn format(&self) -> String {
        format!(
            "{}. {} (confidence {:.2})",
            self.index, self.action, self.estimated_confidence
        )
    }
}

/// What to do if a scenario occurs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contingency {
    pub scenario: String,
    pub alternative_action: String,
    pub reasoning: String,
}

/// One actor's intended course of action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub goal_summary: String,
    pub target_segment: String,
    pub steps: Vec<StepSpec>,
    pub contingencies: Vec<Contingency>,
    pub expected_outcome: String,
    pub confidence: f64,
    pub strategy_note: String,
}

impl Plan {
    /// Normalize a model draft into a plan with a fresh id
    pub fn from_draft(draft: PlanDraft) -> Self {
        let mut kept: Vec<StepDraft> = Vec::with_capacity(draft.steps.len());
        for step in draft.steps {
            if step.action.trim().is_empty() {
                warn!("Dropping drafted step without an action: {:?}", step.step_number);
                continue;
            }
            kept.push(step);
        }
        if kept.is_empty() {
            debug!("Draft had no usable steps, substituting basic processing");
            kept.push(StepDraft::basic_processing());
        }

        let steps = kept
            .into_iter()
            .enumerate()
            .map(|(i, s)| StepSpec {
                index: i as u32 + 1,
                action: s.action.trim().to_string(),
                reasoning: s.reasoning,
                success_criteria: s.success_criteria,
                resources_needed: s.resources_needed,
                estimated_confidence: clamp_unit(s.estimated_confidence),
            })
            .collect();

        let contingencies = draft
            .contingencies
            .into_iter()
            .map(|c| Contingency {
                scenario: c.scenario,
                alternative_action: c.alternative_action,
                reasoning: c.reasoning,
            })
            .collect();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal_summary: draft.primary_goal,
            target_segment: draft.customer_segment,
            steps,
            contingencies,
            expected_outcome: draft.expected_outcome,
            confidence: clamp_unit(draft.overall_confidence),
            strategy_note: draft.strategy,
        }
    }

    /// Single-step plan used when planning is unavailable
    pub fn fallback() -> Self {
        Self::from_draft(PlanDraft::fallback())
    }

    /// Check plan invariants
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::InvalidPlan(format!("plan {} has no steps", self.id)));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::InvalidPlan(format!(
                "plan {} confidence {} outside [0, 1]",
                self.id, self.confidence
            )));
        }

        let mut last_index = 0;
        for step in &self.steps {
            if step.action.trim().is_empty() {
                return Err(EngineError::InvalidPlan(format!(
                    "plan {} step {} has no action",
                    self.id, step.index
                )));
            }
            if step.index <= last_index {
                return Err(EngineError::InvalidPlan(format!(
                    "plan {} step indices not increasing at {}",
                    self.id, step.index
                )));
            }
            if !(0.0..=1.0).contains(&step.estimated_confidence) {
                return Err(EngineError::InvalidPlan(format!(
                    "plan {} step {} confidence outside [0, 1]",
                    self.id, step.index
                )));
            }
            last_index = step.index;
        }
        Ok(())
    }

    /// First step's action, for memory records
    pub fn lead_action(&self) -> &str {
        self.steps.first().map(|s| s.action.as_str()).unwrap_or("No action")
    }

    pub fn format(&self) -> String {
        let mut output = format!("Plan {}: {}\n", self.id, self.goal_summary);
        for step in &self.steps {
            output.push_str(&format!("  {}\n", step.format()));
        }
        output.push_str(&format!("Confidence: {:.2}", self.confidence));
        output
    }
}

fn to_pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn planning_prompt(
    actor_id: &str,
    analysis: &SituationAnalysis,
    goals: &[Goal],
    proven_actions: &[&str],
    seed: Option<&StepResult>,
) -> String {
    let replan = match seed {
        Some(failed) => format!(
            "\nA step of the current plan just underperformed and the plan must change:\n{}\n\
             Produce a replacement plan that avoids repeating what failed.\n",
            to_pretty(failed)
        ),
        None => String::new(),
    };

    format!(
        r#"You are autonomous agent {actor_id}. Create a strategic plan for the situation below.

Situation Analysis:
{analysis}

Your Goals:
{goals}

Actions that worked before:
{proven}
{replan}
Respond in JSON:
{{
    "primary_goal": "main objective",
    "strategy": "overall approach",
    "customer_segment": "segment this plan targets",
    "steps": [
        {{
            "step_number": 1,
            "action": "specific action",
            "reasoning": "why this action",
            "success_criteria": "how to measure success",
            "resources_needed": ["resource1"],
            "estimated_confidence": 0.0
        }}
    ],
    "contingencies": [
        {{"scenario": "if this happens", "alternative_action": "then do this", "reasoning": "because"}}
    ],
    "expected_outcome": "detailed expectation",
    "overall_confidence": 0.0
}}"#,
        actor_id = actor_id,
        analysis = to_pretty(analysis),
        goals = to_pretty(goals),
        proven = to_pretty(proven_actions),
        replan = replan,
    )
}

/// Draft a plan from the model, normalized and validated
///
/// A failed call or unusable draft yields [`Plan::fallback`]. Only an
/// invariant violation after normalization is an error.
pub async fn draft_plan(
    gateway: &ModelGateway,
    actor_id: &str,
    analysis: &SituationAnalysis,
    goals: &[Goal],
    memory: &MemoryBank,
    seed: Option<&StepResult>,
) -> Result<Plan, EngineError> {
    let proven: Vec<&str> = memory
        .successful(SUCCESSFUL_MEMORY_THRESHOLD)
        .into_iter()
        .map(|m| m.action_taken.as_str())
        .collect();

    let prompt = planning_prompt(actor_id, analysis, goals, &proven, seed);
    let draft = gateway
        .ask("plan", &prompt, CallOptions::PLANNING, PlanDraft::fallback())
        .await;

    let plan = Plan::from_draft(draft);
    plan.validate()?;
    info!(
        "Agent {} planned {} step(s), confidence {:.2}",
        actor_id,
        plan.steps.len(),
        plan.confidence
    );
    Ok(plan)
}

fn adaptation_prompt(
    actor_id: &str,
    plan: &Plan,
    result: &StepResult,
    previous: &[StepResult],
) -> String {
    format!(
        r#"You are autonomous agent {actor_id}. A step in your plan produced a weak result.

Current Plan:
{plan}

Step Result:
{result}

Earlier Results:
{previous}

Should the plan change before continuing? Respond in JSON:
{{
    "should_adapt": true,
    "confidence": 0.0,
    "reason": "detailed reasoning",
    "suggested_adaptations": ["adaptation1"]
}}"#,
        actor_id = actor_id,
        plan = to_pretty(plan),
        result = to_pretty(result),
        previous = to_pretty(previous),
    )
}

/// Ask whether a weak step should trigger replanning
///
/// Malformed answer: no adaptation. Failed call: adapt only below 0.3 success.
pub async fn decide_adaptation(
    gateway: &ModelGateway,
    actor_id: &str,
    plan: &Plan,
    result: &StepResult,
    previous: &[StepResult],
) -> AdaptationDecision {
    let prompt = adaptation_prompt(actor_id, plan, result, previous);
    match gateway
        .try_ask(&prompt, CallOptions::ADAPTATION, AdaptationDecision::unreadable())
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            warn!("Adaptation decision for {} failed: {}", actor_id, e);
            AdaptationDecision::on_call_failure(result.success)
        }
    }
}
