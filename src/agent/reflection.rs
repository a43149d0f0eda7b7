//! Reflection & Behavioral Adaptation
//!
//! After each execution the actor:
//! - Asks the model what it learned ([`LearningInsight`])
//! - Records exactly one memory of the episode
//! - Escalates goal priorities the insight asks for
//! - Tightens confidence thresholds after a strong streak
//!
//! Adaptation is monotonic: nothing here ever lowers a priority or a threshold.

use std::collections::BTreeSet;
use tracing::{debug, info};

use super::engine::ExecutionResult;
use super::gateway::{CallOptions, ModelGateway};
use super::planner::Plan;
use super::records::LearningInsight;
use crate::autonomous::goals::{primary_goal_index, Goal, CONFIDENCE_CEILING};
use crate::autonomous::memory::{MemoryBank, MemoryRecord};

/// Words that, next to "priority", ask for escalation
const ESCALATION_WORDS: [&str; 5] = ["high", "raise", "increase", "escalat", "boost"];

/// Reflection configuration
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    /// Memories shown to the reflection prompt and averaged for tightening
    pub memory_window: usize,
    /// Mean recent success above which thresholds tighten
    pub tighten_threshold: f64,
    pub tighten_step: f64,
    pub confidence_ceiling: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            memory_window: 3,
            tighten_threshold: 0.8,
            tighten_step: 0.05,
            confidence_ceiling: CONFIDENCE_CEILING,
        }
    }
}

/// What one ADAPT_BEHAVIOR pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptationReport {
    /// Goal kinds whose priority rose
    pub escalated: Vec<String>,
    /// (goal kind, criterion key) pairs that tightened
    pub tightened: Vec<(String, String)>,
}

impl AdaptationReport {
    pub fn is_empty(&self) -> bool {
        self.escalated.is_empty() && self.tightened.is_empty()
    }
}

/// Whether a goal adjustment asks for higher priority
pub fn requests_escalation(adjustment: &str) -> bool {
    let lower = adjustment.to_lowercase();
    lower.contains("priority") && ESCALATION_WORDS.iter().any(|w| lower.contains(w))
}

/// Reflection engine
#[derive(Debug, Clone, Default)]
pub struct ReflectionEngine {
    config: ReflectionConfig,
}

impl ReflectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReflectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    /// Ask the model to reflect on an execution
    pub async fn reflect(
        &self,
        gateway: &ModelGateway,
        actor_id: &str,
        plan: &Plan,
        execution: &ExecutionResult,
        memory: &MemoryBank,
    ) -> LearningInsight {
        let recent = memory.recent(self.config.memory_window);
        let prompt = format!(
            r#"You are autonomous agent {actor_id}. Reflect on the plan you just executed.

Executed Plan:
{plan}

Execution Result:
{execution}

Recent Experiences:
{recent}

What worked, what failed, and what should change? Respond in JSON:
{{
    "success_factors": ["factor1"],
    "failure_factors": ["factor1"],
    "key_learnings": ["learning1"],
    "pattern_recognition": ["pattern1"],
    "improvement_strategies": ["strategy1"],
    "confidence_in_learning": 0.0,
    "behavioral_adaptations": ["adaptation1"],
    "future_goal_adjustments": ["adjustment1"]
}}"#,
            actor_id = actor_id,
            plan = serde_json::to_string_pretty(plan).unwrap_or_default(),
            execution = serde_json::to_string_pretty(&execution.summary()).unwrap_or_default(),
            recent = serde_json::to_string_pretty(&recent).unwrap_or_default(),
        );

        gateway
            .ask("reflection", &prompt, CallOptions::REFLECTION, LearningInsight::failed())
            .await
    }

    /// The single memory record an execution leaves behind
    pub fn memory_from_outcome(
        &self,
        plan: &Plan,
        execution: &ExecutionResult,
        insight: &LearningInsight,
    ) -> MemoryRecord {
        let segment = if plan.target_segment.trim().is_empty() {
            "General"
        } else {
            plan.target_segment.as_str()
        };
        let success = execution.overall_success;

        MemoryRecord::new(
            segment,
            &format!("Plan: {}", plan.goal_summary),
            &format!("Strategy: {}", plan.lead_action()),
            success,
        )
        .with_insight(insight.headline())
        .with_impact_note(&format!(
            "Learning improved decision-making capability by {:.1}%",
            success * 100.0
        ))
    }

    /// Apply priority escalation and threshold tightening in place
    pub fn adapt_goals(
        &self,
        goals: &mut [Goal],
        insight: &LearningInsight,
        memory: &MemoryBank,
    ) -> AdaptationReport {
        let mut report = AdaptationReport::default();

        let mut targets: BTreeSet<usize> = BTreeSet::new();
        for adjustment in insight
            .future_goal_adjustments
            .iter()
            .filter(|a| requests_escalation(a))
        {
            let named: Vec<usize> = goals
                .iter()
                .enumerate()
                .filter(|(_, g)| g.is_mentioned_in(adjustment))
                .map(|(i, _)| i)
                .collect();

            if named.is_empty() {
                targets.extend(primary_goal_index(goals));
            } else {
                targets.extend(named);
            }
        }

        for i in targets {
            if goals[i].escalate_priority() {
                report.escalated.push(goals[i].kind.clone());
            }
        }

        if let Some(mean) = memory.mean_recent_success(self.config.memory_window) {
            if mean > self.config.tighten_threshold {
                for goal in goals.iter_mut() {
                    for key in goal.tighten_confidence(self.config.tighten_step, self.config.confidence_ceiling) {
                        report.tightened.push((goal.kind.clone(), key));
                    }
                }
            } else {
                debug!("Recent success {:.2} below tightening threshold", mean);
            }
        }

        if !report.is_empty() {
            info!(
                "Adapted goals: escalated {:?}, tightened {:?}",
                report.escalated, report.tightened
            );
        }
        report
    }
}
