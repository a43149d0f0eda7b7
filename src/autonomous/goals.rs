//! Actor Goals
//!
//! Prioritized objectives an actor pursues:
//! - Validated at construction (priority 1..=10, non-empty kind)
//! - Success criteria are numeric thresholds or text labels
//! - After construction only priority and numeric thresholds change, and only upward
//!
//! Presets for the document and risk actors live at the bottom of this file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;

/// Highest allowed priority
pub const MAX_PRIORITY: u8 = 10;

/// Ceiling for automatically tightened confidence thresholds
pub const CONFIDENCE_CEILING: f64 = 0.95;

/// One success criterion value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criterion {
    Number(f64),
    Text(String),
}

impl Criterion {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Criterion::Number(n) => Some(*n),
            Criterion::Text(_) => None,
        }
    }
}

impl From<f64> for Criterion {
    fn from(n: f64) -> Self {
        Criterion::Number(n)
    }
}

impl From<&str> for Criterion {
    fn from(s: &str) -> Self {
        Criterion::Text(s.to_string())
    }
}

/// A prioritized objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub kind: String,
    pub description: String,
    pub success_criteria: BTreeMap<String, Criterion>,
    pub priority: u8,
    pub impact_metric: String,
    pub deadline: Option<DateTime<Utc>>,
}

impl Goal {
    /// Create a goal, rejecting an empty kind or an out-of-range priority
    pub fn new(kind: &str, description: &str, priority: u8) -> Result<Self, EngineError> {
        if kind.trim().is_empty() {
            return Err(EngineError::InvalidGoal("goal kind is empty".to_string()));
        }
        if !(1..=MAX_PRIORITY).contains(&priority) {
            return Err(EngineError::InvalidGoal(format!(
                "priority {} for '{}' outside 1..={}",
                priority, kind, MAX_PRIORITY
            )));
        }

        Ok(Self {
            kind: kind.to_string(),
            description: description.to_string(),
            success_criteria: BTreeMap::new(),
            priority,
            impact_metric: String::new(),
            deadline: None,
        })
    }

    pub fn with_criterion(mut self, key: &str, value: impl Into<Criterion>) -> Self {
        self.success_criteria.insert(key.to_string(), value.into());
        self
    }

    pub fn with_impact_metric(mut self, metric: &str) -> Self {
        self.impact_metric = metric.to_string();
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Numeric criterion by key
    pub fn threshold(&self, key: &str) -> Option<f64> {
        self.success_criteria.get(key).and_then(Criterion::as_f64)
    }

    /// Raise priority by one, capped. Returns whether it changed.
    pub fn escalate_priority(&mut self) -> bool {
        if self.priority >= MAX_PRIORITY {
            return false;
        }
        self.priority += 1;
        true
    }

    /// Add `step` to every numeric criterion whose key mentions "confidence"
    ///
    /// Values are capped at `ceiling` and never lowered. Returns the keys that moved.
    pub fn tighten_confidence(&mut self, step: f64, ceiling: f64) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in self.success_criteria.iter_mut() {
            if !key.to_lowercase().contains("confidence") {
                continue;
            }
            if let Criterion::Number(n) = value {
                let raised = (*n + step).min(ceiling);
                if raised > *n {
                    *n = raised;
                    changed.push(key.clone());
                }
            }
        }
        changed
    }

    /// Whether free text refers to this goal, by kind with `_` or spaces
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        let kind = self.kind.to_lowercase();
        text.contains(&kind) || text.contains(&kind.replace('_', " "))
    }

    pub fn format(&self) -> String {
        let criteria: Vec<String> = self
            .success_criteria
            .iter()
            .map(|(k, v)| match v {
                Criterion::Number(n) => format!("{}={}", k, n),
                Criterion::Text(s) => format!("{}={}", k, s),
            })
            .collect();
        format!("[P{}] {}: {} ({})", self.priority, self.kind, self.description, criteria.join(", "))
    }
}

/// First goal with the highest priority
pub fn primary_goal_index(goals: &[Goal]) -> Option<usize> {
    let top = goals.iter().map(|g| g.priority).max()?;
    goals.iter().position(|g| g.priority == top)
}

fn preset(
    kind: &str,
    description: &str,
    priority: u8,
    impact: &str,
    criteria: &[(&str, f64)],
) -> Result<Goal, EngineError> {
    let goal = Goal::new(kind, description, priority)?.with_impact_metric(impact);
    Ok(criteria
        .iter()
        .fold(goal, |g, (key, value)| g.with_criterion(key, *value)))
}

/// Goals for the document-processing actor
pub fn document_goals() -> Result<Vec<Goal>, EngineError> {
    Ok(vec![
        preset(
            "financial_inclusion",
            "Maximize banking access for underserved communities by accepting diverse document formats and qualities",
            10,
            "Number of previously unbanked individuals successfully onboarded",
            &[("rural_acceptance_rate", 0.95), ("processing_time", 900.0), ("language_support", 15.0)],
        )?,
        preset(
            "document_intelligence",
            "Process identity documents across regions, languages, and capture conditions",
            9,
            "Percentage of non-English documents successfully processed",
            &[("extraction_confidence", 0.85), ("min_fields", 4.0), ("vernacular_support", 0.90)],
        )?,
        preset(
            "accessibility_optimization",
            "Improve document processing for elderly, disabled, and low-literacy customers",
            8,
            "Senior citizen and differently-abled banking inclusion rate",
            &[("elderly_success_rate", 0.92), ("assisted_processing", 0.95)],
        )?,
        preset(
            "rural_specialization",
            "Excel at processing documents from rural areas with limited infrastructure",
            9,
            "Rural banking penetration improvement",
            &[("rural_document_quality", 0.85), ("mobile_photo_acceptance", 0.90)],
        )?,
    ])
}

/// Goals for the risk-assessment actor
pub fn risk_goals() -> Result<Vec<Goal>, EngineError> {
    Ok(vec![
        preset(
            "inclusive_risk_assessment",
            "Assess risk accurately while maximizing inclusion for underserved communities",
            10,
            "Number of previously excluded customers approved",
            &[("accuracy_confidence", 0.85), ("false_positive_rate", 0.05), ("rural_approval_rate", 0.78)],
        )?,
        preset(
            "regulatory_compliance",
            "Stay fully compliant while supporting inclusion mandates",
            10,
            "Compliance violations prevented while maintaining inclusion goals",
            &[("compliance_score", 0.95), ("audit_pass_rate", 1.0)],
        )?,
        preset(
            "alternative_credit_intelligence",
            "Assess creditworthiness using non-traditional data sources",
            9,
            "Percentage of informal economy participants successfully assessed",
            &[("alternative_data_accuracy", 0.88), ("informal_economy_coverage", 0.85)],
        )?,
        preset(
            "demographic_fairness",
            "Eliminate bias against vulnerable populations while maintaining risk accuracy",
            9,
            "Reduction in discriminatory rejections across protected categories",
            &[("gender_bias_score", 0.01), ("regional_bias_score", 0.02)],
        )?,
    ])
}
