//! Typed model responses
//!
//! Every prompt in the engine asks for one of these records. Each one is
//! `#[serde(default)]`, and `Default` holds neutral per-field values: empty text,
//! conservative numbers. A reply that omits a field never inherits failure text.
//!
//! The failure values live in explicit constructors (`fallback()`, `failed()`)
//! that callers pass to the gateway for the call-failed path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Clamp a score into [0, 1]; NaN becomes 0
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// ANALYZE output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SituationAnalysis {
    pub situation_type: String,
    pub key_challenges: Vec<String>,
    pub opportunities: Vec<String>,
    pub relevant_goals: Vec<String>,
    pub strategic_approach: String,
    pub confidence_level: f64,
    pub reasoning: String,
    pub learned_patterns: Vec<String>,
}

impl Default for SituationAnalysis {
    fn default() -> Self {
        Self {
            situation_type: "unknown".to_string(),
            key_challenges: vec![],
            opportunities: vec![],
            relevant_goals: vec![],
            strategic_approach: String::new(),
            confidence_level: 0.3,
            reasoning: String::new(),
            learned_patterns: vec![],
        }
    }
}

impl SituationAnalysis {
    /// Analysis used when the model could not be reached
    pub fn fallback() -> Self {
        Self {
            key_challenges: vec!["AI analysis unavailable".to_string()],
            relevant_goals: vec!["primary".to_string()],
            reasoning: "fallback".to_string(),
            ..Self::default()
        }
    }
}

/// One step as the model drafted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDraft {
    pub step_number: Option<u32>,
    pub action: String,
    pub reasoning: String,
    pub success_criteria: String,
    pub resources_needed: Vec<String>,
    pub estimated_confidence: f64,
}

impl Default for StepDraft {
    fn default() -> Self {
        Self {
            step_number: None,
            action: String::new(),
            reasoning: String::new(),
            success_criteria: String::new(),
            resources_needed: vec![],
            estimated_confidence: 0.5,
        }
    }
}

impl StepDraft {
    /// The single step of the fallback plan
    pub fn basic_processing() -> Self {
        Self {
            step_number: Some(1),
            action: "Use basic processing".to_string(),
            reasoning: "AI planning unavailable".to_string(),
            success_criteria: "Processing completes".to_string(),
            resources_needed: vec![],
            estimated_confidence: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContingencyDraft {
    pub scenario: String,
    pub alternative_action: String,
    pub reasoning: String,
}

/// PLAN output, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanDraft {
    pub primary_goal: String,
    pub strategy: String,
    pub customer_segment: String,
    pub steps: Vec<StepDraft>,
    pub contingencies: Vec<ContingencyDraft>,
    pub expected_outcome: String,
    pub overall_confidence: f64,
}

impl Default for PlanDraft {
    fn default() -> Self {
        Self {
            primary_goal: String::new(),
            strategy: String::new(),
            customer_segment: String::new(),
            steps: vec![],
            contingencies: vec![],
            expected_outcome: String::new(),
            overall_confidence: 0.4,
        }
    }
}

impl PlanDraft {
    /// Single-step draft used when planning is unavailable
    pub fn fallback() -> Self {
        Self {
            primary_goal: "Execute fallback procedure".to_string(),
            strategy: "Basic fallback processing".to_string(),
            customer_segment: "General".to_string(),
            steps: vec![StepDraft::basic_processing()],
            expected_outcome: "Basic processing completion".to_string(),
            ..Self::default()
        }
    }
}

/// Answer to "should the in-flight plan change?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationDecision {
    pub should_adapt: bool,
    pub confidence: f64,
    pub reason: String,
    pub suggested_adaptations: Vec<String>,
}

impl Default for AdaptationDecision {
    fn default() -> Self {
        Self {
            should_adapt: false,
            confidence: 0.5,
            reason: String::new(),
            suggested_adaptations: vec![],
        }
    }
}

impl AdaptationDecision {
    /// Decision used when the answer could not be read
    pub fn unreadable() -> Self {
        Self {
            reason: "Adaptation decision failed".to_string(),
            ..Self::default()
        }
    }

    /// Decision used when the model could not be reached at all
    pub fn on_call_failure(step_success: f64) -> Self {
        Self {
            should_adapt: step_success < 0.3,
            confidence: 0.6,
            reason: "Low success rate detected".to_string(),
            suggested_adaptations: vec![],
        }
    }
}

/// REFLECT output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningInsight {
    pub success_factors: Vec<String>,
    pub failure_factors: Vec<String>,
    pub key_learnings: Vec<String>,
    pub pattern_recognition: Vec<String>,
    pub improvement_strategies: Vec<String>,
    pub confidence_in_learning: f64,
    pub behavioral_adaptations: Vec<String>,
    pub future_goal_adjustments: Vec<String>,
}

impl Default for LearningInsight {
    fn default() -> Self {
        Self {
            success_factors: vec![],
            failure_factors: vec![],
            key_learnings: vec![],
            pattern_recognition: vec![],
            improvement_strategies: vec![],
            confidence_in_learning: 0.1,
            behavioral_adaptations: vec![],
            future_goal_adjustments: vec![],
        }
    }
}

impl LearningInsight {
    /// Insight recorded when reflection could not run
    pub fn failed() -> Self {
        Self {
            key_learnings: vec!["Reflection process failed".to_string()],
            ..Self::default()
        }
    }

    /// First key learning, or a placeholder
    pub fn headline(&self) -> &str {
        self.key_learnings
            .first()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("No specific learning")
    }
}

/// One actor's negotiating position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationStrategy {
    pub negotiation_position: String,
    pub must_have_requirements: Vec<String>,
    pub compromise_areas: Vec<String>,
    pub value_proposition: String,
    pub batna: String,
    pub opening_offer: String,
    pub concession_strategy: String,
    pub success_metrics: Vec<String>,
    /// Coordination mode this actor would prefer, if it named one
    pub preferred_mode: Option<String>,
}

impl Default for NegotiationStrategy {
    fn default() -> Self {
        Self {
            negotiation_position: String::new(),
            must_have_requirements: vec![],
            compromise_areas: vec![],
            value_proposition: String::new(),
            batna: String::new(),
            opening_offer: String::new(),
            concession_strategy: String::new(),
            success_metrics: vec![],
            preferred_mode: None,
        }
    }
}

impl NegotiationStrategy {
    /// Position taken when the model could not be reached
    pub fn fallback() -> Self {
        Self {
            negotiation_position: "Cooperative approach".to_string(),
            opening_offer: "Work together on shared goals".to_string(),
            concession_strategy: "Collaborative".to_string(),
            success_metrics: vec!["mutual_benefit".to_string()],
            ..Self::default()
        }
    }
}

/// How the two actors are scheduled against one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum CoordinationMode {
    #[default]
    Sequential,
    Parallel,
    Negotiated,
}

impl From<String> for CoordinationMode {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl CoordinationMode {
    /// Unknown names (including "competitive") run sequentially
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Self::Parallel,
            "negotiated" | "collaborative" => Self::Negotiated,
            _ => Self::Sequential,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Negotiated => "negotiated",
        }
    }
}

/// The mode the model picked from both actors' preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationDecision {
    pub strategy: CoordinationMode,
    pub reasoning: String,
    pub expected_benefits: Vec<String>,
    pub potential_risks: Vec<String>,
    pub coordination_details: Map<String, Value>,
}

impl Default for CoordinationDecision {
    fn default() -> Self {
        Self {
            strategy: CoordinationMode::Sequential,
            reasoning: String::new(),
            expected_benefits: vec![],
            potential_risks: vec![],
            coordination_details: Map::new(),
        }
    }
}

impl CoordinationDecision {
    /// Sequential mode, used when mode negotiation fails
    pub fn fallback() -> Self {
        let mut details = Map::new();
        details.insert("information_sharing".to_string(), Value::from("basic"));
        Self {
            reasoning: "Default coordination due to negotiation failure".to_string(),
            coordination_details: details,
            ..Self::default()
        }
    }
}

/// Final application status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum FinalStatus {
    Approved,
    Rejected,
    #[default]
    ManualReview,
}

impl From<String> for FinalStatus {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::ManualReview,
        }
    }
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::ManualReview => "manual_review",
        }
    }
}

/// Per-actor autonomy scores reported by synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyQuality {
    pub document_agent_autonomy: f64,
    pub risk_agent_autonomy: f64,
    pub coordination_autonomy: f64,
}

impl Default for AutonomyQuality {
    fn default() -> Self {
        Self {
            document_agent_autonomy: 0.5,
            risk_agent_autonomy: 0.5,
            coordination_autonomy: 0.3,
        }
    }
}

/// SYNTHESIS output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisVerdict {
    pub final_status: FinalStatus,
    pub synthesis_confidence: f64,
    pub synthesis_reasoning: String,
    pub agent_consensus: String,
    pub key_factors: Vec<String>,
    pub autonomy_quality: AutonomyQuality,
    pub next_steps: Vec<String>,
}

impl Default for SynthesisVerdict {
    fn default() -> Self {
        Self {
            final_status: FinalStatus::ManualReview,
            synthesis_confidence: 0.3,
            synthesis_reasoning: String::new(),
            agent_consensus: String::new(),
            key_factors: vec![],
            autonomy_quality: AutonomyQuality::default(),
            next_steps: vec![],
        }
    }
}

impl SynthesisVerdict {
    /// Conservative verdict used when synthesis fails
    pub fn failed() -> Self {
        Self {
            synthesis_reasoning: "Autonomous synthesis failed, requiring human review".to_string(),
            agent_consensus: "disagreement".to_string(),
            ..Self::default()
        }
    }

    /// Clamp every score into [0, 1]
    pub fn normalized(mut self) -> Self {
        self.synthesis_confidence = clamp_unit(self.synthesis_confidence);
        self.autonomy_quality.document_agent_autonomy =
            clamp_unit(self.autonomy_quality.document_agent_autonomy);
        self.autonomy_quality.risk_agent_autonomy =
            clamp_unit(self.autonomy_quality.risk_agent_autonomy);
        self.autonomy_quality.coordination_autonomy =
            clamp_unit(self.autonomy_quality.coordination_autonomy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::json_repair::recover_as;

    #[test]
    fn test_empty_object_is_conservative() {
        let analysis: SituationAnalysis = serde_json::from_str("{}").unwrap();
        assert_eq!(analysis, SituationAnalysis::default());
        assert_eq!(analysis.situation_type, "unknown");
        assert_eq!(analysis.confidence_level, 0.3);
        assert!(analysis.key_challenges.is_empty());

        let plan: PlanDraft = serde_json::from_str("{}").unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.overall_confidence, 0.4);

        let verdict: SynthesisVerdict = serde_json::from_str("{}").unwrap();
        assert_eq!(verdict.final_status, FinalStatus::ManualReview);
        assert_eq!(verdict.synthesis_confidence, 0.3);
    }

    #[test]
    fn test_fallbacks_carry_failure_text() {
        assert_eq!(SituationAnalysis::fallback().reasoning, "fallback");
        assert_eq!(PlanDraft::fallback().steps[0].action, "Use basic processing");
        assert_eq!(AdaptationDecision::unreadable().reason, "Adaptation decision failed");
        assert!(!AdaptationDecision::unreadable().should_adapt);
        assert_eq!(NegotiationStrategy::fallback().negotiation_position, "Cooperative approach");
        assert_eq!(CoordinationDecision::fallback().strategy, CoordinationMode::Sequential);
        let verdict = SynthesisVerdict::failed();
        assert_eq!(verdict.final_status, FinalStatus::ManualReview);
        assert_eq!(verdict.synthesis_confidence, 0.3);
    }

    #[test]
    fn test_partial_reflection_has_no_failure_text() {
        let insight: LearningInsight = recover_as(
            r#"{"success_factors": ["clear scan"], "confidence_in_learning": 0.9}"#,
            LearningInsight::failed(),
        );
        assert_eq!(insight.success_factors, vec!["clear scan".to_string()]);
        assert!(insight.key_learnings.is_empty());
        assert_eq!(insight.headline(), "No specific learning");
        assert_eq!(insight.confidence_in_learning, 0.9);
    }

    #[test]
    fn test_partial_verdict_has_no_failure_text() {
        let v: SynthesisVerdict = recover_as(
            r#"{"final_status": "approved", "synthesis_confidence": 0.88}"#,
            SynthesisVerdict::failed(),
        );
        assert_eq!(v.final_status, FinalStatus::Approved);
        assert!(v.synthesis_reasoning.is_empty());
        assert!(v.agent_consensus.is_empty());
    }

    #[test]
    fn test_partial_response_keeps_defaults() {
        let decision: AdaptationDecision = serde_json::from_str(r#"{"should_adapt": true}"#).unwrap();
        assert!(decision.should_adapt);
        assert_eq!(decision.confidence, 0.5);
    }

    #[test]
    fn test_adaptation_on_call_failure() {
        assert!(AdaptationDecision::on_call_failure(0.2).should_adapt);
        assert!(!AdaptationDecision::on_call_failure(0.4).should_adapt);
    }

    #[test]
    fn test_coordination_mode_parsing() {
        let d: CoordinationDecision = serde_json::from_str(r#"{"strategy": "parallel"}"#).unwrap();
        assert_eq!(d.strategy, CoordinationMode::Parallel);

        let d: CoordinationDecision = serde_json::from_str(r#"{"strategy": "competitive"}"#).unwrap();
        assert_eq!(d.strategy, CoordinationMode::Sequential);

        assert_eq!(CoordinationMode::parse(" Negotiated "), CoordinationMode::Negotiated);
        assert_eq!(serde_json::to_value(CoordinationMode::Parallel).unwrap(), "parallel");
    }

    #[test]
    fn test_unknown_final_status_is_manual_review() {
        let v: SynthesisVerdict =
            recover_as(r#"{"final_status": "maybe", "synthesis_confidence": 0.9}"#, SynthesisVerdict::failed());
        assert_eq!(v.final_status, FinalStatus::ManualReview);

        let v: SynthesisVerdict = recover_as(r#"{"final_status": "Approved"}"#, SynthesisVerdict::failed());
        assert_eq!(v.final_status, FinalStatus::Approved);
        assert_eq!(serde_json::to_value(FinalStatus::ManualReview).unwrap(), "manual_review");
    }

    #[test]
    fn test_verdict_normalized() {
        let v = SynthesisVerdict {
            synthesis_confidence: 1.7,
            ..Default::default()
        }
        .normalized();
        assert_eq!(v.synthesis_confidence, 1.0);
    }

    #[test]
    fn test_learning_headline() {
        assert_eq!(LearningInsight::failed().headline(), "Reflection process failed");
        assert_eq!(LearningInsight::default().headline(), "No specific learning");
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-1.0), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }
}
