//! Risk-assessment steps
//!
//! - `assess_risk`: choose a risk model, run a model-driven analysis, grade it against goals
//! - `compliance_check`, `choose_model`: bookkeeping steps
//! - anything else: generic action
//!
//! When the analysis call fails outright, an income-banded conservative
//! assessment is used and the recommendation is always manual review.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::gateway::CallOptions;
use super::handler::{StepContext, StepHandler, StepResult};
use super::records::clamp_unit;

const DEFAULT_ACCURACY_TARGET: f64 = 0.85;
const DEFAULT_FALSE_POSITIVE_CEILING: f64 = 0.05;
const DEFAULT_COMPLIANCE_TARGET: f64 = 0.95;

/// One entry of the risk-model catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskModelProfile {
    pub name: String,
    pub description: String,
    pub false_positive_rate: f64,
    pub accuracy: f64,
    pub speed: String,
    pub inclusion_focus: String,
}

impl RiskModelProfile {
    fn new(name: &str, description: &str, fpr: f64, accuracy: f64, speed: &str, focus: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            false_positive_rate: fpr,
            accuracy,
            speed: speed.to_string(),
            inclusion_focus: focus.to_string(),
        }
    }
}

/// Built-in catalogue
pub fn default_risk_models() -> Vec<RiskModelProfile> {
    vec![
        RiskModelProfile::new(
            "inclusion_balanced",
            "Balanced model optimizing for both risk accuracy and financial inclusion",
            0.03, 0.92, "medium",
            "Maximizes approval rates for legitimate underserved customers",
        ),
        RiskModelProfile::new(
            "rural_specialized",
            "Specialized for agricultural and rural communities with seasonal income",
            0.05, 0.88, "medium",
            "Understands agricultural cycles and rural livelihood patterns",
        ),
        RiskModelProfile::new(
            "msme_focused",
            "Optimized for micro, small, and medium enterprises lacking formal records",
            0.04, 0.89, "fast",
            "Evaluates business viability using alternative indicators",
        ),
        RiskModelProfile::new(
            "women_centric",
            "Addresses challenges faced by women entrepreneurs and customers",
            0.03, 0.91, "medium",
            "Considers women's economic participation patterns",
        ),
        RiskModelProfile::new(
            "migrant_worker_model",
            "Designed for interstate migrant workers with complex residence patterns",
            0.06, 0.85, "fast",
            "Handles multiple state addresses and irregular employment patterns",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskModelChoice {
    pub model: String,
    pub reasoning: String,
    pub expected_accuracy: f64,
    pub expected_false_positive_rate: f64,
    pub confidence_in_choice: f64,
    pub backup_model: Option<String>,
    pub risk_factors_to_focus: Vec<String>,
}

impl Default for RiskModelChoice {
    fn default() -> Self {
        Self {
            model: "inclusion_balanced".to_string(),
            reasoning: String::new(),
            expected_accuracy: 0.92,
            expected_false_positive_rate: 0.03,
            confidence_in_choice: 0.5,
            backup_model: None,
            risk_factors_to_focus: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskScores {
    pub credit_risk_score: Option<f64>,
    pub aml_risk_score: Option<f64>,
    pub overall_risk_score: f64,
    pub risk_category: String,
    pub key_risk_factors: Vec<String>,
    pub risk_mitigation_factors: Vec<String>,
}

impl Default for RiskScores {
    fn default() -> Self {
        Self {
            credit_risk_score: None,
            aml_risk_score: None,
            overall_risk_score: 50.0,
            risk_category: "Medium".to_string(),
            key_risk_factors: vec![],
            risk_mitigation_factors: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceAssessment {
    pub kyc_status: String,
    pub rbi_compliance: String,
    pub pmla_compliance: String,
    pub compliance_flags: Vec<String>,
}

impl Default for ComplianceAssessment {
    fn default() -> Self {
        Self {
            kyc_status: "Requires_Review".to_string(),
            rbi_compliance: "Requires_Action".to_string(),
            pmla_compliance: "Additional_Review".to_string(),
            compliance_flags: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskDecision {
    /// Approve / Reject / Manual_Review / Request_Info
    pub recommendation: String,
    pub confidence: f64,
    pub reasoning: String,
    pub next_actions: Vec<String>,
}

impl Default for RiskDecision {
    fn default() -> Self {
        Self {
            recommendation: "Manual_Review".to_string(),
            confidence: 0.4,
            reasoning: String::new(),
            next_actions: vec![],
        }
    }
}

/// Self-reported quality of the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSelfAssessment {
    pub accuracy_confidence: f64,
    pub false_positive_likelihood: f64,
    pub compliance_confidence: f64,
}

impl Default for RiskSelfAssessment {
    fn default() -> Self {
        Self {
            accuracy_confidence: 0.5,
            false_positive_likelihood: 0.1,
            compliance_confidence: 0.5,
        }
    }
}

/// Model-driven risk analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskAnalysis {
    pub risk_assessment: RiskScores,
    pub compliance_assessment: ComplianceAssessment,
    pub autonomous_decision: RiskDecision,
    pub goal_achievement: RiskSelfAssessment,
}

impl RiskAnalysis {
    /// Conservative assessment used when the analysis call fails
    pub fn income_fallback(income: f64) -> Self {
        let score = if income > 5_000_000.0 {
            30.0
        } else if income > 1_000_000.0 {
            45.0
        } else {
            60.0
        };

        Self {
            risk_assessment: RiskScores {
                overall_risk_score: score,
                ..Default::default()
            },
            compliance_assessment: ComplianceAssessment::default(),
            autonomous_decision: RiskDecision {
                reasoning: "AI analysis failed, using conservative fallback".to_string(),
                ..Default::default()
            },
            goal_achievement: RiskSelfAssessment {
                accuracy_confidence: 0.4,
                false_positive_likelihood: 0.3,
                compliance_confidence: 0.5,
            },
        }
    }

    /// Next step implied by the decision
    pub fn recommended_action(&self) -> &'static str {
        let decision = &self.autonomous_decision;
        match decision.recommendation.trim().to_lowercase().as_str() {
            "approve" if decision.confidence > 0.8 => "proceed_to_account_creation",
            "reject" => "reject_application",
            _ => "escalate_for_manual_review",
        }
    }
}

/// Grade an analysis against the inclusive-risk and compliance goals
pub fn evaluate_risk_goals(analysis: &RiskAnalysis, ctx: &StepContext<'_>) -> Map<String, Value> {
    let mut grades = Map::new();
    let report = &analysis.goal_achievement;

    if let Some(goal) = ctx.goal("inclusive_risk_assessment") {
        let accuracy_target = goal
            .threshold("accuracy_confidence")
            .unwrap_or(DEFAULT_ACCURACY_TARGET);
        let fp_ceiling = goal
            .threshold("false_positive_rate")
            .unwrap_or(DEFAULT_FALSE_POSITIVE_CEILING);
        let accuracy_met = report.accuracy_confidence >= accuracy_target;
        let fp_met = report.false_positive_likelihood <= fp_ceiling;
        grades.insert(
            goal.kind.clone(),
            json!({
                "achieved": accuracy_met && fp_met,
                "accuracy_score": report.accuracy_confidence,
                "false_positive_score": report.false_positive_likelihood,
            }),
        );
    }

    if let Some(goal) = ctx.goal("regulatory_compliance") {
        let target = goal
            .threshold("compliance_score")
            .unwrap_or(DEFAULT_COMPLIANCE_TARGET);
        grades.insert(
            goal.kind.clone(),
            json!({
                "achieved": report.compliance_confidence >= target,
                "compliance_score": report.compliance_confidence,
            }),
        );
    }

    grades
}

/// Step handler for the risk actor
pub struct RiskStepHandler {
    models: Vec<RiskModelProfile>,
    fallback_model: String,
}

impl Default for RiskStepHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskStepHandler {
    pub fn new() -> Self {
        Self {
            models: default_risk_models(),
            fallback_model: "inclusion_balanced".to_string(),
        }
    }

    pub fn with_models(mut self, models: Vec<RiskModelProfile>, fallback: &str) -> Self {
        self.models = models;
        self.fallback_model = fallback.to_string();
        self
    }

    fn customer_data(ctx: &StepContext<'_>) -> Map<String, Value> {
        let mut data = ctx
            .input
            .get("customer_data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(|| ctx.input.data.clone());
        data.remove("document_result");
        data.remove("negotiation_outcome");
        data
    }

    fn income(ctx: &StepContext<'_>) -> f64 {
        Self::customer_data(ctx)
            .get("income")
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().replace(',', "").parse().ok(),
                _ => None,
            })
            .unwrap_or(0.0)
    }

    fn goal_summaries(ctx: &StepContext<'_>) -> Value {
        Value::Array(
            ctx.goals
                .iter()
                .map(|g| json!({"goal_type": g.kind, "description": g.description}))
                .collect(),
        )
    }

    async fn choose_model(&self, ctx: &StepContext<'_>, document_result: &Value) -> RiskModelChoice {
        let execution = &document_result["execution"];
        let past: Vec<String> = ctx
            .memory
            .recent(5)
            .iter()
            .map(|m| format!("{} -> {:.2}", m.action_taken, m.success_score))
            .collect();

        let prompt = format!(
            "You are an autonomous risk agent choosing the best risk model.\n\n\
             Customer Profile:\n{}\n\n\
             Document Assessment:\n- Overall Success: {:.2}\n- Has Results: {}\n\n\
             Available Risk Models:\n{}\n\n\
             Your Goals:\n{}\n\n\
             Past Model Performance:\n{}\n\n\
             Respond in JSON:\n{{\"model\": \"model_name\", \"reasoning\": \"detailed reasoning\", \
             \"expected_accuracy\": 0.0, \"expected_false_positive_rate\": 0.0, \
             \"confidence_in_choice\": 0.0, \"backup_model\": \"alternative_model\", \
             \"risk_factors_to_focus\": [\"factor1\"]}}",
            Value::Object(Self::customer_data(ctx)),
            execution["overall_success"].as_f64().unwrap_or(0.0),
            execution["step_results"].as_array().is_some_and(|a| !a.is_empty()),
            serde_json::to_string_pretty(&self.models).unwrap_or_default(),
            Self::goal_summaries(ctx),
            if past.is_empty() { "No prior experience".to_string() } else { past.join("\n") },
        );

        let fallback = RiskModelChoice {
            model: self.fallback_model.clone(),
            reasoning: format!("AI model selection failed, using {}", self.fallback_model),
            ..Default::default()
        };
        let mut choice = ctx
            .gateway
            .ask("risk model", &prompt, CallOptions::STEP_CHOICE, fallback)
            .await;

        if !self.models.iter().any(|m| m.name == choice.model) {
            warn!("Unknown risk model '{}', using {}", choice.model, self.fallback_model);
            choice.model = self.fallback_model.clone();
        }
        choice
    }

    async fn analyze(&self, ctx: &StepContext<'_>, document_result: &Value, choice: &RiskModelChoice) -> RiskAnalysis {
        let lessons: Vec<&str> = ctx.memory.recent(3).iter().map(|m| m.insight.as_str()).collect();
        let prompt = format!(
            "You are an autonomous risk agent assessing an application.\n\n\
             Risk Model Chosen: {}\nModel Reasoning: {}\n\n\
             Customer Data:\n{}\n\n\
             Document Analysis:\n{}\n\n\
             Your Goals:\n{}\n\n\
             Learning from Past Cases:\n{}\n\n\
             Weigh credit risk, AML indicators, KYC completeness, and your goal of minimizing \
             false positives while maintaining accuracy.\n\n\
             Respond in JSON:\n{{\n\
             \"risk_assessment\": {{\"credit_risk_score\": 1, \"aml_risk_score\": 1, \"overall_risk_score\": 1, \
             \"risk_category\": \"Low/Medium/High/Critical\", \"key_risk_factors\": [], \"risk_mitigation_factors\": []}},\n\
             \"compliance_assessment\": {{\"kyc_status\": \"Complete/Incomplete/Requires_Review\", \
             \"rbi_compliance\": \"Compliant/Non_Compliant/Requires_Action\", \
             \"pmla_compliance\": \"Met/Not_Met/Additional_Review\", \"compliance_flags\": []}},\n\
             \"autonomous_decision\": {{\"recommendation\": \"Approve/Reject/Manual_Review/Request_Info\", \
             \"confidence\": 0.0, \"reasoning\": \"...\", \"next_actions\": []}},\n\
             \"goal_achievement\": {{\"accuracy_confidence\": 0.0, \"false_positive_likelihood\": 0.0, \
             \"compliance_confidence\": 0.0}}\n}}",
            choice.model,
            choice.reasoning,
            Value::Object(Self::customer_data(ctx)),
            document_result,
            Self::goal_summaries(ctx),
            if lessons.is_empty() { "No prior learning".to_string() } else { lessons.join("\n") },
        );

        match ctx
            .gateway
            .try_ask(&prompt, CallOptions::STEP_ANALYSIS, RiskAnalysis::default())
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Risk analysis for {} failed, using income fallback: {}", ctx.actor_id, e);
                RiskAnalysis::income_fallback(Self::income(ctx))
            }
        }
    }

    async fn assess_risk(&self, ctx: &StepContext<'_>) -> StepResult {
        let document_result = ctx.input.get("document_result").cloned().unwrap_or(Value::Null);
        let choice = self.choose_model(ctx, &document_result).await;
        let analysis = self.analyze(ctx, &document_result, &choice).await;
        let grades = evaluate_risk_goals(&analysis, ctx);
        let accuracy = clamp_unit(analysis.goal_achievement.accuracy_confidence);

        info!(
            "Agent {} assessed risk with {}: score {:.0}, {}",
            ctx.actor_id,
            choice.model,
            analysis.risk_assessment.overall_risk_score,
            analysis.autonomous_decision.recommendation
        );

        StepResult::new(
            ctx.step,
            accuracy,
            &format!("Risk assessment completed using {} approach", choice.model),
        )
        .with_info("model_used", choice.model.as_str())
        .with_info("risk_analysis", serde_json::to_value(&analysis).unwrap_or(Value::Null))
        .with_info("goal_evaluation", Value::Object(grades))
        .with_info("model_effectiveness", accuracy)
        .with_hint(analysis.recommended_action())
    }
}

#[async_trait]
impl StepHandler for RiskStepHandler {
    fn kind(&self) -> &'static str {
        "risk"
    }

    async fn execute_step(&self, ctx: &StepContext<'_>) -> StepResult {
        let step = ctx.step;
        if step.action_mentions("assess_risk") {
            self.assess_risk(ctx).await
        } else if step.action_mentions("compliance_check") {
            StepResult::new(step, 0.92, "Compliance check completed").with_hint("proceed_if_compliant")
        } else if step.action_mentions("choose_model") {
            StepResult::new(step, 0.89, "Risk model selection completed")
                .with_hint("proceed_with_selected_model")
        } else {
            StepResult::new(step, 0.75, "General autonomous action completed")
        }
    }
}
