//! Document-processing steps
//!
//! Step actions are matched by substring:
//! - `analyze_document`: pick a processing strategy, run extraction, score against goals
//! - `choose_strategy`, `extract_information`, `quality_assessment`: bookkeeping steps
//! - anything else: generic action
//!
//! The strategy catalogue is data handed to the handler, not control flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::gateway::CallOptions;
use super::handler::{StepContext, StepHandler, StepResult};
use crate::providers::{mean_confidence, DocumentExtractor, ExtractedFields};

/// Fields a useful extraction should yield
pub const DEFAULT_MIN_FIELDS: usize = 4;

/// Extraction confidence target (fraction) when no goal overrides it
pub const DEFAULT_CONFIDENCE_TARGET: f64 = 0.85;

/// One entry of the processing-strategy catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStrategy {
    pub name: String,
    pub description: String,
    pub accuracy: f64,
    pub cost: String,
    pub speed: String,
    pub inclusion_focus: String,
}

impl ProcessingStrategy {
    fn new(name: &str, description: &str, accuracy: f64, cost: &str, speed: &str, focus: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            accuracy,
            cost: cost.to_string(),
            speed: speed.to_string(),
            inclusion_focus: focus.to_string(),
        }
    }
}

/// Built-in catalogue
pub fn default_strategies() -> Vec<ProcessingStrategy> {
    vec![
        ProcessingStrategy::new(
            "premium_inclusion",
            "High-accuracy processing for premium customers while maintaining inclusion",
            0.98, "high", "medium",
            "Maintain quality while serving affluent customers",
        ),
        ProcessingStrategy::new(
            "rural_optimized",
            "Optimized for rural customers with poor document quality",
            0.85, "medium", "fast",
            "Maximize acceptance of low-quality rural documents",
        ),
        ProcessingStrategy::new(
            "vernacular_specialist",
            "Specialized processing for regional language documents",
            0.88, "medium", "medium",
            "Support customers comfortable only in local languages",
        ),
        ProcessingStrategy::new(
            "assisted_processing",
            "Enhanced processing for elderly and differently-abled customers",
            0.92, "high", "slow",
            "Ensure accessibility for all demographics",
        ),
        ProcessingStrategy::new(
            "migrant_worker_special",
            "Rapid processing for migrant workers with urgent banking needs",
            0.82, "low", "very_fast",
            "Quick banking access for migrant workers",
        ),
    ]
}

/// Model's strategy pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyChoice {
    pub strategy: String,
    pub reasoning: String,
    pub expected_accuracy: f64,
    pub confidence_in_choice: f64,
}

impl Default for StrategyChoice {
    fn default() -> Self {
        Self {
            strategy: "rural_optimized".to_string(),
            reasoning: String::new(),
            expected_accuracy: 0.85,
            confidence_in_choice: 0.4,
        }
    }
}

/// How an extraction measured against the document goals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalAchievement {
    pub achieved: bool,
    pub score: f64,
    pub confidence_met: bool,
    pub fields_met: bool,
    pub reason: String,
}

/// Evaluate mean confidence (0-100) and field count against targets
pub fn evaluate_extraction(confidence: f64, fields: usize, confidence_target: f64, min_fields: usize) -> GoalAchievement {
    let min_fields = min_fields.max(1);
    let confidence_met = confidence / 100.0 >= confidence_target;
    let fields_met = fields >= min_fields;
    let score = (confidence / 100.0 / confidence_target.max(f64::EPSILON)) * 0.6
        + (fields as f64 / min_fields as f64) * 0.4;

    GoalAchievement {
        achieved: confidence_met && fields_met,
        score: score.min(1.0),
        confidence_met,
        fields_met,
        reason: format!(
            "Confidence: {:.1}% (target: {:.0}%), Fields: {} (target: {})",
            confidence,
            confidence_target * 100.0,
            fields,
            min_fields
        ),
    }
}

/// Recommendation bands on mean confidence (0-100)
pub fn recommendations(confidence: f64, fields: usize) -> Vec<String> {
    let mut recs: Vec<&str> = if confidence >= 90.0 {
        vec!["proceed_to_risk_assessment", "high_confidence_processing_complete"]
    } else if confidence >= 70.0 {
        vec!["acceptable_quality_proceed_with_caution", "consider_additional_verification"]
    } else if confidence >= 60.0 {
        vec!["request_document_resubmission", "manual_review_recommended"]
    } else {
        vec!["reject_poor_quality_document", "request_new_clear_document"]
    };

    if fields < 3 {
        recs.push("insufficient_data_extracted");
        recs.push("try_alternative_processing_method");
    }
    recs.into_iter().map(String::from).collect()
}

fn next_action(achievement: &GoalAchievement, confidence: f64) -> &'static str {
    if achievement.achieved {
        "proceed_to_risk_assessment"
    } else if confidence >= 70.0 {
        "request_additional_verification"
    } else {
        "escalate_for_manual_review"
    }
}

/// Step handler for the document actor
pub struct DocumentStepHandler {
    extractor: Arc<dyn DocumentExtractor>,
    strategies: Vec<ProcessingStrategy>,
    fallback_strategy: String,
}

impl DocumentStepHandler {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            extractor,
            strategies: default_strategies(),
            fallback_strategy: "rural_optimized".to_string(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<ProcessingStrategy>, fallback: &str) -> Self {
        self.strategies = strategies;
        self.fallback_strategy = fallback.to_string();
        self
    }

    fn customer_context(ctx: &StepContext<'_>) -> Value {
        let source: Map<String, Value> = ctx
            .input
            .get("customer_data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(|| ctx.input.data.clone());

        let pick = |key: &str, default: Value| source.get(key).cloned().unwrap_or(default);
        json!({
            "income": pick("income", json!(0)),
            "employment": pick("employment", json!("Unknown")),
            "customer_segment": pick("customer_segment", json!("Unknown")),
            "document_type": pick("document_type", json!("Unknown")),
            "age": pick("age", json!("Unknown")),
        })
    }

    async fn choose_strategy(&self, ctx: &StepContext<'_>, doc_size: usize) -> StrategyChoice {
        let prompt = format!(
            "You are an autonomous document processing agent choosing the best strategy.\n\n\
             Customer Context: {}\n\n\
             Document Characteristics:\n- Size: {} bytes\n- Has Document: {}\n\n\
             Available Strategies: {}\n\n\
             Choose the best strategy considering your accuracy goal, the customer, the document, \
             and past performance.\n\n\
             Respond in JSON: {{\"strategy\": \"strategy_name\", \"reasoning\": \"detailed reasoning\", \
             \"expected_accuracy\": 0.0, \"confidence_in_choice\": 0.0}}",
            Self::customer_context(ctx),
            doc_size,
            doc_size > 0,
            serde_json::to_string_pretty(&self.strategies).unwrap_or_default(),
        );

        let fallback = StrategyChoice {
            strategy: self.fallback_strategy.clone(),
            reasoning: format!("AI strategy selection failed, using {}", self.fallback_strategy),
            ..Default::default()
        };
        let mut choice = ctx
            .gateway
            .ask("strategy", &prompt, CallOptions::STEP_CHOICE, fallback)
            .await;

        if !self.strategies.iter().any(|s| s.name == choice.strategy) {
            warn!("Unknown strategy '{}', using {}", choice.strategy, self.fallback_strategy);
            choice.strategy = self.fallback_strategy.clone();
        }
        choice
    }

    async fn analyze_document(&self, ctx: &StepContext<'_>) -> StepResult {
        let doc_size = ctx.input.document.as_ref().map(|d| d.len()).unwrap_or(0);
        let choice = self.choose_strategy(ctx, doc_size).await;

        let extracted: Result<ExtractedFields, String> = match &ctx.input.document {
            Some(doc) if !doc.is_empty() => self.extractor.extract(doc).await.map_err(|e| e.to_string()),
            _ => Err("no document supplied".to_string()),
        };

        match extracted {
            Ok(fields) => {
                let confidence = mean_confidence(&fields);
                let field_count = fields.len();
                let doc_goal = ctx.goal("document_intelligence");
                let target = doc_goal
                    .and_then(|g| g.threshold("extraction_confidence"))
                    .unwrap_or(DEFAULT_CONFIDENCE_TARGET);
                let min_fields = doc_goal
                    .and_then(|g| g.threshold("min_fields"))
                    .map(|n| n.max(1.0) as usize)
                    .unwrap_or(DEFAULT_MIN_FIELDS);

                let achievement = evaluate_extraction(confidence, field_count, target, min_fields);
                let hint = next_action(&achievement, confidence);
                info!(
                    "Agent {} extracted {} field(s) at {:.1}% using {}",
                    ctx.actor_id,
                    field_count,
                    confidence,
                    choice.strategy
                );

                StepResult::new(
                    ctx.step,
                    confidence / 100.0,
                    &format!("Document analyzed using {} approach", choice.strategy),
                )
                .with_info("strategy_used", choice.strategy.as_str())
                .with_info(
                    "extraction_results",
                    json!({
                        "extracted_data": fields,
                        "confidence": confidence,
                        "fields_count": field_count,
                        "goal_achievement": achievement,
                        "recommendations": recommendations(confidence, field_count),
                    }),
                )
                .with_info("strategy_effectiveness", confidence / 100.0)
                .with_hint(hint)
            }
            Err(error) => {
                warn!("Document extraction failed for {}: {}", ctx.actor_id, error);
                StepResult::new(ctx.step, 0.1, &format!("Document analysis failed: {}", error))
                    .with_info("error", error)
                    .with_info("strategy_attempted", choice.strategy.as_str())
                    .with_hint("escalate_to_manual_review")
            }
        }
    }
}

#[async_trait]
impl StepHandler for DocumentStepHandler {
    fn kind(&self) -> &'static str {
        "document"
    }

    async fn execute_step(&self, ctx: &StepContext<'_>) -> StepResult {
        let step = ctx.step;
        if step.action_mentions("analyze_document") {
            self.analyze_document(ctx).await
        } else if step.action_mentions("choose_strategy") {
            StepResult::new(step, 0.9, "Strategy selection completed")
                .with_hint("proceed_with_selected_strategy")
        } else if step.action_mentions("extract_information") {
            StepResult::new(step, 0.85, "Information extraction completed")
                .with_hint("validate_extracted_information")
        } else if step.action_mentions("quality_assessment") {
            StepResult::new(step, 0.88, "Quality assessment completed")
                .with_hint("finalize_document_processing")
        } else {
            StepResult::new(step, 0.7, "General autonomous action completed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::gateway::ModelGateway;
    use crate::agent::input::ActorInput;
    use crate::agent::planner::StepSpec;
    use crate::agent::recovery::RetryPolicy;
    use crate::autonomous::goals::document_goals;
    use crate::autonomous::memory::MemoryBank;
    use crate::error::InvokeError;
    use crate::providers::mock::{fields, FixedExtractor, ScriptedModel};
    use std::time::Duration;

    fn gateway(model: ScriptedModel) -> ModelGateway {
        ModelGateway::new(
            Arc::new(model),
            RetryPolicy::standard().with_base_delay(Duration::from_millis(1)),
        )
    }

    async fn run(handler: &DocumentStepHandler, gateway: &ModelGateway, action: &str, input: &ActorInput) -> StepResult {
        let goals = document_goals().unwrap();
        let memory = MemoryBank::new();
        let step = StepSpec::new(1, action);
        let ctx = StepContext {
            actor_id: "doc",
            step: &step,
            input,
            previous: &[],
            goals: &goals,
            memory: &memory,
            gateway,
        };
        handler.execute_step(&ctx).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_document_scores_extraction() {
        let extracted = fields(&[
            ("FIRST_NAME", "ASHA", 95.0),
            ("LAST_NAME", "DEVI", 92.0),
            ("DOCUMENT_NUMBER", "1234", 90.0),
            ("DATE_OF_BIRTH", "01/01/1990", 91.0),
        ]);
        let handler = DocumentStepHandler::new(Arc::new(FixedExtractor(Ok(extracted))));
        let gw = gateway(ScriptedModel::new().on(
            "choosing the best strategy",
            r#"{"strategy": "vernacular_specialist", "confidence_in_choice": 0.8}"#,
        ));
        let input = ActorInput::default().with_document(vec![1u8; 64]);

        let result = run(&handler, &gw, "analyze_document quality", &input).await;
        assert!((result.success - 0.92).abs() < 1e-9);
        assert_eq!(result.learned_info["strategy_used"], "vernacular_specialist");
        assert_eq!(result.next_action_hint, "proceed_to_risk_assessment");
        assert_eq!(result.learned_info["extraction_results"]["goal_achievement"]["achieved"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extractor_failure_escalates() {
        let handler = DocumentStepHandler::new(Arc::new(FixedExtractor(Err(
            InvokeError::Upstream("InvalidImageFormat".into()),
        ))));
        let gw = gateway(ScriptedModel::new().otherwise(Err(InvokeError::Upstream("down".into()))));
        let input = ActorInput::default().with_document(vec![1u8; 8]);

        let result = run(&handler, &gw, "analyze_document", &input).await;
        assert_eq!(result.success, 0.1);
        assert_eq!(result.next_action_hint, "escalate_to_manual_review");
        assert_eq!(result.learned_info["strategy_attempted"], "rural_optimized");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_document_escalates() {
        let handler = DocumentStepHandler::new(Arc::new(FixedExtractor(Ok(ExtractedFields::new()))));
        let gw = gateway(ScriptedModel::new());
        let result = run(&handler, &gw, "Analyze_Document", &ActorInput::default()).await;
        assert_eq!(result.success, 0.1);
        assert_eq!(result.next_action_hint, "escalate_to_manual_review");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_strategy_uses_fallback() {
        let handler = DocumentStepHandler::new(Arc::new(FixedExtractor(Ok(fields(&[("A", "x", 50.0)])))));
        let gw = gateway(ScriptedModel::new().on("choosing the best strategy", r#"{"strategy": "telepathy"}"#));
        let input = ActorInput::default().with_document(vec![1u8; 8]);

        let result = run(&handler, &gw, "analyze_document", &input).await;
        assert_eq!(result.learned_info["strategy_used"], "rural_optimized");
        assert_eq!(result.next_action_hint, "escalate_for_manual_review");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_step_scores() {
        let handler = DocumentStepHandler::new(Arc::new(FixedExtractor(Ok(ExtractedFields::new()))));
        let gw = gateway(ScriptedModel::new());
        let input = ActorInput::default();

        assert_eq!(run(&handler, &gw, "choose_strategy", &input).await.success, 0.9);
        assert_eq!(run(&handler, &gw, "extract_information", &input).await.success, 0.85);
        assert_eq!(run(&handler, &gw, "quality_assessment", &input).await.success, 0.88);
        assert_eq!(run(&handler, &gw, "Use basic processing", &input).await.success, 0.7);
    }

    #[test]
    fn test_recommendation_bands() {
        assert!(recommendations(95.0, 5).contains(&"proceed_to_risk_assessment".to_string()));
        assert!(recommendations(75.0, 5).contains(&"consider_additional_verification".to_string()));
        assert!(recommendations(65.0, 5).contains(&"manual_review_recommended".to_string()));
        let poor = recommendations(40.0, 2);
        assert!(poor.contains(&"reject_poor_quality_document".to_string()));
        assert!(poor.contains(&"insufficient_data_extracted".to_string()));
    }

    #[test]
    fn test_evaluate_extraction() {
        let a = evaluate_extraction(90.0, 4, 0.85, 4);
        assert!(a.achieved);
        assert_eq!(a.score, 1.0);

        let b = evaluate_extraction(90.0, 2, 0.85, 4);
        assert!(!b.achieved);
        assert!(b.confidence_met);
        assert!(!b.fields_met);
    }
}
