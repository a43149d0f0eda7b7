//! Multi-Actor Coordinator
//!
//! Runs a document actor and a risk actor against one application:
//! - Segments the customer first when the task carries pincode/income
//! - Both actors negotiate; the model picks a coordination mode
//! - Executes in that mode (sequential, parallel or negotiated)
//! - Synthesizes one verdict, conservatively `manual_review` on failure
//! - Reports autonomy metrics from the actors' histories
//!
//! Only the document actor ever receives the document bytes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agent::document::DocumentStepHandler;
use crate::agent::engine::{Actor, ActorOutcome, EngineConfig};
use crate::agent::gateway::{CallOptions, ModelGateway};
use crate::agent::input::ActorInput;
use crate::agent::records::{CoordinationDecision, CoordinationMode, NegotiationStrategy, SynthesisVerdict};
use crate::agent::risk::RiskStepHandler;
use crate::autonomous::goals::{document_goals, risk_goals};
use crate::error::EngineError;
use crate::providers::DocumentExtractor;
use crate::segmentation::{CustomerSegmenter, SegmentDecision, SegmentationPolicy};

pub const DOCUMENT_ACTOR_ID: &str = "document_agent";
pub const RISK_ACTOR_ID: &str = "risk_agent";

/// One application to coordinate
#[derive(Debug, Clone, Default)]
pub struct CoordinationTask {
    pub application_id: String,
    pub data: Map<String, Value>,
    pub document: Option<Arc<[u8]>>,
}

impl CoordinationTask {
    pub fn new(application_id: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            ..Default::default()
        }
    }

    /// Build from a JSON object, taking `application_id` from it or generating one
    pub fn from_value(value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let application_id = data
            .get("application_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("APP-{}", uuid::Uuid::new_v4()));

        Self {
            application_id,
            data,
            document: None,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<Arc<[u8]>>) -> Self {
        self.document = Some(document.into());
        self
    }

    fn needs_segmentation(&self) -> bool {
        !self.data.contains_key("customer_segment")
            && (self.data.contains_key("pincode") || self.data.contains_key("income"))
    }

    fn pincode(&self) -> Option<String> {
        match self.data.get("pincode")? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn income(&self) -> Option<f64> {
        ActorInput::new(self.data.clone()).get_f64("income")
    }
}

/// Both actors' outcomes for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResults {
    pub processing_type: CoordinationMode,
    pub document_result: ActorOutcome,
    pub risk_result: ActorOutcome,
    /// Negotiations held during processing (negotiated mode only)
    pub agent_interactions: Vec<NegotiationStrategy>,
}

/// Activity counters of one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorAutonomy {
    pub decisions_made: usize,
    pub adaptations_count: u32,
    pub learning_instances: usize,
    pub negotiation_instances: usize,
}

impl ActorAutonomy {
    pub fn of(actor: &Actor) -> Self {
        Self {
            decisions_made: actor.memory().len(),
            adaptations_count: actor.adaptation_count(),
            learning_instances: actor.reflection_history().len(),
            negotiation_instances: actor.negotiation_history().len(),
        }
    }

    fn indicators(&self) -> [bool; 4] {
        [
            self.decisions_made > 0,
            self.adaptations_count > 0,
            self.negotiation_instances > 0,
            self.learning_instances > 0,
        ]
    }
}

/// System-wide autonomy report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyMetrics {
    pub per_actor: BTreeMap<String, ActorAutonomy>,
    /// Fraction of true indicators, four per actor
    pub system_autonomy_score: f64,
}

impl AutonomyMetrics {
    pub fn from_actors(actors: &[&Actor]) -> Self {
        let per_actor: BTreeMap<String, ActorAutonomy> = actors
            .iter()
            .map(|a| (a.id().to_string(), ActorAutonomy::of(a)))
            .collect();

        let indicators: Vec<bool> = per_actor.values().flat_map(|a| a.indicators()).collect();
        let system_autonomy_score = if indicators.is_empty() {
            0.0
        } else {
            indicators.iter().filter(|b| **b).count() as f64 / indicators.len() as f64
        };

        Self {
            per_actor,
            system_autonomy_score,
        }
    }
}

/// Everything one coordination produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub application_id: String,
    pub segmentation: Option<SegmentDecision>,
    pub coordination: CoordinationDecision,
    pub agent_results: AgentResults,
    pub final_decision: SynthesisVerdict,
    pub autonomy_metrics: AutonomyMetrics,
}

impl CoordinationResult {
    /// Plain JSON view
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Two-actor coordinator
pub struct Coordinator {
    document: Actor,
    risk: Actor,
    gateway: ModelGateway,
    segmenter: Option<CustomerSegmenter>,
}

impl Coordinator {
    pub fn new(document: Actor, risk: Actor, gateway: ModelGateway) -> Self {
        Self {
            document,
            risk,
            gateway,
            segmenter: None,
        }
    }

    pub fn with_segmenter(mut self, segmenter: CustomerSegmenter) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// The banking pair: document actor, risk actor and segmenter on one gateway
    pub fn banking(
        gateway: ModelGateway,
        extractor: Arc<dyn DocumentExtractor>,
        policy: SegmentationPolicy,
        engine: EngineConfig,
    ) -> Result<Self, EngineError> {
        let document = Actor::new(
            DOCUMENT_ACTOR_ID,
            document_goals()?,
            Arc::new(DocumentStepHandler::new(extractor)),
            gateway.clone(),
        )?
        .with_config(engine.clone());

        let risk = Actor::new(
            RISK_ACTOR_ID,
            risk_goals()?,
            Arc::new(RiskStepHandler::new()),
            gateway.clone(),
        )?
        .with_config(engine);

        let segmenter = CustomerSegmenter::new(gateway.clone(), policy);
        Ok(Self::new(document, risk, gateway).with_segmenter(segmenter))
    }

    pub fn document_actor(&self) -> &Actor {
        &self.document
    }

    pub fn risk_actor(&self) -> &Actor {
        &self.risk
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Coordinate both actors on one task
    pub async fn coordinate(&mut self, mut task: CoordinationTask) -> Result<CoordinationResult, EngineError> {
        info!("Coordinating application {}", task.application_id);

        let segmentation = self.segment(&mut task).await;
        task.data
            .entry("application_id".to_string())
            .or_insert_with(|| Value::from(task.application_id.clone()));

        let coordination = self.negotiate_mode(&task).await;
        info!(
            "Application {} coordination mode: {}",
            task.application_id,
            coordination.strategy.as_str()
        );

        let agent_results = self.execute(coordination.strategy, &task).await?;
        let final_decision = self.synthesize(&agent_results).await;
        let autonomy_metrics = AutonomyMetrics::from_actors(&[&self.document, &self.risk]);

        info!(
            "Application {} decision: {} ({:.2}), autonomy {:.2}",
            task.application_id,
            final_decision.final_status.as_str(),
            final_decision.synthesis_confidence,
            autonomy_metrics.system_autonomy_score
        );

        Ok(CoordinationResult {
            application_id: task.application_id,
            segmentation,
            coordination,
            agent_results,
            final_decision,
            autonomy_metrics,
        })
    }

    async fn segment(&self, task: &mut CoordinationTask) -> Option<SegmentDecision> {
        let segmenter = self.segmenter.as_ref()?;
        if !task.needs_segmentation() {
            return None;
        }

        let pincode = task.pincode();
        let decision = segmenter.classify(pincode.as_deref(), task.income()).await;
        task.data.insert(
            "customer_segment".to_string(),
            Value::from(decision.segment.as_str()),
        );
        task.data.insert(
            "segment_confidence".to_string(),
            Value::from(decision.confidence),
        );
        Some(decision)
    }

    async fn negotiate_mode(&mut self, task: &CoordinationTask) -> CoordinationDecision {
        let context = Value::Object(task.data.clone());
        let risk_profile = self.risk.profile();
        let document_profile = self.document.profile();

        let document_pref = self
            .document
            .negotiate(&risk_profile, "coordination_strategy", &context)
            .await;
        let risk_pref = self
            .risk
            .negotiate(&document_profile, "coordination_strategy", &context)
            .await;

        let prompt = format!(
            r#"You are an autonomous orchestrator facilitating agent coordination.

Document Agent Preference:
{document_pref}

Risk Agent Preference:
{risk_pref}

Available Strategies:
- sequential: document agent first, then risk agent with its results
- parallel: both agents work simultaneously on the same input
- negotiated: document agent first, then both negotiate before the risk agent runs

Application Context:
{context}

Respond in JSON:
{{
    "strategy": "sequential|parallel|negotiated",
    "reasoning": "why this strategy is best",
    "expected_benefits": ["benefit1"],
    "potential_risks": ["risk1"],
    "coordination_details": {{
        "information_sharing": "how agents will share info",
        "decision_making": "how the final decision will be made"
    }}
}}"#,
            document_pref = serde_json::to_string_pretty(&document_pref).unwrap_or_default(),
            risk_pref = serde_json::to_string_pretty(&risk_pref).unwrap_or_default(),
            context = serde_json::to_string_pretty(&context).unwrap_or_default(),
        );

        self.gateway
            .ask("coordination", &prompt, CallOptions::COORDINATION, CoordinationDecision::fallback())
            .await
    }

    async fn execute(&mut self, mode: CoordinationMode, task: &CoordinationTask) -> Result<AgentResults, EngineError> {
        let mut document_input = ActorInput::new(task.data.clone());
        if let Some(doc) = &task.document {
            document_input = document_input.with_document(doc.clone());
        }
        let risk_input = ActorInput::new(task.data.clone());
        let mut interactions = vec![];

        let (document_result, risk_result) = match mode {
            CoordinationMode::Sequential => {
                let document_result = self.document.autonomous_process(&document_input).await?;
                let risk_input = risk_input.with_field("document_result", to_value(&document_result));
                let risk_result = self.risk.autonomous_process(&risk_input).await?;
                (document_result, risk_result)
            }
            CoordinationMode::Parallel => {
                let (document_result, risk_result) = tokio::join!(
                    self.document.autonomous_process(&document_input),
                    self.risk.autonomous_process(&risk_input),
                );
                (document_result?, risk_result?)
            }
            CoordinationMode::Negotiated => {
                let document_result = self.document.autonomous_process(&document_input).await?;
                let shared = to_value(&document_result);

                let risk_profile = self.risk.profile();
                let negotiation = self
                    .document
                    .negotiate(
                        &risk_profile,
                        "processing_collaboration",
                        &json!({ "document_result": shared.clone() }),
                    )
                    .await;
                debug!("Collaboration outcome: {}", negotiation.negotiation_position);

                let risk_input = risk_input
                    .with_field("document_result", shared)
                    .with_field("negotiation_outcome", to_value(&negotiation));
                interactions.push(negotiation);

                let risk_result = self.risk.autonomous_process(&risk_input).await?;
                (document_result, risk_result)
            }
        };

        Ok(AgentResults {
            processing_type: mode,
            document_result,
            risk_result,
            agent_interactions: interactions,
        })
    }

    async fn synthesize(&self, results: &AgentResults) -> SynthesisVerdict {
        let prompt = format!(
            r#"You are an autonomous orchestrator synthesizing agent decisions.

Agent Processing Results:
{results}

Each agent processed autonomously with its own goals, learning, and adaptations.
Weigh each agent's conclusions and confidence, the adaptations it made, and any
negotiation that occurred. Resolve conflicts conservatively.

Respond in JSON:
{{
    "final_status": "approved|rejected|manual_review",
    "synthesis_confidence": 0.0,
    "synthesis_reasoning": "detailed reasoning",
    "agent_consensus": "agreement|disagreement|partial",
    "key_factors": ["factor1"],
    "autonomy_quality": {{
        "document_agent_autonomy": 0.0,
        "risk_agent_autonomy": 0.0,
        "coordination_autonomy": 0.0
    }},
    "next_steps": ["step1"]
}}"#,
            results = serde_json::to_string_pretty(results).unwrap_or_default(),
        );

        self.gateway
            .ask("synthesis", &prompt, CallOptions::SYNTHESIS, SynthesisVerdict::failed())
            .await
            .normalized()
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
