//! Customer Segmentation
//!
//! Classifies an applicant as Rural, Urban or Semi-Urban:
//! 1. The model proposes a segment and confidence
//! 2. A known urban pincode prefix overrides the model
//! 3. Income rules apply when no usable model answer exists
//!
//! Prefixes and income cut-offs are data ([`SegmentationPolicy`]), loaded with the
//! rest of the configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::agent::gateway::{CallOptions, ModelGateway};
use crate::agent::records::clamp_unit;

/// Minimum confidence after a pincode override
pub const OVERRIDE_CONFIDENCE: f64 = 0.85;

/// Three-digit prefixes of metro and large-city pincodes
pub const DEFAULT_URBAN_PREFIXES: [&str; 13] = [
    "122", "121", "201", "110", "400", "560", "600", "500", "411", "700", "380", "302", "226",
];

/// Segmentation thresholds and prefixes
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationPolicy {
    pub urban_prefixes: Vec<String>,
    /// Incomes at or below this are Rural under the fallback rules
    pub rural_income_max: f64,
    /// Incomes at or above this are Urban under the fallback rules
    pub urban_income_min: f64,
}

impl Default for SegmentationPolicy {
    fn default() -> Self {
        Self {
            urban_prefixes: DEFAULT_URBAN_PREFIXES.iter().map(|p| p.to_string()).collect(),
            rural_income_max: 300_000.0,
            urban_income_min: 700_000.0,
        }
    }
}

impl SegmentationPolicy {
    pub fn is_urban_pincode(&self, pincode: &str) -> bool {
        let pincode = pincode.trim();
        !pincode.is_empty()
            && self
                .urban_prefixes
                .iter()
                .any(|p| !p.is_empty() && pincode.starts_with(p.as_str()))
    }
}

/// Banking segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerSegment {
    Rural,
    Urban,
    #[serde(rename = "Semi-Urban")]
    SemiUrban,
}

impl CustomerSegment {
    /// Case-insensitive; "semi urban" and "semi_urban" are accepted
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '_'], "-").as_str() {
            "rural" => Some(Self::Rural),
            "urban" => Some(Self::Urban),
            "semi-urban" => Some(Self::SemiUrban),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rural => "Rural",
            Self::Urban => "Urban",
            Self::SemiUrban => "Semi-Urban",
        }
    }

    fn basic_recommendations(&self) -> Vec<String> {
        let recs: &[&str] = match self {
            Self::Rural => &["Rural banking services", "Agricultural loans", "Micro-finance"],
            Self::Urban => &["Premium banking", "Investment products", "Credit cards"],
            Self::SemiUrban => &["Flexible banking options", "Small business loans"],
        };
        recs.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Model,
    PincodeOverride,
    FallbackRules,
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDecision {
    pub segment: CustomerSegment,
    pub confidence: f64,
    pub method: ClassificationMethod,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub pincode: Option<String>,
    pub income: f64,
}

/// Raw model answer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SegmentReply {
    customer_segment: String,
    confidence: f64,
    reasoning: String,
    banking_recommendations: Vec<String>,
}

impl Default for SegmentReply {
    fn default() -> Self {
        Self {
            customer_segment: String::new(),
            confidence: 0.5,
            reasoning: String::new(),
            banking_recommendations: vec![],
        }
    }
}

/// Model-backed segment classifier
#[derive(Clone)]
pub struct CustomerSegmenter {
    gateway: ModelGateway,
    policy: SegmentationPolicy,
}

impl CustomerSegmenter {
    pub fn new(gateway: ModelGateway, policy: SegmentationPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &SegmentationPolicy {
        &self.policy
    }

    /// Classify one applicant. Never fails: unusable answers fall back to rules.
    ///
    /// A missing income counts as 0.
    pub async fn classify(&self, pincode: Option<&str>, income: Option<f64>) -> SegmentDecision {
        let income = income.unwrap_or(0.0);
        let prompt = self.prompt(pincode, income);

        let reply = match self
            .gateway
            .try_ask(&prompt, CallOptions::SEGMENTATION, SegmentReply::default())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Segmentation call failed, using fallback rules: {}", e);
                return self.fallback(pincode, income);
            }
        };

        let Some(proposed) = CustomerSegment::parse(&reply.customer_segment) else {
            warn!(
                "Invalid segment '{}' from model, using fallback rules",
                reply.customer_segment
            );
            return self.fallback(pincode, income);
        };

        let mut decision = SegmentDecision {
            segment: proposed,
            confidence: clamp_unit(reply.confidence),
            method: ClassificationMethod::Model,
            reasoning: reply.reasoning,
            recommendations: reply.banking_recommendations,
            pincode: pincode.map(str::to_string),
            income,
        };

        if let Some(pin) = pincode.filter(|p| self.policy.is_urban_pincode(p)) {
            if proposed != CustomerSegment::Urban {
                info!("Correcting model segment {} to Urban for pincode {}", proposed, pin);
                decision.reasoning = format!(
                    "Corrected from {} to Urban: pincode {} is in a major urban area",
                    proposed, pin
                );
            }
            decision.segment = CustomerSegment::Urban;
            decision.confidence = decision.confidence.max(OVERRIDE_CONFIDENCE);
            decision.method = ClassificationMethod::PincodeOverride;
        }

        info!(
            "Segment: {} ({:.0}% confidence, {:?})",
            decision.segment,
            decision.confidence * 100.0,
            decision.method
        );
        decision
    }

    /// Rule-based classification without the model
    pub fn fallback(&self, pincode: Option<&str>, income: f64) -> SegmentDecision {
        let (segment, confidence, reasoning) = match pincode.filter(|p| self.policy.is_urban_pincode(p)) {
            Some(pin) => (
                CustomerSegment::Urban,
                OVERRIDE_CONFIDENCE,
                format!("Pincode {} is in a major urban area", pin),
            ),
            None if income <= self.policy.rural_income_max => (
                CustomerSegment::Rural,
                0.6,
                "Low income suggests a rural customer".to_string(),
            ),
            None if income >= self.policy.urban_income_min => (
                CustomerSegment::Urban,
                0.6,
                "High income suggests an urban customer".to_string(),
            ),
            None => (
                CustomerSegment::SemiUrban,
                0.5,
                "Middle income, unclear without model analysis".to_string(),
            ),
        };

        SegmentDecision {
            segment,
            confidence,
            method: ClassificationMethod::FallbackRules,
            reasoning,
            recommendations: segment.basic_recommendations(),
            pincode: pincode.map(str::to_string),
            income,
        }
    }

    fn prompt(&self, pincode: Option<&str>, income: f64) -> String {
        format!(
            r#"Classify the customer's banking segment.

You are a banking agent specializing in Indian customer segmentation.
Classify the customer as Rural, Urban, or Semi-Urban.

Customer Information:
- Pincode: {pincode}
- Annual Income: {income:.0}

Pincode prefixes of major urban areas: {prefixes}

Consider geography, typical regional incomes, and infrastructure.
Respond in JSON:
{{
    "customer_segment": "Rural|Urban|Semi-Urban",
    "confidence": 0.0,
    "reasoning": "explanation",
    "banking_recommendations": ["rec1"]
}}"#,
            pincode = pincode.unwrap_or("Not provided"),
            income = income,
            prefixes = self.policy.urban_prefixes.join(", "),
        )
    }
}
