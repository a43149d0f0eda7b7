//! Autonomous Agent Layer
//!
//! Everything one actor needs to run its control loop:
//! - Error Recovery (retry throttled calls with exponential backoff)
//! - Response Recovery (repair malformed JSON from the model)
//! - Model Gateway (invoke → recover → typed record)
//! - Planning (drafted plans, bounded replanning)
//! - Step Handlers (document and risk actor kinds)
//! - Reflection (memory, goal escalation, threshold tightening)
//!
//! Architecture follows the OODA loop enhanced with reflection:
//! Analyze → Plan → Execute → Reflect → Adapt

pub mod document;
pub mod engine;
pub mod gateway;
pub mod handler;
pub mod input;
pub mod json_repair;
pub mod planner;
pub mod records;
pub mod recovery;
pub mod reflection;
pub mod risk;

pub use document::DocumentStepHandler;
pub use engine::{Actor, ActorOutcome, ActorProfile, EngineConfig, ExecutionResult, NegotiationRecord};
pub use gateway::{CallOptions, ModelGateway};
pub use handler::{StepContext, StepHandler, StepResult};
pub use input::ActorInput;
pub use json_repair::{parse_or_recover, recover_as, repair_json};
pub use planner::{Plan, StepSpec};
pub use records::{CoordinationMode, FinalStatus, LearningInsight, NegotiationStrategy, SynthesisVerdict};
pub use recovery::{invoke_with_retry, ErrorClass, RecoveryStats, RecoveryStrategy, RetryPolicy};
pub use reflection::{AdaptationReport, ReflectionConfig, ReflectionEngine};
pub use risk::RiskStepHandler;
