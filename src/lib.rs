//! Autonomy Engine
//!
//! Autonomous multi-actor processing for banking applications, built on a
//! resilient LLM invocation layer.
//!
//! # Features
//!
//! - **Resilient Invocation**: exponential backoff on throttling, progressive pacing
//! - **Response Recovery**: bracket-aware repair of malformed model JSON
//! - **Step Engine**: analyze → plan → execute → reflect → adapt, per actor
//! - **Bounded Replanning**: weak steps may trigger a new plan, within a limit
//! - **Monotonic Learning**: goal priorities and thresholds only ever rise
//! - **Coordination**: negotiated sequential / parallel / negotiated modes
//! - **Segmentation**: Rural / Urban / Semi-Urban with pincode override
//!
//! # Architecture
//!
//! ```text
//! Task ──► Coordinator ──► Segmenter ─────────┐
//!               │                             │
//!               ├── Document Actor ──┐        │
//!               │                    ├──► ModelGateway ──► Claude API
//!               ├── Risk Actor ──────┘    (retry + JSON repair)
//!               │
//!               └── Synthesis ──► CoordinationResult (JSON)
//! ```

pub mod agent;
pub mod autonomous;
pub mod claude;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod providers;
pub mod segmentation;

pub use agent::{
    Actor, ActorInput, ActorOutcome, ActorProfile, CoordinationMode, DocumentStepHandler, EngineConfig,
    FinalStatus, ModelGateway, RetryPolicy, RiskStepHandler, StepContext, StepHandler, StepResult,
};
pub use autonomous::{Goal, MemoryBank, MemoryRecord};
pub use claude::ClaudeClient;
pub use config::Config;
pub use coordinator::{AutonomyMetrics, CoordinationResult, CoordinationTask, Coordinator};
pub use error::{EngineError, InvokeError};
pub use providers::{DocumentExtractor, ExtractedField, ExtractedFields, ModelInvoker, UnconfiguredExtractor};
pub use segmentation::{CustomerSegment, CustomerSegmenter, SegmentDecision, SegmentationPolicy};
