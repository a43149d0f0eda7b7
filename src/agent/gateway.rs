//! Model Gateway
//!
//! Single path for every model call in the crate:
//! invoke (paced, retried on throttling) → recover JSON → typed record.
//!
//! A malformed response never fails here. A failed call is returned to the
//! caller by [`ModelGateway::try_ask`], or replaced by the fallback in
//! [`ModelGateway::ask`].

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::json_repair::recover_as;
use super::recovery::{RecoveryStats, RecoveryStrategy, RetryPolicy};
use crate::error::InvokeError;
use crate::providers::ModelInvoker;

/// Generation parameters for one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CallOptions {
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }

    pub const ANALYSIS: Self = Self::new(1500, 0.3);
    pub const PLANNING: Self = Self::new(2000, 0.4);
    pub const ADAPTATION: Self = Self::new(800, 0.2);
    pub const REFLECTION: Self = Self::new(1000, 0.3);
    pub const NEGOTIATION: Self = Self::new(1200, 0.4);
    pub const COORDINATION: Self = Self::new(1000, 0.3);
    pub const SYNTHESIS: Self = Self::new(1500, 0.2);
    pub const SEGMENTATION: Self = Self::new(500, 0.1);
    /// Short in-step decisions (strategy or model choice)
    pub const STEP_CHOICE: Self = Self::new(800, 0.2);
    pub const STEP_ANALYSIS: Self = Self::new(1500, 0.2);
}

/// Shared handle to the model plus its retry strategy
#[derive(Clone)]
pub struct ModelGateway {
    model: Arc<dyn ModelInvoker>,
    strategy: Arc<RecoveryStrategy>,
}

impl ModelGateway {
    pub fn new(model: Arc<dyn ModelInvoker>, policy: RetryPolicy) -> Self {
        let strategy = RecoveryStrategy::with_policy(model.name(), policy);
        Self {
            model,
            strategy: Arc::new(strategy),
        }
    }

    /// Gateway with the progressive model-invocation pacing
    pub fn with_default_policy(model: Arc<dyn ModelInvoker>) -> Self {
        Self::new(model, RetryPolicy::model_invocation())
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Raw text from one paced, retried invocation
    pub async fn invoke(&self, prompt: &str, opts: CallOptions) -> Result<String, InvokeError> {
        let model = self.model.as_ref();
        debug!(
            "Invoking {}: prompt_len={}, max_tokens={}",
            model.name(),
            prompt.len(),
            opts.max_tokens
        );
        self.strategy
            .execute(move || model.invoke(prompt, opts.max_tokens, opts.temperature))
            .await
    }

    /// Invoke and recover; only a failed call is an error
    pub async fn try_ask<T: DeserializeOwned>(
        &self,
        prompt: &str,
        opts: CallOptions,
        parse_fallback: T,
    ) -> Result<T, InvokeError> {
        let text = self.invoke(prompt, opts).await?;
        Ok(recover_as(&text, parse_fallback))
    }

    /// Invoke and recover; any failure yields `fallback`
    pub async fn ask<T: DeserializeOwned + Clone>(
        &self,
        label: &str,
        prompt: &str,
        opts: CallOptions,
        fallback: T,
    ) -> T {
        match self.try_ask(prompt, opts, fallback.clone()).await {
            Ok(record) => record,
            Err(e) => {
                warn!("{} call failed, using fallback: {}", label, e);
                fallback
            }
        }
    }

    pub fn stats(&self) -> RecoveryStats {
        self.strategy.stats()
    }
}
