//! Shared test collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use autonomy_engine::{
    DocumentExtractor, ExtractedField, ExtractedFields, InvokeError, ModelGateway, ModelInvoker, RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Model that answers by matching the first line of each prompt
pub struct ScriptedModel {
    rules: Vec<(String, Result<String, InvokeError>)>,
    default: Result<String, InvokeError>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            rules: vec![],
            default: Ok("{}".to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn on(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), Ok(response.to_string())));
        self
    }

    pub fn fail_on(mut self, needle: &str, error: InvokeError) -> Self {
        self.rules.push((needle.to_string(), Err(error)));
        self
    }

    pub fn unavailable() -> Self {
        let mut model = Self::new();
        model.default = Err(InvokeError::Upstream("model endpoint unreachable".to_string()));
        model
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts whose first line contains `needle`
    pub fn prompts_for(&self, needle: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.lines().next().unwrap_or("").contains(needle))
            .collect()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(&self, prompt: &str, _: u32, _: f32) -> Result<String, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let first_line = prompt.lines().next().unwrap_or("");
        self.rules
            .iter()
            .find(|(needle, _)| first_line.contains(needle.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Extractor returning the same fields for every document
pub struct FixedExtractor(pub ExtractedFields);

impl FixedExtractor {
    pub fn with(entries: &[(&str, &str, f64)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(k, v, c)| (k.to_string(), ExtractedField { value: v.to_string(), confidence: *c }))
                .collect(),
        )
    }
}

#[async_trait]
impl DocumentExtractor for FixedExtractor {
    async fn extract(&self, _document: &[u8]) -> Result<ExtractedFields, InvokeError> {
        Ok(self.0.clone())
    }
}

/// Gateway with short backoff, for paused-time tests
pub fn gateway(model: Arc<ScriptedModel>) -> ModelGateway {
    ModelGateway::new(model, RetryPolicy::standard().with_base_delay(Duration::from_millis(10)))
}
