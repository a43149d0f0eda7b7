//! External collaborator interfaces
//!
//! The engine never talks to a vendor SDK directly. It is handed:
//! - a [`ModelInvoker`] (hosted text generation)
//! - a [`DocumentExtractor`] (OCR / identity-document extraction)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::InvokeError;

/// Hosted text-generation model
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Run one completion and return the raw text
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InvokeError>;

    /// Identifier for logs
    fn name(&self) -> &str {
        "model"
    }
}

/// One field pulled out of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: String,
    /// Provider confidence, 0-100
    pub confidence: f64,
}

/// Field name → extracted value
pub type ExtractedFields = BTreeMap<String, ExtractedField>;

/// Mean field confidence (0-100), 0 when nothing was extracted
pub fn mean_confidence(fields: &ExtractedFields) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    fields.values().map(|f| f.confidence).sum::<f64>() / fields.len() as f64
}

/// OCR / identity extraction service
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, document: &[u8]) -> Result<ExtractedFields, InvokeError>;
}

/// Extractor used when no OCR backend is wired in
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredExtractor;

#[async_trait]
impl DocumentExtractor for UnconfiguredExtractor {
    async fn extract(&self, _document: &[u8]) -> Result<ExtractedFields, InvokeError> {
        Err(InvokeError::NotConfigured(
            "document extraction service".to_string(),
        ))
    }
}
