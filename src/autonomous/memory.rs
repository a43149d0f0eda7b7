//! Rolling outcome memory
//!
//! Each actor keeps a short, ordered history of closed episodes (newest last).
//! The bank holds at most [`MEMORY_CAP`] records; a push past the cap keeps only
//! the [`MEMORY_TRIM_TO`] most recent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::agent::records::clamp_unit;

pub const MEMORY_CAP: usize = 20;
pub const MEMORY_TRIM_TO: usize = 15;

/// One closed learning episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub segment_label: String,
    pub situation_pattern: String,
    pub action_taken: String,
    pub outcome: String,
    pub success_score: f64,
    pub insight: String,
    pub impact_note: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(segment_label: &str, situation_pattern: &str, action_taken: &str, success_score: f64) -> Self {
        let score = clamp_unit(success_score);
        Self {
            segment_label: segment_label.to_string(),
            situation_pattern: situation_pattern.to_string(),
            action_taken: action_taken.to_string(),
            outcome: format!("Success: {:.2}", score),
            success_score: score,
            insight: String::new(),
            impact_note: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_insight(mut self, insight: &str) -> Self {
        self.insight = insight.to_string();
        self
    }

    pub fn with_impact_note(mut self, note: &str) -> Self {
        self.impact_note = note.to_string();
        self
    }
}

/// Bounded, ordered memory owned by one actor
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryBank {
    records: VecDeque<MemoryRecord>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, trimming to the newest 15 once the cap is passed
    pub fn push(&mut self, record: MemoryRecord) {
        self.records.push_back(record);
        if self.records.len() > MEMORY_CAP {
            let excess = self.records.len() - MEMORY_TRIM_TO;
            self.records.drain(..excess);
            debug!("Memory trimmed to {} records", self.records.len());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.iter()
    }

    /// Up to `n` most recent records, oldest first
    pub fn recent(&self, n: usize) -> Vec<&MemoryRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).collect()
    }

    /// Records scoring strictly above `threshold`
    pub fn successful(&self, threshold: f64) -> Vec<&MemoryRecord> {
        self.records
            .iter()
            .filter(|m| m.success_score > threshold)
            .collect()
    }

    /// Mean score of the last `n` records, if at least `n` exist
    pub fn mean_recent_success(&self, n: usize) -> Option<f64> {
        if n == 0 || self.records.len() < n {
            return None;
        }
        let recent = self.recent(n);
        Some(recent.iter().map(|m| m.success_score).sum::<f64>() / n as f64)
    }

    pub fn last(&self) -> Option<&MemoryRecord> {
        self.records.back()
    }
}
