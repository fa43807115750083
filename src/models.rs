//! Core data models used throughout Docent.
//!
//! These types represent uploads, extracted documents, analysis results and
//! chat turns as they flow between the pipeline and the dashboard UI. All
//! wire types serialize with camelCase keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of an upload. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Processing,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

/// A file the user selected or dropped, tracked through processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub media_type: String,
    /// 0 to 100.
    pub progress: u8,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedStatus {
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_extracted: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Text extracted from one upload.
///
/// A `Completed` file always has non-empty `extracted_text` whose
/// whitespace token count equals `metadata.word_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub size: u64,
    #[serde(default)]
    pub content: String,
    pub extracted_text: String,
    pub metadata: FileMetadata,
    pub status: ProcessedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedFile {
    pub fn is_completed(&self) -> bool {
        self.status == ProcessedStatus::Completed
    }
}

/// Whitespace-delimited token count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ============ Analysis result ============

/// Tier attached to connections, timeline events, contradictions and gaps.
///
/// Model output is free-form, so decoding never fails: recognised synonyms
/// map onto the three tiers and anything else, including numbers and
/// `null`, becomes `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "serde_json::Value")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl Level {
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "strong" | "critical" | "major" => Level::High,
            "low" | "weak" | "minor" => Level::Low,
            _ => Level::Medium,
        }
    }
}

impl From<serde_json::Value> for Level {
    fn from(raw: serde_json::Value) -> Self {
        match raw {
            serde_json::Value::String(label) => Level::from_label(&label),
            _ => Level::Medium,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    pub connections: Vec<Connection>,
    pub timeline: Vec<TimelineEvent>,
    pub contradictions: Vec<Contradiction>,
    pub gaps: Vec<KnowledgeGap>,
    pub statistics: AnalysisStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSummary {
    pub executive_summary: String,
    #[serde(deserialize_with = "lenient_count")]
    pub total_documents: usize,
    #[serde(deserialize_with = "lenient_count")]
    pub total_words: usize,
    #[serde(deserialize_with = "lenient_f64")]
    pub avg_confidence_score: f64,
    pub primary_topics: Vec<String>,
    pub main_themes: Vec<String>,
    pub document_types: BTreeMap<String, serde_json::Value>,
    pub key_insights: Vec<KeyInsight>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyInsight {
    pub insight: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: f64,
    pub source_documents: Vec<String>,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Connection {
    pub documents: Vec<String>,
    pub relationship_type: String,
    pub strength: Level,
    pub description: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineEvent {
    pub date: String,
    pub event: String,
    pub documents: Vec<String>,
    pub importance: Level,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contradiction {
    pub documents: Vec<String>,
    pub issue: String,
    pub severity: Level,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeGap {
    pub area: String,
    pub description: String,
    pub priority: Level,
    pub suggested_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Corpus statistics. Counts, lengths and timings are computed locally
/// after the model replies; only `avg_analysis_depth` comes from the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisStatistics {
    #[serde(skip_deserializing)]
    pub total_documents: usize,
    #[serde(skip_deserializing)]
    pub total_words: usize,
    #[serde(skip_deserializing)]
    pub average_length: usize,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(deserialize_with = "lenient_f64")]
    pub avg_analysis_depth: f64,
    #[serde(skip_deserializing)]
    pub processing_time_ms: u64,
    #[serde(skip_deserializing)]
    pub last_analyzed: Option<DateTime<Utc>>,
}

/// Per-file descriptive metadata produced by the text-extraction endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentInsight {
    #[serde(deserialize_with = "lenient_opt_count")]
    pub word_count: Option<usize>,
    #[serde(deserialize_with = "lenient_opt_count")]
    pub page_count: Option<usize>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub topic: String,
    pub category: String,
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence_score: f64,
    pub summary: String,
}

// ============ Chat ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender: Sender,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

// ============ Lenient numeric decoding ============
//
// Models emit numbers as numbers, numeric strings ("0.8", "12"), or prose
// ("high"). A bad number must not sink the decode of the whole reply.

fn number_from(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(number_from(&value).filter(|n| n.is_finite()).unwrap_or(0.0))
}

fn lenient_count<'de, D: Deserializer<'de>>(de: D) -> Result<usize, D::Error> {
    Ok(lenient_opt_count(de)?.unwrap_or(0))
}

fn lenient_opt_count<'de, D: Deserializer<'de>>(de: D) -> Result<Option<usize>, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(number_from(&value)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round() as usize))
}
