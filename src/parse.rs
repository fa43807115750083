//! Decoding of model replies.
//!
//! The model is asked for bare JSON but is not bound to comply. Replies are
//! decoded strictly after removing one surrounding Markdown code fence.
//!
//! - Bulk analysis: decode failure is returned as [`SchemaParseError`].
//! - Per-file metadata: decode failure yields [`fallback_insight`].

use chrono::NaiveDate;
use serde::de::DeserializeOwned;

use crate::error::SchemaParseError;
use crate::models::{word_count, AnalysisResult, DocumentInsight, TimelineEvent};

pub const FALLBACK_TOPIC: &str = "Error";
pub const FALLBACK_CATEGORY: &str = "Miscellaneous";
pub const FALLBACK_SUMMARY: &str = "Analysis unavailable";

pub fn parse_analysis(reply: &str) -> Result<AnalysisResult, SchemaParseError> {
    let mut result: AnalysisResult = decode_object(reply)?;
    sort_timeline(&mut result.timeline);
    Ok(result)
}

/// Decodes per-file metadata, substituting [`fallback_insight`] when the
/// reply is not valid JSON.
pub fn parse_document_insight(reply: &str, extracted_text: &str) -> DocumentInsight {
    match decode_object::<DocumentInsight>(reply) {
        Ok(mut insight) => {
            if insight.word_count.is_none() {
                insight.word_count = Some(word_count(extracted_text));
            }
            insight
        }
        Err(e) => {
            tracing::warn!(error = %e, "metadata reply is not JSON, using fallback");
            fallback_insight(extracted_text)
        }
    }
}

pub fn fallback_insight(extracted_text: &str) -> DocumentInsight {
    DocumentInsight {
        word_count: Some(word_count(extracted_text)),
        page_count: None,
        language: None,
        author: None,
        topic: FALLBACK_TOPIC.to_string(),
        category: FALLBACK_CATEGORY.to_string(),
        keywords: Vec::new(),
        confidence_score: 0.0,
        summary: FALLBACK_SUMMARY.to_string(),
    }
}

/// Every reply field is optional, so anything but a JSON object is rejected
/// up front rather than decoding to an empty value.
fn decode_object<T: DeserializeOwned>(reply: &str) -> Result<T, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(reply))?;
    if !value.is_object() {
        return Err(<serde_json::Error as serde::de::Error>::custom(
            "expected a JSON object",
        ));
    }
    serde_json::from_value(value)
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => {
            let body = body.trim();
            let unlabelled = body.trim_start_matches(|c: char| c.is_ascii_alphabetic());
            if unlabelled.starts_with('{') || unlabelled.starts_with('[') {
                unlabelled
            } else {
                body
            }
        }
    }
}

/// Parses the date formats models commonly produce for timeline events.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d") {
        return Some(date);
    }
    if raw.len() == 4 {
        if let Ok(year) = raw.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}

/// Stable chronological sort; undated events keep their order at the end.
fn sort_timeline(events: &mut [TimelineEvent]) {
    events.sort_by_key(|e| match parse_event_date(&e.date) {
        Some(date) => (0, Some(date)),
        None => (1, None),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    const REPLY: &str = r#"{
        "summary": {
            "totalDocuments": 2,
            "totalWords": 120,
            "avgConfidenceScore": 0.82,
            "primaryTopics": ["budget"],
            "documentTypes": {"text": 2},
            "keyInsights": [
                {"insight": "Costs rose", "confidence": 0.9, "sourceDocuments": ["a.txt"], "category": "finance"}
            ]
        },
        "connections": [
            {"documents": ["a.txt", "b.txt"], "relationshipType": "supports", "strength": "Strong", "description": "d", "evidence": ["e"]}
        ],
        "timeline": [
            {"date": "2024-03-01", "event": "later", "documents": ["a.txt"], "importance": "low", "category": "c"},
            {"date": "sometime", "event": "undated", "documents": [], "importance": "high", "category": "c"},
            {"date": "2023", "event": "earliest", "documents": ["b.txt"], "importance": "unknown-tier", "category": "c"},
            {"date": "2024-01", "event": "middle", "documents": ["b.txt"], "importance": "medium", "category": "c"}
        ],
        "contradictions": [
            {"documents": ["a.txt", "b.txt"], "issue": "totals", "severity": "critical", "description": "d", "recommendation": "r"}
        ],
        "gaps": [
            {"area": "staffing", "description": "d", "priority": "low", "suggestedSources": ["hr report"]}
        ],
        "statistics": {"totalDocuments": 2, "totalWords": 120, "avgAnalysisDepth": 0.7, "processingTime": "2s", "lastAnalyzed": "2024-05-01T00:00:00Z"}
    }"#;

    #[test]
    fn decodes_full_reply() {
        let result = parse_analysis(REPLY).unwrap();
        assert_eq!(result.summary.primary_topics, vec!["budget"]);
        assert_eq!(result.summary.key_insights[0].source_documents, vec!["a.txt"]);
        assert_eq!(result.connections[0].strength, Level::High);
        assert_eq!(result.contradictions[0].severity, Level::High);
        assert_eq!(result.gaps[0].priority, Level::Low);
        assert_eq!(result.statistics.avg_analysis_depth, 0.7);
    }

    #[test]
    fn timeline_is_chronological() {
        let result = parse_analysis(REPLY).unwrap();
        let events: Vec<&str> = result.timeline.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, vec!["earliest", "middle", "later", "undated"]);
        assert_eq!(result.timeline[0].importance, Level::Medium);
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let fenced = format!("```json\n{}\n```", REPLY);
        assert!(parse_analysis(&fenced).is_ok());
    }

    #[test]
    fn single_line_fence_is_accepted() {
        let result = parse_analysis(r#"```json{"gaps": [{"area": "costs", "priority": "high"}]}```"#)
            .unwrap();
        assert_eq!(result.gaps[0].area, "costs");
        assert!(parse_analysis(r#"```{"gaps": []}```"#).is_ok());
        assert!(parse_analysis("```json```").is_err());
    }

    #[test]
    fn non_string_tiers_become_medium() {
        let reply = r#"{
            "connections": [{"documents": ["a.txt"], "relationshipType": "cites", "strength": 0.8}],
            "contradictions": [{"documents": ["a.txt", "b.txt"], "issue": "dates", "severity": null}],
            "timeline": [{"date": "2024-01-01", "event": "e", "importance": ["high"]}],
            "gaps": [{"area": "x", "priority": true}]
        }"#;
        let result = parse_analysis(reply).unwrap();
        assert_eq!(result.connections[0].strength, Level::Medium);
        assert_eq!(result.contradictions[0].severity, Level::Medium);
        assert_eq!(result.contradictions[0].issue, "dates");
        assert_eq!(result.timeline[0].importance, Level::Medium);
        assert_eq!(result.gaps[0].priority, Level::Medium);
    }

    #[test]
    fn prose_reply_is_a_schema_error() {
        assert!(parse_analysis("I could not analyze these documents.").is_err());
        assert!(parse_analysis("[1, 2, 3]").is_err());
        assert!(parse_analysis("{\"summary\": ").is_err());
    }

    #[test]
    fn malformed_metadata_returns_fallback() {
        for reply in ["", "not json", "{\"topic\": ", "```json\n{oops}\n```", "[]"] {
            let insight = parse_document_insight(reply, "three little words");
            assert_eq!(insight, fallback_insight("three little words"));
            assert_eq!(insight.word_count, Some(3));
            assert_eq!(insight.category, "Miscellaneous");
            assert_eq!(insight.topic, "Error");
            assert_eq!(insight.confidence_score, 0.0);
        }
    }

    #[test]
    fn metadata_reply_is_trusted() {
        let reply = r#"{"wordCount": 10, "language": "en", "topic": "Budget", "category": "Finance", "keywords": ["q1"], "confidenceScore": 0.9, "summary": "s"}"#;
        let insight = parse_document_insight(reply, "a b");
        assert_eq!(insight.word_count, Some(10));
        assert_eq!(insight.language.as_deref(), Some("en"));
        assert_eq!(insight.topic, "Budget");
    }

    #[test]
    fn metadata_without_word_count_uses_local_count() {
        let insight = parse_document_insight(r#"{"topic": "T"}"#, "a b c d");
        assert_eq!(insight.word_count, Some(4));
    }

    #[test]
    fn event_dates() {
        assert_eq!(parse_event_date("2024-02-29"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(parse_event_date("2024-02"), NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(parse_event_date("1999"), NaiveDate::from_ymd_opt(1999, 1, 1));
        assert_eq!(
            parse_event_date("2024-05-01T10:00:00Z"),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(parse_event_date("Q3"), None);
    }
}
