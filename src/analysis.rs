//! Analysis pipeline: request builder → completion backend → parser.
//!
//! [`analyze_documents`] serves bulk analysis; corpus statistics are
//! recomputed locally from the inputs so they always describe what was
//! actually sent. [`describe_document`] serves the text-extraction endpoint.

use chrono::Utc;
use std::time::Instant;

use crate::client::CompletionBackend;
use crate::error::AnalysisError;
use crate::extract::TextExtractor;
use crate::models::{
    AnalysisResult, DateRange, DocumentInsight, ProcessedFile, ProcessedStatus, TimelineEvent,
};
use crate::parse::{fallback_insight, parse_analysis, parse_document_insight, parse_event_date};
use crate::request::AnalysisRequestBuilder;
use crate::validate::FileDescriptor;

pub async fn analyze_documents(
    backend: &dyn CompletionBackend,
    builder: &AnalysisRequestBuilder,
    files: &[ProcessedFile],
) -> Result<AnalysisResult, AnalysisError> {
    let started = Instant::now();
    let request = builder.build(files)?;

    let completed: Vec<&ProcessedFile> = files.iter().filter(|f| f.is_completed()).collect();
    tracing::info!(documents = completed.len(), "requesting document analysis");

    let reply = backend.complete(&request).await?;
    let mut result = parse_analysis(&reply)?;

    let total_documents = completed.len();
    let total_words: usize = completed.iter().map(|f| f.metadata.word_count).sum();

    result.summary.total_documents = total_documents;
    result.summary.total_words = total_words;

    let stats = &mut result.statistics;
    stats.total_documents = total_documents;
    stats.total_words = total_words;
    stats.average_length = total_words / total_documents.max(1);
    stats.date_range = date_range(&result.timeline);
    stats.processing_time_ms = started.elapsed().as_millis() as u64;
    stats.last_analyzed = Some(Utc::now());

    tracing::info!(
        connections = result.connections.len(),
        timeline = result.timeline.len(),
        contradictions = result.contradictions.len(),
        elapsed_ms = result.statistics.processing_time_ms,
        "document analysis complete"
    );
    Ok(result)
}

/// Timeline is already sorted, so the first and last dated events bound it.
fn date_range(timeline: &[TimelineEvent]) -> Option<DateRange> {
    let mut dated = timeline
        .iter()
        .filter_map(|e| parse_event_date(&e.date).map(|d| (d, e.date.trim())));
    let (first_date, first) = dated.next()?;
    let (_, last) = dated.last().unwrap_or((first_date, first));
    Some(DateRange {
        start: first.to_string(),
        end: last.to_string(),
    })
}

/// Extracted text plus model-derived metadata for one file.
#[derive(Debug, Clone)]
pub struct DescribedDocument {
    pub file: ProcessedFile,
    pub insight: DocumentInsight,
}

/// Extracts `content` and asks the model to describe it.
///
/// Extraction failures are returned as the failed [`ProcessedFile`].
/// A failed remote call or an unparseable reply yields the fallback insight.
pub async fn describe_document(
    backend: &dyn CompletionBackend,
    builder: &AnalysisRequestBuilder,
    extractor: &TextExtractor,
    file: &FileDescriptor,
    content: &[u8],
) -> Result<DescribedDocument, ProcessedFile> {
    let processed = extractor.extract(file, content);
    if processed.status != ProcessedStatus::Completed {
        return Err(processed);
    }

    let request = builder.metadata_request(&file.name, &file.media_type, &processed.extracted_text);
    let insight = match backend.complete(&request).await {
        Ok(reply) => parse_document_insight(&reply, &processed.extracted_text),
        Err(e) => {
            tracing::warn!(file = %file.name, error = %e, "metadata request failed, using fallback");
            fallback_insight(&processed.extracted_text)
        }
    };

    Ok(DescribedDocument {
        file: processed,
        insight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionRequest;
    use crate::config::Config;
    use crate::error::RemoteCallError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String, u16>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for Canned {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, RemoteCallError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(RemoteCallError::Status {
                    status: *status,
                    body: "boom".into(),
                }),
            }
        }
    }

    fn setup() -> (AnalysisRequestBuilder, TextExtractor) {
        let config = Config::minimal();
        (
            AnalysisRequestBuilder::new(&config.llm, &config.pipeline),
            TextExtractor::new(&config.pipeline),
        )
    }

    fn processed(extractor: &TextExtractor, name: &str, text: &str) -> ProcessedFile {
        let file = FileDescriptor::new(name, text.len() as u64, "text/plain");
        extractor.extract(&file, text.as_bytes())
    }

    const REPLY: &str = r#"{
        "summary": {"executiveSummary": "two notes", "totalDocuments": 99, "totalWords": 1},
        "connections": [],
        "timeline": [
            {"date": "2024-03-01", "event": "later", "description": "", "documents": [], "importance": "high"},
            {"date": "sometime", "event": "undated", "description": "", "documents": [], "importance": "low"},
            {"date": "2023-01-15", "event": "earlier", "description": "", "documents": [], "importance": "medium"}
        ],
        "contradictions": [],
        "gaps": [],
        "statistics": {"totalDocuments": 42, "avgAnalysisDepth": 0.7}
    }"#;

    #[tokio::test]
    async fn statistics_are_computed_locally() {
        let (builder, extractor) = setup();
        let files = vec![
            processed(&extractor, "a.txt", "one two three four"),
            processed(&extractor, "b.txt", "five six"),
        ];
        let backend = Canned::ok(REPLY);

        let result = analyze_documents(&backend, &builder, &files).await.unwrap();

        assert_eq!(result.summary.total_documents, 2);
        assert_eq!(result.summary.total_words, 6);
        assert_eq!(result.statistics.total_documents, 2);
        assert_eq!(result.statistics.total_words, 6);
        assert_eq!(result.statistics.average_length, 3);
        assert!(result.statistics.last_analyzed.is_some());
        assert_eq!(
            result.statistics.date_range,
            Some(DateRange {
                start: "2023-01-15".into(),
                end: "2024-03-01".into(),
            })
        );
        assert_eq!(result.timeline[0].event, "earlier");
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_completed_documents_skips_remote_call() {
        let (builder, _) = setup();
        let backend = Canned::ok(REPLY);
        let err = analyze_documents(&backend, &builder, &[]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoDocuments));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_is_a_schema_error() {
        let (builder, extractor) = setup();
        let files = vec![processed(&extractor, "a.txt", "hello")];
        let backend = Canned::ok("Sure! Here is your analysis.");
        let err = analyze_documents(&backend, &builder, &files).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
    }

    #[tokio::test]
    async fn describe_falls_back_when_remote_fails() {
        let (builder, extractor) = setup();
        let file = FileDescriptor::new("notes.txt", 11, "text/plain");
        let backend = Canned::failing(503);

        let described = describe_document(&backend, &builder, &extractor, &file, b"hello world")
            .await
            .unwrap();
        assert_eq!(described.file.extracted_text, "hello world");
        assert_eq!(described.insight.topic, "Error");
        assert_eq!(described.insight.word_count, Some(2));
    }

    #[tokio::test]
    async fn describe_uses_model_metadata() {
        let (builder, extractor) = setup();
        let file = FileDescriptor::new("notes.txt", 11, "text/plain");
        let backend = Canned::ok(r#"{"topic":"Greetings","category":"Notes","confidenceScore":"0.9"}"#);

        let described = describe_document(&backend, &builder, &extractor, &file, b"hello world")
            .await
            .unwrap();
        assert_eq!(described.insight.topic, "Greetings");
        assert_eq!(described.insight.category, "Notes");
        assert!((described.insight.confidence_score - 0.9).abs() < 1e-9);
        assert_eq!(described.insight.word_count, Some(2));
    }

    #[tokio::test]
    async fn describe_returns_extraction_failure() {
        let (builder, extractor) = setup();
        let file = FileDescriptor::new("empty.txt", 0, "text/plain");
        let backend = Canned::ok("{}");

        let failed = describe_document(&backend, &builder, &extractor, &file, b"   ")
            .await
            .unwrap_err();
        assert_eq!(failed.status, ProcessedStatus::Error);
        assert!(backend.seen.lock().unwrap().is_empty());
    }
}
