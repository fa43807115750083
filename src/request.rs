//! Prompt construction for the completion API.
//!
//! [`AnalysisRequestBuilder`] turns extracted documents into a single
//! `{model, max_tokens, messages}` request. It embeds, per document, the
//! name, full extracted text and metadata, joined by [`DOCUMENT_DELIMITER`],
//! inside an instruction that spells out the exact JSON reply shape.

use crate::client::{CompletionRequest, Message};
use crate::config::{LlmConfig, PipelineConfig};
use crate::error::AnalysisError;
use crate::models::{ChatTurn, ProcessedFile, Sender};

pub const DOCUMENT_DELIMITER: &str = "\n\n---\n\n";

/// Literal reply schema requested for bulk analysis.
pub const ANALYSIS_SCHEMA: &str = r#"{
  "summary": {
    "executiveSummary": "string",
    "totalDocuments": number,
    "totalWords": number,
    "avgConfidenceScore": number,
    "primaryTopics": ["string"],
    "mainThemes": ["string"],
    "documentTypes": { "type": number },
    "keyInsights": [
      { "insight": "string", "confidence": number, "sourceDocuments": ["string"], "category": "string" }
    ],
    "recommendations": ["string"]
  },
  "connections": [
    { "documents": ["string"], "relationshipType": "string", "strength": "high|medium|low", "description": "string", "evidence": ["string"] }
  ],
  "timeline": [
    { "date": "YYYY-MM-DD", "event": "string", "documents": ["string"], "importance": "high|medium|low", "category": "string" }
  ],
  "contradictions": [
    { "documents": ["string"], "issue": "string", "severity": "high|medium|low", "description": "string", "recommendation": "string" }
  ],
  "gaps": [
    { "area": "string", "description": "string", "priority": "high|medium|low", "suggestedSources": ["string"] }
  ],
  "statistics": {
    "totalDocuments": number,
    "totalWords": number,
    "avgAnalysisDepth": number,
    "processingTime": "string",
    "lastAnalyzed": "ISO-8601 timestamp"
  }
}"#;

/// Literal reply schema requested for per-file metadata.
pub const METADATA_SCHEMA: &str = r#"{
  "wordCount": number,
  "pageCount": number,
  "language": "string",
  "author": "string or null",
  "topic": "string",
  "category": "string",
  "keywords": ["string"],
  "confidenceScore": number,
  "summary": "string"
}"#;

#[derive(Debug, Clone)]
pub struct AnalysisRequestBuilder {
    model: String,
    max_tokens: u32,
    chat_max_tokens: u32,
    excerpt_chars: usize,
}

impl AnalysisRequestBuilder {
    pub fn new(llm: &LlmConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            chat_max_tokens: llm.chat_max_tokens,
            excerpt_chars: pipeline.metadata_excerpt_chars,
        }
    }

    /// Builds the bulk analysis request over the completed files in `files`.
    pub fn build(&self, files: &[ProcessedFile]) -> Result<CompletionRequest, AnalysisError> {
        let completed: Vec<&ProcessedFile> = files.iter().filter(|f| f.is_completed()).collect();
        if completed.is_empty() {
            return Err(AnalysisError::NoDocuments);
        }

        let payload = completed
            .iter()
            .map(|f| document_block(f))
            .collect::<Vec<_>>()
            .join(DOCUMENT_DELIMITER);

        let prompt = format!(
            "You are a research analyst. Analyze the {count} document(s) below and identify \
             key insights, cross-document connections, a chronological timeline of dated events, \
             contradictions between documents, and gaps in coverage.\n\n\
             Respond with a single JSON object in exactly this format and nothing else:\n\
             {schema}\n\n\
             Use only \"high\", \"medium\" or \"low\" for strength, importance, severity and \
             priority. Refer to documents by their names.\n\n\
             Documents:\n\n{payload}",
            count = completed.len(),
            schema = ANALYSIS_SCHEMA,
            payload = payload,
        );

        Ok(self.request(self.max_tokens, prompt))
    }

    /// Builds the per-file metadata request used by the text-extraction
    /// endpoint. Only a bounded prefix of the text is sent.
    pub fn metadata_request(&self, file_name: &str, file_type: &str, text: &str) -> CompletionRequest {
        let excerpt = truncate_chars(text, self.excerpt_chars);
        let prompt = format!(
            "Analyze the following document and describe it.\n\
             File name: {file_name}\n\
             File type: {file_type}\n\n\
             Respond with a single JSON object in exactly this format and nothing else:\n\
             {schema}\n\n\
             Document content:\n{excerpt}",
            file_name = file_name,
            file_type = file_type,
            schema = METADATA_SCHEMA,
            excerpt = excerpt,
        );
        self.request(self.max_tokens, prompt)
    }

    /// Builds a chat request over completed documents and prior turns.
    pub fn chat_request(
        &self,
        question: &str,
        files: &[ProcessedFile],
        history: &[ChatTurn],
    ) -> CompletionRequest {
        let mut prompt = String::from(
            "You are a research assistant answering questions about the user's uploaded \
             documents. Base your answer on the documents; say so when they do not contain \
             the answer.\n\n",
        );

        let documents: Vec<String> = files
            .iter()
            .filter(|f| f.is_completed())
            .map(|f| format!("Document: {}\n{}", f.name, f.extracted_text))
            .collect();
        if documents.is_empty() {
            prompt.push_str("No documents have been uploaded yet.\n\n");
        } else {
            prompt.push_str("Documents:\n\n");
            prompt.push_str(&documents.join(DOCUMENT_DELIMITER));
            prompt.push_str("\n\n");
        }

        if !history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in history {
                let tag = match turn.sender {
                    Sender::User => "User",
                    Sender::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{}: {}\n", tag, turn.text));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Question: {}", question));
        self.request(self.chat_max_tokens, prompt)
    }

    fn request(&self, max_tokens: u32, prompt: String) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            max_tokens,
            messages: vec![Message::user(prompt)],
        }
    }
}

fn document_block(file: &ProcessedFile) -> String {
    let metadata = serde_json::to_string(&file.metadata).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Document: {}\nContent: {}\nMetadata: {}",
        file.name, file.extracted_text, metadata
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::TextExtractor;
    use crate::validate::FileDescriptor;

    fn builder() -> AnalysisRequestBuilder {
        AnalysisRequestBuilder::new(&LlmConfig::default(), &PipelineConfig::default())
    }

    fn doc(name: &str, text: &str) -> ProcessedFile {
        TextExtractor::default().extract(
            &FileDescriptor::new(name, text.len() as u64, "text/plain"),
            text.as_bytes(),
        )
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(builder().build(&[]), Err(AnalysisError::NoDocuments)));

        let failed = doc("blank.txt", "   ");
        assert!(matches!(
            builder().build(&[failed]),
            Err(AnalysisError::NoDocuments)
        ));
    }

    #[test]
    fn embeds_every_completed_document() {
        let files = vec![
            doc("a.txt", "first document body"),
            doc("blank.txt", ""),
            doc("b.txt", "second document body"),
        ];
        let request = builder().build(&files).unwrap();
        assert_eq!(request.messages.len(), 1);
        let prompt = &request.messages[0].content;

        assert!(prompt.contains("Document: a.txt\nContent: first document body\nMetadata: {"));
        assert!(prompt.contains("Document: b.txt\nContent: second document body"));
        assert!(!prompt.contains("blank.txt"));
        assert!(prompt.contains("\"wordCount\":3"));
        assert_eq!(prompt.matches(DOCUMENT_DELIMITER).count(), 1);
        assert!(prompt.contains("\"contradictions\""));
        assert!(prompt.contains("the 2 document(s)"));
        assert_eq!(request.max_tokens, 4000);
    }

    #[test]
    fn request_serializes_to_completion_body() {
        let request = builder().build(&[doc("a.txt", "hello")]).unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], LlmConfig::default().model);
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn chat_tags_turns_by_sender() {
        let history = vec![ChatTurn::user("What is in a.txt?"), ChatTurn::assistant("Budgets.")];
        let request = builder().chat_request("And b?", &[doc("a.txt", "budget figures")], &history);
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("Document: a.txt\nbudget figures"));
        assert!(prompt.contains("User: What is in a.txt?\nAssistant: Budgets.\n"));
        assert!(prompt.ends_with("Question: And b?"));
        assert_eq!(request.max_tokens, 1000);
    }

    #[test]
    fn metadata_excerpt_is_bounded() {
        let llm = LlmConfig::default();
        let pipeline = PipelineConfig {
            metadata_excerpt_chars: 4,
            ..PipelineConfig::default()
        };
        let request =
            AnalysisRequestBuilder::new(&llm, &pipeline).metadata_request("n.txt", "text/plain", "héllo world");
        assert!(request.messages[0].content.ends_with("Document content:\nhéll"));
    }
}
