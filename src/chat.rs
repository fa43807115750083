//! Question answering over the processed-file set.
//!
//! Chat failures are user-facing degradations: [`ChatOrchestrator::answer`]
//! always returns text, substituting [`FALLBACK_RESPONSE`] when the remote
//! call cannot be made or fails.

use crate::client::Backend;
use crate::error::RemoteCallError;
use crate::models::{ChatTurn, ProcessedFile};
use crate::request::AnalysisRequestBuilder;

pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I'm having trouble processing your request right now. Please try again.";

pub struct ChatOrchestrator {
    backend: Backend,
    builder: AnalysisRequestBuilder,
}

impl ChatOrchestrator {
    /// `backend` is `Err(reason)` when no client could be built, e.g. the
    /// credential is missing.
    pub fn new(backend: Backend, builder: AnalysisRequestBuilder) -> Self {
        Self { backend, builder }
    }

    /// Returns the model's reply verbatim, or the fixed apology on failure.
    pub async fn answer(&self, question: &str, files: &[ProcessedFile], history: &[ChatTurn]) -> String {
        match self.try_answer(question, files, history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    pub async fn try_answer(
        &self,
        question: &str,
        files: &[ProcessedFile],
        history: &[ChatTurn],
    ) -> Result<String, RemoteCallError> {
        let backend = self
            .backend
            .as_ref()
            .map_err(|reason| RemoteCallError::Unavailable(reason.clone()))?;

        let request = self.builder.chat_request(question, files, history);
        tracing::debug!(
            documents = files.iter().filter(|f| f.is_completed()).count(),
            turns = history.len(),
            "sending chat request"
        );
        backend.complete(&request).await
    }
}
