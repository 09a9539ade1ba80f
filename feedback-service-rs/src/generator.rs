// feedback-service-rs/src/generator.rs
//
// Feedback generation: prompt -> remote model -> parser, with the rating
// classifier as the floor. `generate` never fails and never returns a blank
// field.

use std::sync::Arc;

use crate::fallback;
use crate::llm_client::{CompletionBackend, LlmError};
use crate::parser::{self, ParseError};
use crate::prompt;
use crate::FeedbackResult;

/// Result of one trip through the remote model path.
#[derive(Debug)]
pub enum GenerationOutcome {
    Success(FeedbackResult),
    RemoteFailure(LlmError),
    ParseFailure(ParseError),
    /// Output parsed, but at least one field was blank.
    Incomplete(FeedbackResult),
}

#[derive(Clone)]
pub struct FeedbackGenerator {
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl FeedbackGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A generator that never calls out and always uses the classifier.
    pub fn classifier_only() -> Self {
        Self { backend: None }
    }

    pub fn uses_remote_model(&self) -> bool {
        self.backend.is_some()
    }

    /// Produce feedback for a review. Infallible.
    pub async fn generate(&self, rating: u8, review_text: &str) -> FeedbackResult {
        let Some(backend) = self.backend.as_deref() else {
            tracing::debug!("No LLM provider configured, classifying rating {}", rating);
            return fallback::classify(rating);
        };

        match Self::attempt(backend, rating, review_text).await {
            GenerationOutcome::Success(result) => result,
            GenerationOutcome::RemoteFailure(err) => {
                tracing::warn!("LLM call failed, using fallback for rating {}: {}", rating, err);
                fallback::classify(rating)
            }
            GenerationOutcome::ParseFailure(err) => {
                tracing::warn!("Unusable LLM output, using fallback for rating {}: {}", rating, err);
                fallback::classify(rating)
            }
            GenerationOutcome::Incomplete(_) => {
                tracing::warn!("LLM output had a blank field, using fallback for rating {}", rating);
                fallback::classify(rating)
            }
        }
    }

    /// Run the remote path once and report what happened, without falling back.
    pub async fn attempt(
        backend: &dyn CompletionBackend,
        rating: u8,
        review_text: &str,
    ) -> GenerationOutcome {
        let prompt = prompt::build(rating, review_text);

        let raw = match backend.complete(&prompt).await {
            Ok(raw) => raw,
            Err(err) => return GenerationOutcome::RemoteFailure(err),
        };

        match parser::parse(&raw) {
            Ok(result) if result.is_complete() => GenerationOutcome::Success(result),
            Ok(result) => GenerationOutcome::Incomplete(result),
            Err(err) => GenerationOutcome::ParseFailure(err),
        }
    }
}
