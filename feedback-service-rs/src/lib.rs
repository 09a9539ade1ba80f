// feedback-service-rs/src/lib.rs
//
// Customer review intake service.
//
// A submitted star rating and review text are turned into a customer-facing
// reply, an internal summary and a recommended action. The text is drafted by
// the configured LLM provider when one is available; any failure along that
// path degrades to a deterministic, rating-based classification so every
// stored review is fully populated.

pub mod api;
pub mod config;
pub mod fallback;
pub mod generator;
pub mod llm_client;
pub mod parser;
pub mod prompt;
pub mod store;
pub mod validation;

use serde::{Deserialize, Serialize};

pub use generator::{FeedbackGenerator, GenerationOutcome};

/// The three generated fields attached to every review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResult {
    pub customer_reply: String,
    pub internal_summary: String,
    pub recommended_action: String,
}

impl FeedbackResult {
    /// True when none of the three fields is blank.
    pub fn is_complete(&self) -> bool {
        [
            &self.customer_reply,
            &self.internal_summary,
            &self.recommended_action,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}
