// feedback-service-rs/src/fallback.rs
//
// Deterministic rating-based feedback, used whenever no usable model output
// exists. Pure and total over `u8`: anything at or below 2 is treated as
// negative, anything at or above 4 as positive.

use crate::FeedbackResult;

const NEGATIVE_REPLY: &str = "We're sorry to hear about your experience. Your concerns matter to us, \
and a member of our team will reach out shortly to make this right.";
const NEGATIVE_SUMMARY: &str = "Negative customer experience that requires immediate attention.";
const NEGATIVE_ACTION: &str = "Escalate to the customer support team for follow-up within 4 hours.";

const NEUTRAL_REPLY: &str = "Thank you for your honest feedback. We appreciate you taking the time \
to share your thoughts and will use them to improve.";
const NEUTRAL_SUMMARY: &str = "Mixed customer feedback; monitor for patterns.";
const NEUTRAL_ACTION: &str = "Queue for the weekly customer experience review.";

const POSITIVE_REPLY: &str = "Thank you so much for your wonderful review! We're thrilled you had \
a great experience and look forward to serving you again.";
const POSITIVE_SUMMARY: &str = "Positive customer feedback.";
const POSITIVE_ACTION: &str = "No immediate action required.";

/// Tone bucket a rating falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub fn from_rating(rating: u8) -> Self {
        match rating {
            0..=2 => Sentiment::Negative,
            3 => Sentiment::Neutral,
            _ => Sentiment::Positive,
        }
    }
}

/// Map a rating to its fixed reply, summary and action.
pub fn classify(rating: u8) -> FeedbackResult {
    let (reply, summary, action) = match Sentiment::from_rating(rating) {
        Sentiment::Negative => (NEGATIVE_REPLY, NEGATIVE_SUMMARY, NEGATIVE_ACTION),
        Sentiment::Neutral => (NEUTRAL_REPLY, NEUTRAL_SUMMARY, NEUTRAL_ACTION),
        Sentiment::Positive => (POSITIVE_REPLY, POSITIVE_SUMMARY, POSITIVE_ACTION),
    };

    FeedbackResult {
        customer_reply: reply.to_string(),
        internal_summary: summary.to_string(),
        recommended_action: action.to_string(),
    }
}
