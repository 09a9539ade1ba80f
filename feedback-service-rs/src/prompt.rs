// feedback-service-rs/src/prompt.rs
//
// Renders a review into the single prompt sent to the model.

/// Keys the model must return. Shared with the response parser.
pub const REPLY_KEY: &str = "user_response";
pub const SUMMARY_KEY: &str = "admin_summary";
pub const ACTION_KEY: &str = "recommended_action";

/// Build the analyst prompt for a rating and an already normalized review.
pub fn build(rating: u8, review_text: &str) -> String {
    format!(
        "You are a customer feedback analyst for an online store. Read the review below and \
draft a response for the customer plus notes for the internal support team.\n\n\
Rating: {rating}/5\n\
Review: {review_text}\n\n\
Return ONLY a JSON object with exactly these three keys:\n\
- \"{REPLY_KEY}\": a short, empathetic reply addressed to the customer\n\
- \"{SUMMARY_KEY}\": a one-sentence summary of the review for internal staff\n\
- \"{ACTION_KEY}\": the concrete next step the team should take\n\n\
Do not wrap the JSON in markdown code fences and do not add any text before or after it.\n\n\
Example:\n\
{{\"{REPLY_KEY}\": \"Thank you for letting us know. We're sorry the package was late and \
have passed this on to our shipping team.\", \
\"{SUMMARY_KEY}\": \"Customer received the order three days late.\", \
\"{ACTION_KEY}\": \"Review carrier performance for this region.\"}}"
    )
}
