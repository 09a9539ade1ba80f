//! Review submission validation
//!
//! Checks and normalizes inbound requests before any model call or storage
//! write happens. Failures map to 422 responses.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// Error response for validation failures
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub error: String,
    pub code: u16,
    pub details: Option<Vec<String>>,
}

/// Validation error for API requests
#[derive(Debug, thiserror::Error)]
pub enum ApiValidationError {
    #[error("Invalid request format: {0}")]
    InvalidFormat(String),

    #[error("Rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i64),

    #[error("Review text must not be empty")]
    EmptyReview,
}

impl ApiValidationError {
    /// Convert to HTTP status code and error response
    pub fn to_response(&self) -> (StatusCode, Json<ValidationErrorResponse>) {
        let status = StatusCode::UNPROCESSABLE_ENTITY;
        let details = match self {
            Self::RatingOutOfRange(_) => Some(vec!["rating".to_string()]),
            Self::EmptyReview => Some(vec!["review_text".to_string()]),
            Self::InvalidFormat(_) => None,
        };

        (
            status,
            Json(ValidationErrorResponse {
                error: self.to_string(),
                code: status.as_u16(),
                details,
            }),
        )
    }
}

/// Body of `POST /submit-review`.
///
/// `rating` is read as a wide integer so out-of-range values reach the range
/// check instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    pub rating: i64,
    pub review_text: String,
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub rating: u8,
    /// Trimmed and capped at the configured length.
    pub review_text: String,
}

pub fn validate_rating(rating: i64) -> Result<u8, ApiValidationError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating as u8)
    } else {
        Err(ApiValidationError::RatingOutOfRange(rating))
    }
}

/// Trim the review and keep at most `max_chars` characters of it.
pub fn normalize_review_text(text: &str, max_chars: usize) -> Result<String, ApiValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiValidationError::EmptyReview);
    }

    Ok(match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    })
}

pub fn validate_submission(
    request: &SubmitReviewRequest,
    max_review_length: usize,
) -> Result<ValidSubmission, ApiValidationError> {
    let rating = validate_rating(request.rating)?;
    let review_text = normalize_review_text(&request.review_text, max_review_length)?;
    Ok(ValidSubmission {
        rating,
        review_text,
    })
}

/// Validate the optional `rating` query parameter of `GET /get-reviews`.
pub fn validate_rating_filter(rating: Option<i64>) -> Result<Option<u8>, ApiValidationError> {
    rating.map(validate_rating).transpose()
}
