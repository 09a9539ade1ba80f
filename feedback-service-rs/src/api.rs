// feedback-service-rs/src/api.rs
//
// HTTP surface: review submission, review listing and health.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::generator::FeedbackGenerator;
use crate::store::{NewReview, Review, ReviewStore, StoreError};
use crate::validation::{
    validate_rating_filter, validate_submission, ApiValidationError, SubmitReviewRequest,
};

// Track service start time for uptime reporting
static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitReviewResponse {
    pub status: String,
    pub ai_response: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub rating: Option<i64>,
}

/// One entry of `GET /get-reviews`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewListing {
    pub rating: u8,
    pub review_text: String,
    pub ai_summary: String,
    pub ai_recommended_action: String,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for ReviewListing {
    fn from(review: Review) -> Self {
        Self {
            rating: review.rating,
            review_text: review.review_text,
            ai_summary: review.ai_summary,
            ai_recommended_action: review.ai_recommended_action,
            created_at: review.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewsResponse {
    pub reviews: Vec<ReviewListing>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// Errors a handler can surface to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ApiValidationError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => {
                tracing::info!("Rejected request: {}", err);
                err.to_response().into_response()
            }
            ApiError::Storage(err) => {
                // Detail stays in the log.
                tracing::error!("Storage failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                        code: 500,
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Process-scoped state shared by all handlers.
pub struct FeedbackApi {
    config: ServiceConfig,
    generator: FeedbackGenerator,
    store: ReviewStore,
}

impl FeedbackApi {
    pub fn new(config: ServiceConfig, generator: FeedbackGenerator, store: ReviewStore) -> Self {
        Lazy::force(&START_TIME);
        Self {
            config,
            generator,
            store,
        }
    }

    /// Create the Axum router with all routes and middleware
    pub fn create_router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/", get(Self::root_handler))
            .route("/health", get(Self::health_handler))
            .route("/submit-review", post(Self::submit_review_handler))
            .route("/get-reviews", get(Self::get_reviews_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .with_state(self)
    }

    async fn root_handler() -> impl IntoResponse {
        Json(serde_json::json!({
            "service": "Review Feedback Service",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": [
                "GET /health",
                "POST /submit-review",
                "GET /get-reviews"
            ]
        }))
    }

    async fn health_handler(State(state): State<Arc<Self>>) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "healthy".to_string(),
            provider: state.config.provider_name().to_string(),
            timestamp: Utc::now(),
            uptime_seconds: START_TIME.elapsed().as_secs(),
        })
    }

    async fn submit_review_handler(
        State(state): State<Arc<Self>>,
        payload: Result<Json<SubmitReviewRequest>, JsonRejection>,
    ) -> Result<Json<SubmitReviewResponse>, ApiError> {
        let Json(request) =
            payload.map_err(|e| ApiValidationError::InvalidFormat(e.body_text()))?;
        let submission = validate_submission(&request, state.config.max_review_length)?;

        tracing::info!(
            "Submit review: rating={}, text length={}",
            submission.rating,
            submission.review_text.len()
        );

        let feedback = state
            .generator
            .generate(submission.rating, &submission.review_text)
            .await;
        let ai_response = feedback.customer_reply.clone();

        let review = state
            .store
            .insert_async(NewReview {
                rating: submission.rating,
                review_text: submission.review_text,
                feedback,
            })
            .await?;
        tracing::debug!("Stored review {}", review.id);

        Ok(Json(SubmitReviewResponse {
            status: "success".to_string(),
            ai_response,
        }))
    }

    async fn get_reviews_handler(
        State(state): State<Arc<Self>>,
        query: Result<Query<ReviewQuery>, QueryRejection>,
    ) -> Result<Json<ReviewsResponse>, ApiError> {
        let Query(query) = query.map_err(|e| ApiValidationError::InvalidFormat(e.body_text()))?;
        let rating = validate_rating_filter(query.rating)?;

        let reviews = state.store.list_async(rating).await?;
        tracing::debug!("Returning {} reviews (filter: {:?})", reviews.len(), rating);

        Ok(Json(ReviewsResponse {
            reviews: reviews.into_iter().map(ReviewListing::from).collect(),
        }))
    }
}
