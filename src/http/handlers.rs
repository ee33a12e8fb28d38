//! Request handlers for the intake API.
//!
//! Every error body is `{"message": ...}`. Validation failures map to
//! `422`, unknown inquiries and records to `404`, everything else to `500`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::AppState;
use crate::intake::validation::SubmittedItem;
use crate::models::catalog::CatalogRecord;
use crate::models::inquiry::{Inquiry, InquiryStatus};
use crate::pipeline::queue::FailedJob;
use crate::AppError;

const INVALID_BODY: &str = "The given data was invalid.";

/// Error wrapper that renders an [`AppError`] as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => {
                error!(err = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process request.".to_owned(),
                )
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn invalid_body(rejection: &JsonRejection) -> ApiError {
    debug!(%rejection, "rejected request body");
    ApiError(AppError::Validation(INVALID_BODY.into()))
}

/// Body of the activation endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RefRequest {
    /// Record to toggle.
    #[serde(rename = "ref", default)]
    pub item_ref: Option<String>,
}

/// Inquiry representation returned by `GET /inquiries/{id}`.
#[derive(Debug, Serialize)]
pub struct InquirySummary {
    /// Inquiry identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: InquiryStatus,
    /// Number of submitted items.
    pub items_total_count: u32,
    /// Items upserted successfully.
    pub items_processed_count: u32,
    /// Items that failed permanently.
    pub items_failed_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<Inquiry> for InquirySummary {
    fn from(inquiry: Inquiry) -> Self {
        Self {
            id: inquiry.id,
            status: inquiry.status,
            items_total_count: inquiry.items_total_count,
            items_processed_count: inquiry.items_processed_count,
            items_failed_count: inquiry.items_failed_count,
            created_at: inquiry.created_at,
            updated_at: inquiry.updated_at,
        }
    }
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /inquiries`
pub async fn submit_inquiry(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<Vec<SubmittedItem>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(items) = payload.map_err(|rejection| invalid_body(&rejection))?;

    match state.intake.submit(items).await? {
        Some(inquiry) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "message": "Inquiry processed and jobs dispatched.",
                "inquiry_id": inquiry.id,
            })),
        )),
        None => Ok((
            StatusCode::OK,
            Json(json!({ "message": "No items submitted; nothing to process." })),
        )),
    }
}

/// `GET /inquiries/{id}`
pub async fn get_inquiry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<InquirySummary>> {
    let inquiry = state.intake.inquiry(&id).await?;
    Ok(Json(inquiry.into()))
}

/// `GET /records/{item_ref}`
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(item_ref): Path<String>,
) -> ApiResult<Json<CatalogRecord>> {
    Ok(Json(state.intake.record(&item_ref).await?))
}

/// `POST /records/activate`
pub async fn activate_record(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RefRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload.map_err(|rejection| invalid_body(&rejection))?;
    state.intake.activate(body.item_ref.as_deref()).await?;
    Ok(Json(json!({ "message": "Record activated successfully." })))
}

/// `POST /records/deactivate`
pub async fn deactivate_record(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RefRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload.map_err(|rejection| invalid_body(&rejection))?;
    state.intake.deactivate(body.item_ref.as_deref()).await?;
    Ok(Json(json!({ "message": "Record deactivated successfully." })))
}

/// `GET /jobs/failed`
pub async fn failed_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<FailedJob>> {
    Json(state.queue.failed_jobs())
}
