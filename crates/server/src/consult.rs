//! Consult HTTP routes.
//!
//! - `POST /api/v1/consults`              - submit preferences, answers `202` with the new consult
//! - `GET  /api/v1/consults/{consult_id}` - current state of a consult
//!
//! Submission never waits for recommendation generation; clients poll the GET route until the
//! status is `completed` or `failed`.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use buycar_core::{ApplicationError, Consult, ConsultPreferences, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::lifecycle::ConsultLifecycle;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Default, Deserialize)]
pub struct ConsultRequest {
    pub budget_range: Option<String>,
    pub preferred_type: Option<String>,
    pub use_case: Option<String>,
    pub fuel_type: Option<String>,
    pub brand_preference: Option<String>,
}

impl From<ConsultRequest> for ConsultPreferences {
    fn from(request: ConsultRequest) -> Self {
        Self {
            budget_range: request.budget_range,
            preferred_type: request.preferred_type,
            use_case: request.use_case,
            fuel_type: request.fuel_type,
            brand_preference: request.brand_preference,
        }
    }
}

/// Wire shape of a consult. Timestamps are unix seconds; the user id is rendered as a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsultView {
    pub consult_id: String,
    pub user_id: Option<String>,
    pub budget_range: Option<String>,
    pub preferred_type: Option<String>,
    pub use_case: Option<String>,
    pub fuel_type: Option<String>,
    pub brand_preference: Option<String>,
    pub llm_model: Option<String>,
    pub llm_prompt: Option<String>,
    pub llm_response: Option<String>,
    pub recommendations: Option<String>,
    pub status: &'static str,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Consult> for ConsultView {
    fn from(consult: Consult) -> Self {
        Self {
            consult_id: consult.id.0,
            user_id: consult.user_id.map(|id| id.to_string()),
            budget_range: consult.preferences.budget_range,
            preferred_type: consult.preferences.preferred_type,
            use_case: consult.preferences.use_case,
            fuel_type: consult.preferences.fuel_type,
            brand_preference: consult.preferences.brand_preference,
            llm_model: consult.generation.llm_model,
            llm_prompt: consult.generation.llm_prompt,
            llm_response: consult.generation.llm_response,
            recommendations: consult.generation.recommendations,
            status: consult.status.as_str(),
            created_at: consult.created_at.timestamp(),
            updated_at: consult.updated_at.timestamp(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

/// Interface error rendered as `{error, correlation_id}` with the matching status code.
#[derive(Debug)]
pub struct ApiFailure(pub InterfaceError);

impl ApiFailure {
    fn from_application(error: ApplicationError, route: &'static str) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        warn!(
            event_name = "consult.request.rejected",
            correlation_id = %correlation_id,
            route,
            error = %error,
            "consult request failed"
        );
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ApiError {
            error: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(lifecycle: ConsultLifecycle) -> Router {
    Router::new()
        .route("/api/v1/consults", post(submit_consult))
        .route("/api/v1/consults/{consult_id}", get(get_consult))
        .with_state(lifecycle)
}

pub async fn submit_consult(
    State(lifecycle): State<ConsultLifecycle>,
    headers: HeaderMap,
    Json(request): Json<ConsultRequest>,
) -> Result<(StatusCode, Json<ConsultView>), ApiFailure> {
    const ROUTE: &str = "POST /api/v1/consults";

    let user_id = requester(&headers).map_err(|error| ApiFailure::from_application(error, ROUTE))?;
    let consult = lifecycle
        .submit(request.into(), user_id)
        .await
        .map_err(|error| ApiFailure::from_application(error, ROUTE))?;

    Ok((StatusCode::ACCEPTED, Json(consult.into())))
}

pub async fn get_consult(
    State(lifecycle): State<ConsultLifecycle>,
    Path(consult_id): Path<String>,
) -> Result<Json<ConsultView>, ApiFailure> {
    lifecycle
        .query_by_id(&consult_id)
        .await
        .map(|consult| Json(consult.into()))
        .map_err(|error| ApiFailure::from_application(error, "GET /api/v1/consults/{consult_id}"))
}

/// Absent or blank header means an anonymous requester.
fn requester(headers: &HeaderMap) -> Result<Option<i64>, ApplicationError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let raw = value.to_str().map_err(|_| {
        ApplicationError::Validation(format!("{USER_ID_HEADER} must be visible ASCII"))
    })?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<i64>().map(Some).map_err(|_| {
        ApplicationError::Validation(format!("{USER_ID_HEADER} `{raw}` is not an integer"))
    })
}
