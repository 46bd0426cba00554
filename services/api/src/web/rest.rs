//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification and the error
//! payload shared by all REST handlers.

use axum::{http::StatusCode, response::Json};
use serde::Serialize;
use tracing::error;
use tutoring_core::service::ServiceError;
use utoipa::{OpenApi, ToSchema};

use crate::web::{health, sessions, students};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        sessions::sessions_handler,
        students::students_handler,
        health::health_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            sessions::CheckAccessResponse,
            sessions::StudentSummary,
            sessions::PurchaseResponse,
            sessions::AttendanceResponse,
            sessions::SessionView,
            sessions::VideoView,
            sessions::SessionResponse,
            sessions::SessionListResponse,
            sessions::SessionStatsResponse,
            sessions::StatsView,
            students::OverviewResponse,
            students::EnrollmentView,
            health::HealthResponse,
        )
    ),
    tags(
        (name = "Tutoring Access API", description = "Session access checks, purchases and attendance for recorded sessions.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Payload
//=========================================================================================

/// Body of every 4xx/5xx response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn bad_request(message: impl Into<String>) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

pub fn internal_error(message: impl Into<String>) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

/// Validation failures are the caller's fault; everything else is a storage failure.
pub fn service_failure(e: ServiceError) -> HandlerError {
    match e {
        ServiceError::Validation(message) => bad_request(message),
        ServiceError::Port(e) => {
            error!("Storage operation failed: {:?}", e);
            internal_error("A system error occurred. Please try again.")
        }
    }
}

/// Returns the trimmed value of a required query parameter.
pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, HandlerError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request(format!("Missing required parameter: {}", name)))
}

/// Returns the trimmed value of an optional query parameter, treating blanks as absent.
pub fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
