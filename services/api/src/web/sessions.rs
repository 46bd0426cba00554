//! services/api/src/web/sessions.rs
//!
//! `GET /sessions?action=…`: the endpoint session-viewer pages use to gate
//! playback, buy sessions and browse the catalog.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tutoring_core::domain::{SessionFilter, SessionRecord, SessionStats, SessionStatus};
use tutoring_core::entitlement::Entitlement;
use tutoring_core::ports::PortError;
use tutoring_core::routing::{normalize_grade, normalize_subject};
use tutoring_core::service::{AttendanceOutcome, PurchaseOutcome, SessionTarget};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::rest::{bad_request, optional, required, service_failure, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Query Parameters
//=========================================================================================

/// Parameters are kept as strings so malformed values get a JSON 400 from us.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionsQuery {
    /// `check-access`, `purchase-session`, `mark-attendance`, `get`, `list` or `stats`.
    pub action: Option<String>,
    #[serde(alias = "sessionNumber")]
    pub session_number: Option<String>,
    /// Alternative to `session_number`; grade and subject then come from the catalog.
    #[serde(alias = "sessionId")]
    pub session_id: Option<String>,
    pub phone: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
    /// Catalog id for `action=get`.
    pub id: Option<String>,
    /// `published` or `draft`; both when omitted.
    pub status: Option<String>,
    #[serde(alias = "includeInactive")]
    pub include_inactive: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub name: String,
    pub subject: String,
    pub grade: String,
    pub balance: i64,
    pub payment_amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckAccessResponse {
    pub success: bool,
    pub has_access: bool,
    pub message: String,
    pub session_number: Option<u32>,
    /// The student can afford the session and may call `purchase-session`.
    pub can_purchase: bool,
    pub attendance_marked: bool,
    pub student: Option<StudentSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub success: bool,
    pub marked: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    pub video_id: Option<String>,
    pub title: String,
    pub description: String,
    pub source: String,
    pub url: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub session_number: u32,
    pub access_control: String,
    pub grade: String,
    pub subject: String,
    pub title: String,
    pub description: String,
    pub videos: Vec<VideoView>,
    pub is_active: bool,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SessionRecord> for SessionView {
    fn from(session: SessionRecord) -> Self {
        Self {
            id: session.id,
            session_number: session.session_number,
            access_control: session.access_control.as_str().to_string(),
            grade: session.grade,
            subject: session.subject,
            title: session.title,
            description: session.description,
            videos: session
                .videos
                .into_iter()
                .map(|v| VideoView {
                    video_id: v.video_id,
                    title: v.title,
                    description: v.description,
                    source: v.source.as_str().to_string(),
                    url: v.url,
                    file_path: v.file_path,
                })
                .collect(),
            is_active: session.is_active,
            is_published: session.is_published,
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub success: bool,
    pub session: SessionView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub success: bool,
    pub sessions: Vec<SessionView>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total_sessions: u64,
    pub published_sessions: u64,
    pub draft_sessions: u64,
}

impl From<SessionStats> for StatsView {
    fn from(stats: SessionStats) -> Self {
        Self {
            total_sessions: stats.total,
            published_sessions: stats.published,
            draft_sessions: stats.draft,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatsResponse {
    pub success: bool,
    pub stats: StatsView,
}

//=========================================================================================
// Handler
//=========================================================================================

/// Session access, purchase, attendance and catalog queries.
///
/// Every business outcome, including denial, is a 200 response. 400 means the
/// request itself was malformed; 500 means the store failed.
#[utoipa::path(
    get,
    path = "/sessions",
    params(SessionsQuery),
    responses(
        (status = 200, description = "check-access result", body = CheckAccessResponse),
        (status = 400, description = "Missing or invalid parameter, or unknown action", body = crate::web::rest::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::web::rest::ErrorResponse)
    )
)]
pub async fn sessions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionsQuery>,
) -> Result<Response, HandlerError> {
    match optional(&query.action) {
        Some("check-access") => check_access(&state, &query).await.map(IntoResponse::into_response),
        Some("purchase-session") => purchase_session(&state, &query)
            .await
            .map(IntoResponse::into_response),
        Some("mark-attendance") => mark_attendance(&state, &query)
            .await
            .map(IntoResponse::into_response),
        Some("get") => get_session(&state, &query).await.map(IntoResponse::into_response),
        Some("list") | Some("all") => list_sessions(&state, &query)
            .await
            .map(IntoResponse::into_response),
        Some("stats") => session_stats(&state).await.map(IntoResponse::into_response),
        _ => Err(bad_request("Invalid action")),
    }
}

/// Builds the session target. A missing grade or subject is rejected rather than guessed.
fn session_target(query: &SessionsQuery) -> Result<SessionTarget, HandlerError> {
    if let Some(id) = optional(&query.session_id) {
        let id = Uuid::parse_str(id).map_err(|_| bad_request("Invalid session_id format"))?;
        return Ok(SessionTarget::ById(id));
    }

    let number = required(&query.session_number, "session_number")?;
    let session_number = number
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0 && i32::try_from(*n).is_ok())
        .ok_or_else(|| bad_request("session_number must be a positive integer"))?;
    let grade = required(&query.grade, "grade")?;
    let subject = required(&query.subject, "subject")?;

    Ok(SessionTarget::ByNumber {
        grade: grade.to_string(),
        subject: subject.to_string(),
        session_number,
    })
}

async fn check_access(
    state: &AppState,
    query: &SessionsQuery,
) -> Result<Json<CheckAccessResponse>, HandlerError> {
    let phone = required(&query.phone, "phone")?;
    let target = session_target(query)?;

    let report = state
        .access
        .check_access(phone, &target)
        .await
        .map_err(service_failure)?;

    let student = report.student.map(|located| StudentSummary {
        name: located.record.student_name,
        subject: located.record.subject,
        grade: located.record.grade,
        balance: located.record.balance,
        payment_amount: located.record.payment_amount,
    });

    Ok(Json(CheckAccessResponse {
        success: true,
        has_access: report.entitlement.has_access(),
        message: report.entitlement.message(),
        session_number: report.session_number,
        can_purchase: report.entitlement.can_purchase(),
        attendance_marked: report.attendance_marked,
        student,
    }))
}

async fn purchase_session(
    state: &AppState,
    query: &SessionsQuery,
) -> Result<Json<PurchaseResponse>, HandlerError> {
    let phone = required(&query.phone, "phone")?;
    let target = session_target(query)?;

    let outcome = state
        .access
        .purchase_session(phone, &target)
        .await
        .map_err(service_failure)?;

    let (new_balance, balance, cost) = match &outcome {
        PurchaseOutcome::Purchased(receipt) => (Some(receipt.new_balance), None, None),
        PurchaseOutcome::InsufficientBalance { balance, cost } => (None, Some(*balance), Some(*cost)),
        _ => (None, None, None),
    };

    Ok(Json(PurchaseResponse {
        success: outcome.is_success(),
        message: outcome.message(),
        new_balance,
        balance,
        cost,
    }))
}

async fn mark_attendance(
    state: &AppState,
    query: &SessionsQuery,
) -> Result<Json<AttendanceResponse>, HandlerError> {
    let phone = required(&query.phone, "phone")?;
    let target = session_target(query)?;

    let outcome = state
        .access
        .mark_attendance(phone, &target)
        .await
        .map_err(service_failure)?;

    let response = match outcome {
        AttendanceOutcome::Marked => AttendanceResponse {
            success: true,
            marked: true,
            message: "Attendance recorded".to_string(),
        },
        AttendanceOutcome::AlreadyMarked => AttendanceResponse {
            success: true,
            marked: false,
            message: "Attendance already recorded".to_string(),
        },
        AttendanceOutcome::NotEntitled(entitlement) => AttendanceResponse {
            success: false,
            marked: false,
            message: match entitlement {
                Entitlement::PurchaseAvailable { .. } | Entitlement::InsufficientBalance { .. } => {
                    "Session not purchased".to_string()
                }
                other => other.message(),
            },
        },
    };
    Ok(Json(response))
}

async fn get_session(
    state: &AppState,
    query: &SessionsQuery,
) -> Result<Response, HandlerError> {
    let id = required(&query.id, "id")?;
    let id = Uuid::parse_str(id).map_err(|_| bad_request("Invalid id format"))?;

    match state.db.get_session_by_id(id).await {
        Ok(session) => Ok(Json(SessionResponse {
            success: true,
            session: session.into(),
        })
        .into_response()),
        Err(PortError::NotFound(_)) => Ok(Json(crate::web::rest::ErrorResponse {
            success: false,
            message: "Session not found".to_string(),
        })
        .into_response()),
        Err(e) => Err(service_failure(e.into())),
    }
}

async fn list_sessions(
    state: &AppState,
    query: &SessionsQuery,
) -> Result<Json<SessionListResponse>, HandlerError> {
    let parse_count = |value: &Option<String>, name: &str| -> Result<Option<u32>, HandlerError> {
        optional(value)
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| bad_request(format!("{} must be a non-negative integer", name)))
            })
            .transpose()
    };

    let status = optional(&query.status)
        .map(|v| {
            SessionStatus::parse(&v.to_ascii_lowercase())
                .ok_or_else(|| bad_request("status must be 'published' or 'draft'"))
        })
        .transpose()?;

    let filter = SessionFilter {
        grade: optional(&query.grade).map(normalize_grade),
        subject: optional(&query.subject).map(normalize_subject),
        status,
        include_inactive: optional(&query.include_inactive) == Some("true"),
        limit: parse_count(&query.limit, "limit")?,
        skip: parse_count(&query.skip, "skip")?,
    };

    let sessions = state
        .db
        .list_sessions(&filter)
        .await
        .map_err(|e| service_failure(e.into()))?;
    let sessions: Vec<SessionView> = sessions.into_iter().map(SessionView::from).collect();

    Ok(Json(SessionListResponse {
        success: true,
        count: sessions.len(),
        sessions,
    }))
}

async fn session_stats(state: &AppState) -> Result<Json<SessionStatsResponse>, HandlerError> {
    let stats = state
        .db
        .session_stats()
        .await
        .map_err(|e| service_failure(e.into()))?;
    Ok(Json(SessionStatsResponse {
        success: true,
        stats: stats.into(),
    }))
}
