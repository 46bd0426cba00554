//! services/api/src/web/students.rs
//!
//! `GET /students?action=overview`: every active enrollment of a phone number,
//! found by searching all subject collections of a grade.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tutoring_core::phone;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{bad_request, optional, required, service_failure, HandlerError};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StudentsQuery {
    /// Only `overview` is supported.
    pub action: Option<String>,
    pub phone: Option<String>,
    /// Restricts the search to one grade; all grades are searched when omitted.
    pub grade: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub grade: String,
    pub subject: String,
    pub collection: String,
    pub student_id: String,
    pub name: String,
    pub balance: i64,
    pub payment_amount: i64,
    pub purchased_sessions: Vec<u32>,
    pub attended_sessions: Vec<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverviewResponse {
    pub success: bool,
    pub phone: String,
    pub subjects: Vec<EnrollmentView>,
}

/// Account overview across subjects.
#[utoipa::path(
    get,
    path = "/students",
    params(StudentsQuery),
    responses(
        (status = 200, description = "Enrollments found for the phone (possibly none)", body = OverviewResponse),
        (status = 400, description = "Missing phone, unknown grade or unknown action", body = crate::web::rest::ErrorResponse),
        (status = 500, description = "Storage failure", body = crate::web::rest::ErrorResponse)
    )
)]
pub async fn students_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StudentsQuery>,
) -> Result<Json<OverviewResponse>, HandlerError> {
    if optional(&query.action) != Some("overview") {
        return Err(bad_request("Invalid action"));
    }
    let raw_phone = required(&query.phone, "phone")?;

    let enrollments = state
        .access
        .account_overview(raw_phone, optional(&query.grade))
        .await
        .map_err(service_failure)?;

    let subjects = enrollments
        .into_iter()
        .map(|(scope, located)| {
            let (grade, subject) = scope
                .split_once('/')
                .map(|(g, s)| (g.to_string(), s.to_string()))
                .unwrap_or_else(|| (located.record.grade.clone(), located.record.subject.clone()));
            let record = located.record;
            EnrollmentView {
                grade,
                subject,
                collection: located.collection,
                purchased_sessions: record
                    .sessions
                    .iter()
                    .filter(|(_, p)| p.online_session)
                    .map(|(n, _)| *n)
                    .collect(),
                attended_sessions: record
                    .sessions
                    .iter()
                    .filter(|(_, p)| p.online_attendance)
                    .map(|(n, _)| *n)
                    .collect(),
                student_id: record.student_id,
                name: record.student_name,
                balance: record.balance,
                payment_amount: record.payment_amount,
            }
        })
        .collect();

    Ok(Json(OverviewResponse {
        success: true,
        phone: phone::normalize(raw_phone),
        subjects,
    }))
}
