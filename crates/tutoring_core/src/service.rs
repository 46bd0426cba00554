//! crates/tutoring_core/src/service.rs
//!
//! The session-access workflow: resolve the session, locate the student, evaluate
//! entitlement, and run the purchase and attendance writes.
//!
//! All state changes go through the store's single-record conditional writes, so
//! this service holds no locks and is safe to call concurrently from any number of
//! request handlers.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{AccessControl, LocatedStudent, PurchaseReceipt, SessionRecord, TransactionRecord};
use crate::entitlement::{self, Entitlement};
use crate::locator::StudentLocator;
use crate::phone::PhoneVariants;
use crate::ports::{DatabaseService, PortError};
use crate::routing::{Route, RoutingTable};

/// How many times a purchase re-attempts the conditional write after losing a race
/// that the re-read could not explain.
const MAX_PURCHASE_ATTEMPTS: usize = 3;

//=========================================================================================
// Errors and Outcomes
//=========================================================================================

/// Failures of the workflow. Business outcomes are never errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request cannot be interpreted (e.g. unknown grade/subject pair).
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Identifies the session a request is about.
#[derive(Debug, Clone)]
pub enum SessionTarget {
    ByNumber {
        grade: String,
        subject: String,
        session_number: u32,
    },
    /// Grade and subject are taken from the catalog record.
    ById(Uuid),
}

/// The result of an access check.
#[derive(Debug, Clone)]
pub struct AccessReport {
    pub session_number: Option<u32>,
    pub entitlement: Entitlement,
    pub student: Option<LocatedStudent>,
    /// Whether this call recorded attendance. `false` when it was already recorded.
    pub attendance_marked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased(PurchaseReceipt),
    AlreadyPurchased,
    /// The session is free; nothing was debited.
    FreeSession,
    InsufficientBalance { balance: i64, cost: i64 },
    StudentNotFound,
    SessionNotFound,
}

impl PurchaseOutcome {
    /// Whether the caller now has access to the session.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PurchaseOutcome::Purchased(_)
                | PurchaseOutcome::AlreadyPurchased
                | PurchaseOutcome::FreeSession
        )
    }

    pub fn message(&self) -> String {
        match self {
            PurchaseOutcome::Purchased(_) => "Session purchased successfully!".to_string(),
            PurchaseOutcome::AlreadyPurchased => "Session already purchased".to_string(),
            PurchaseOutcome::FreeSession => "This session is free; no purchase needed".to_string(),
            PurchaseOutcome::InsufficientBalance { balance, cost } => format!(
                "Insufficient balance. You need {} EGP but only have {} EGP.",
                cost, balance
            ),
            PurchaseOutcome::StudentNotFound => {
                "You are not enrolled in this subject. Please contact support.".to_string()
            }
            PurchaseOutcome::SessionNotFound => "Session not found".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceOutcome {
    Marked,
    AlreadyMarked,
    /// The student may not watch the session, so attendance cannot be recorded.
    NotEntitled(Entitlement),
}

//=========================================================================================
// AccessService
//=========================================================================================

#[derive(Clone)]
pub struct AccessService {
    db: Arc<dyn DatabaseService>,
    locator: StudentLocator,
}

/// A resolved session together with the collection its students live in.
struct ResolvedSession {
    session: SessionRecord,
    route: Route,
}

impl AccessService {
    pub fn new(db: Arc<dyn DatabaseService>, routes: Arc<RoutingTable>) -> Self {
        let locator = StudentLocator::new(db.clone(), routes);
        Self { db, locator }
    }

    pub fn locator(&self) -> &StudentLocator {
        &self.locator
    }

    /// Resolves the route and catalog record. `Ok(None)` means the session does not exist.
    async fn resolve(&self, target: &SessionTarget) -> ServiceResult<Option<ResolvedSession>> {
        match target {
            SessionTarget::ByNumber {
                grade,
                subject,
                session_number,
            } => {
                let route = self.route_for(grade, subject)?;
                let session = self
                    .db
                    .find_session(&route.grade, &route.subject, *session_number)
                    .await?;
                Ok(session.map(|session| ResolvedSession { session, route }))
            }
            SessionTarget::ById(id) => {
                let session = match self.db.get_session_by_id(*id).await {
                    Ok(session) => session,
                    Err(PortError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let route = self.route_for(&session.grade, &session.subject)?;
                Ok(Some(ResolvedSession { session, route }))
            }
        }
    }

    fn route_for(&self, grade: &str, subject: &str) -> ServiceResult<Route> {
        self.locator
            .routes()
            .resolve(grade, subject)
            .cloned()
            .ok_or_else(|| {
                ServiceError::Validation(format!("Invalid subject or grade ({} / {})", grade, subject))
            })
    }

    /// Evaluates access and, when granted to a known student, records attendance.
    pub async fn check_access(&self, phone: &str, target: &SessionTarget) -> ServiceResult<AccessReport> {
        let phones = PhoneVariants::from_input(phone);
        let Some(resolved) = self.resolve(target).await? else {
            debug!(?target, "Session not found in catalog");
            return Ok(AccessReport {
                session_number: target_number(target),
                entitlement: Entitlement::SessionNotFound,
                student: None,
                attendance_marked: false,
            });
        };

        let student = self.locator.locate(&phones, &resolved.route).await?;
        let entitlement = entitlement::evaluate(&resolved.session, student.as_ref().map(|s| &s.record));
        info!(
            phone = %phones.masked(),
            collection = %resolved.route.collection,
            session_number = resolved.session.session_number,
            ?entitlement,
            "Access evaluated"
        );

        let mut attendance_marked = false;
        if entitlement.has_access() && student.is_some() {
            // Viewing must not fail because the attendance write did.
            match self.record_attendance(&phones, &resolved).await {
                Ok(marked) => attendance_marked = marked,
                Err(e) => warn!("Failed to record attendance: {:?}", e),
            }
        }

        Ok(AccessReport {
            session_number: Some(resolved.session.session_number),
            entitlement,
            student,
            attendance_marked,
        })
    }

    /// Explicitly records attendance for a session the student may watch.
    pub async fn mark_attendance(&self, phone: &str, target: &SessionTarget) -> ServiceResult<AttendanceOutcome> {
        let phones = PhoneVariants::from_input(phone);
        let Some(resolved) = self.resolve(target).await? else {
            return Ok(AttendanceOutcome::NotEntitled(Entitlement::SessionNotFound));
        };

        let student = self.locator.locate(&phones, &resolved.route).await?;
        let entitlement = entitlement::evaluate(&resolved.session, student.as_ref().map(|s| &s.record));
        if student.is_none() {
            return Ok(AttendanceOutcome::NotEntitled(Entitlement::NotEnrolled));
        }
        if !entitlement.has_access() {
            return Ok(AttendanceOutcome::NotEntitled(entitlement));
        }

        if self.record_attendance(&phones, &resolved).await? {
            Ok(AttendanceOutcome::Marked)
        } else {
            Ok(AttendanceOutcome::AlreadyMarked)
        }
    }

    async fn record_attendance(&self, phones: &PhoneVariants, resolved: &ResolvedSession) -> ServiceResult<bool> {
        let grant = resolved.session.access_control == AccessControl::Free;
        let marked = self
            .db
            .mark_attendance(
                &resolved.route.collection,
                phones.as_slice(),
                resolved.session.session_number,
                grant,
                Utc::now(),
            )
            .await?;
        if marked {
            info!(
                phone = %phones.masked(),
                session_number = resolved.session.session_number,
                "Attendance recorded"
            );
        }
        Ok(marked)
    }

    /// Buys a restricted session for the student, at most once.
    ///
    /// The conditional write in the store is the single source of truth for whether
    /// the purchase happened. The ledger entry is appended afterwards and a failure
    /// to append does not undo or fail the purchase.
    pub async fn purchase_session(&self, phone: &str, target: &SessionTarget) -> ServiceResult<PurchaseOutcome> {
        let phones = PhoneVariants::from_input(phone);
        let Some(resolved) = self.resolve(target).await? else {
            return Ok(PurchaseOutcome::SessionNotFound);
        };
        if resolved.session.access_control == AccessControl::Free {
            return Ok(PurchaseOutcome::FreeSession);
        }
        if phones.is_empty() {
            return Ok(PurchaseOutcome::StudentNotFound);
        }

        let collection = &resolved.route.collection;
        let session_number = resolved.session.session_number;

        for attempt in 1..=MAX_PURCHASE_ATTEMPTS {
            let receipt = self
                .db
                .purchase_session(collection, phones.as_slice(), session_number, Utc::now())
                .await?;

            if let Some(receipt) = receipt {
                info!(
                    student_id = %receipt.student_id,
                    collection = %collection,
                    session_number,
                    previous_balance = receipt.previous_balance,
                    new_balance = receipt.new_balance,
                    "Session purchased"
                );
                let transaction = TransactionRecord::session_purchase(collection, session_number, &receipt);
                if let Err(e) = self.db.append_transaction(transaction).await {
                    error!(
                        student_id = %receipt.student_id,
                        session_number,
                        "Failed to append purchase to ledger: {:?}",
                        e
                    );
                }
                return Ok(PurchaseOutcome::Purchased(receipt));
            }

            // Nothing was modified; find out why from the current state.
            let current = self
                .db
                .find_active_student(collection, phones.as_slice())
                .await?;
            match current {
                None => return Ok(PurchaseOutcome::StudentNotFound),
                Some(student) if student.has_purchased(session_number) => {
                    debug!(student_id = %student.student_id, session_number, "Session already purchased");
                    return Ok(PurchaseOutcome::AlreadyPurchased);
                }
                Some(student) if !student.can_afford() => {
                    return Ok(PurchaseOutcome::InsufficientBalance {
                        balance: student.balance,
                        cost: student.payment_amount,
                    });
                }
                Some(student) => {
                    warn!(
                        student_id = %student.student_id,
                        session_number,
                        attempt,
                        "Purchase write lost a race; retrying"
                    );
                }
            }
        }

        Err(PortError::Conflict(format!(
            "purchase of session {} in {} did not settle after {} attempts",
            session_number, collection, MAX_PURCHASE_ATTEMPTS
        ))
        .into())
    }

    /// Every active enrollment of a phone number, keyed by `grade/subject`.
    pub async fn account_overview(
        &self,
        phone: &str,
        grade: Option<&str>,
    ) -> ServiceResult<BTreeMap<String, LocatedStudent>> {
        let phones = PhoneVariants::from_input(phone);
        if let Some(grade) = grade {
            if self.locator.routes().routes_for(Some(grade)).is_empty() {
                return Err(ServiceError::Validation(format!("Unknown grade: {}", grade)));
            }
        }
        Ok(self.locator.locate_all(&phones, grade).await?)
    }
}

fn target_number(target: &SessionTarget) -> Option<u32> {
    match target {
        SessionTarget::ByNumber { session_number, .. } => Some(*session_number),
        SessionTarget::ById(_) => None,
    }
}
