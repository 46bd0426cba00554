//! crates/tutoring_core/src/entitlement.rs
//!
//! Decides whether a student may view a session. Pure: no I/O, no clock.

use crate::domain::{AccessControl, SessionRecord, StudentRecord};

/// The outcome of an access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    /// Free session; anyone may watch.
    Free,
    /// Restricted session already purchased by the student.
    Purchased,
    /// No session with that number in the requested scope.
    SessionNotFound,
    /// Restricted session and no active record for the phone in that subject.
    NotEnrolled,
    /// Restricted, not purchased, and the balance does not cover the cost.
    InsufficientBalance { balance: i64, cost: i64 },
    /// Restricted, not purchased, but the student can buy it now.
    PurchaseAvailable { balance: i64, cost: i64 },
}

impl Entitlement {
    pub fn has_access(&self) -> bool {
        matches!(self, Entitlement::Free | Entitlement::Purchased)
    }

    pub fn can_purchase(&self) -> bool {
        matches!(self, Entitlement::PurchaseAvailable { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Entitlement::Free => "Access granted (free session)".to_string(),
            Entitlement::Purchased => "Access granted".to_string(),
            Entitlement::SessionNotFound => "Session not found".to_string(),
            Entitlement::NotEnrolled => {
                "Student not found or not enrolled in this subject".to_string()
            }
            Entitlement::InsufficientBalance { balance, cost } => format!(
                "Insufficient balance. You need {} EGP but only have {} EGP.",
                cost, balance
            ),
            Entitlement::PurchaseAvailable { balance, cost } => format!(
                "No subscription for this session. It costs {} EGP and your balance is {} EGP.",
                cost, balance
            ),
        }
    }
}

/// Evaluates access to `session` for the record located for the caller's
/// phone in the session's subject, if any.
pub fn evaluate(session: &SessionRecord, student: Option<&StudentRecord>) -> Entitlement {
    if session.access_control == AccessControl::Free {
        return Entitlement::Free;
    }

    let student = match student {
        Some(student) if student.is_active => student,
        _ => return Entitlement::NotEnrolled,
    };

    if student.has_purchased(session.session_number) {
        return Entitlement::Purchased;
    }

    let (balance, cost) = (student.balance, student.payment_amount);
    if student.can_afford() {
        Entitlement::PurchaseAvailable { balance, cost }
    } else {
        Entitlement::InsufficientBalance { balance, cost }
    }
}
