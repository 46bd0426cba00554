//! crates/tutoring_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

//=========================================================================================
// Students
//=========================================================================================

/// Per-session progress stored on a student record (`session_<N>` in the documents).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionProgress {
    /// Purchased or granted.
    pub online_session: bool,
    pub purchased_at: Option<DateTime<Utc>>,
    pub online_attendance: bool,
    pub online_attendance_completed_at: Option<DateTime<Utc>>,
}

/// A student's enrollment in one subject collection.
///
/// There is no global student entity: the same phone number may own one
/// record per subject, each with its own balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub student_id: String,
    pub phone: String,
    pub student_name: String,
    pub grade: String,
    pub subject: String,
    pub balance: i64,
    pub payment_amount: i64,
    pub is_active: bool,
    pub sessions: BTreeMap<u32, SessionProgress>,
}

impl StudentRecord {
    pub fn progress(&self, session_number: u32) -> Option<&SessionProgress> {
        self.sessions.get(&session_number)
    }

    pub fn has_purchased(&self, session_number: u32) -> bool {
        self.progress(session_number)
            .map(|p| p.online_session)
            .unwrap_or(false)
    }

    pub fn has_attended(&self, session_number: u32) -> bool {
        self.progress(session_number)
            .map(|p| p.online_attendance)
            .unwrap_or(false)
    }

    /// A negative price never counts as affordable.
    pub fn can_afford(&self) -> bool {
        self.payment_amount >= 0 && self.balance >= self.payment_amount
    }
}

/// A student record together with the collection it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedStudent {
    pub collection: String,
    pub record: StudentRecord,
}

//=========================================================================================
// Session Catalog
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessControl {
    Free,
    Restricted,
}

impl AccessControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessControl::Free => "free",
            AccessControl::Restricted => "restricted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(AccessControl::Free),
            "restricted" => Some(AccessControl::Restricted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    Upload,
    Link,
}

impl VideoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoSource::Upload => "upload",
            VideoSource::Link => "link",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Video {
    pub video_id: Option<String>,
    pub title: String,
    pub description: String,
    pub source: VideoSource,
    pub url: Option<String>,
    pub file_path: Option<String>,
}

/// A recorded session in the catalog. `session_number` is unique within its
/// (grade, subject) scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub session_number: u32,
    pub access_control: AccessControl,
    pub grade: String,
    pub subject: String,
    pub title: String,
    pub description: String,
    pub videos: Vec<Video>,
    pub is_active: bool,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Publication state of a catalog session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Published,
    Draft,
}

impl SessionStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "published" => Some(SessionStatus::Published),
            "draft" => Some(SessionStatus::Draft),
            _ => None,
        }
    }

    pub fn matches(&self, session: &SessionRecord) -> bool {
        match self {
            SessionStatus::Published => session.is_published,
            SessionStatus::Draft => !session.is_published,
        }
    }
}

/// Filters for listing the catalog.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub grade: Option<String>,
    pub subject: Option<String>,
    /// `None` lists drafts and published sessions alike.
    pub status: Option<SessionStatus>,
    pub include_inactive: bool,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

/// Counts over the active catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total: u64,
    pub published: u64,
    pub draft: u64,
}

//=========================================================================================
// Ledger
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    SessionPurchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::SessionPurchase => "session_purchase",
        }
    }
}

/// The result of a successful conditional debit, read from the same write
/// that performed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub student_id: String,
    pub student_name: String,
    pub phone: String,
    pub amount: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub purchased_at: DateTime<Utc>,
}

/// An append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub phone: String,
    pub collection: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub note: String,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn session_purchase(collection: &str, session_number: u32, receipt: &PurchaseReceipt) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: receipt.student_id.clone(),
            student_name: receipt.student_name.clone(),
            phone: receipt.phone.clone(),
            collection: collection.to_string(),
            kind: TransactionKind::SessionPurchase,
            amount: receipt.amount,
            previous_balance: receipt.previous_balance,
            new_balance: receipt.new_balance,
            note: format!("Automatic purchase for Session #{} (Online)", session_number),
            recorded_by: "system_online_purchase".to_string(),
            created_at: receipt.purchased_at,
        }
    }
}
