//! crates/tutoring_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    PurchaseReceipt, SessionFilter, SessionRecord, SessionStats, StudentRecord, TransactionRecord,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A stored record does not match the expected schema.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Student Records ---

    /// Returns the first active student in `collection` whose stored phone is
    /// one of `phones`.
    async fn find_active_student(
        &self,
        collection: &str,
        phones: &[String],
    ) -> PortResult<Option<StudentRecord>>;

    /// Atomically marks `session_number` as purchased and debits the payment
    /// amount, in one conditional write on a single record.
    ///
    /// The write only applies when the record is active, the session is not yet
    /// purchased, and `balance >= payment_amount`. Returns `None` when no record
    /// was modified.
    async fn purchase_session(
        &self,
        collection: &str,
        phones: &[String],
        session_number: u32,
        purchased_at: DateTime<Utc>,
    ) -> PortResult<Option<PurchaseReceipt>>;

    /// Atomically marks attendance for `session_number`.
    ///
    /// Applies only when attendance is not yet marked and the session is
    /// purchased, or `grant` is set (free sessions), in which case the session is
    /// flagged as granted in the same write. Returns whether a record changed.
    async fn mark_attendance(
        &self,
        collection: &str,
        phones: &[String],
        session_number: u32,
        grant: bool,
        completed_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    // --- Session Catalog ---

    /// Finds the active session with `session_number` in a (grade, subject) scope.
    async fn find_session(
        &self,
        grade: &str,
        subject: &str,
        session_number: u32,
    ) -> PortResult<Option<SessionRecord>>;

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<SessionRecord>;

    /// Lists catalog sessions, newest first.
    async fn list_sessions(&self, filter: &SessionFilter) -> PortResult<Vec<SessionRecord>>;

    /// Published and draft counts over active sessions.
    async fn session_stats(&self) -> PortResult<SessionStats>;

    // --- Ledger ---

    async fn append_transaction(&self, transaction: TransactionRecord) -> PortResult<()>;

    // --- Health ---

    async fn ping(&self) -> PortResult<()>;
}
