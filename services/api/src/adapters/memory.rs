//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port, used for local
//! development (`DATABASE_URL=memory://`) and by the integration tests.
//!
//! Each conditional write evaluates its predicate and applies its update under one
//! mutex, which gives the same single-record atomicity as the PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use tutoring_core::domain::{
    PurchaseReceipt, SessionFilter, SessionRecord, SessionStats, StudentRecord, TransactionRecord,
};
use tutoring_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    /// `(collection, record)` in insertion order.
    students: Vec<(String, StudentRecord)>,
    sessions: Vec<SessionRecord>,
    transactions: Vec<TransactionRecord>,
    ledger_unavailable: bool,
}

impl MemoryState {
    /// The first active record in `collection` whose phone is one of `phones`.
    fn first_active_mut(&mut self, collection: &str, phones: &[String]) -> Option<&mut StudentRecord> {
        self.students
            .iter_mut()
            .filter(|(c, s)| c == collection && s.is_active && phones.contains(&s.phone))
            .map(|(_, s)| s)
            .next()
    }
}

#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<MemoryState>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| PortError::Unexpected("memory store lock poisoned".to_string()))
    }

    /// Inserts or replaces a student record in `collection`.
    /// Rejects records the PostgreSQL schema would reject (negative balance or price).
    pub fn insert_student(&self, collection: &str, record: StudentRecord) -> PortResult<()> {
        if record.balance < 0 || record.payment_amount < 0 {
            return Err(PortError::InvalidRecord(format!(
                "student {}: balance and payment amount must not be negative",
                record.student_id
            )));
        }
        let mut state = self.lock()?;
        let position = state
            .students
            .iter()
            .position(|(c, s)| c == collection && s.student_id == record.student_id);
        match position {
            Some(index) => state.students[index].1 = record,
            None => state.students.push((collection.to_string(), record)),
        }
        Ok(())
    }

    pub fn insert_session(&self, record: SessionRecord) -> PortResult<()> {
        let mut state = self.lock()?;
        state.sessions.retain(|s| s.id != record.id);
        state.sessions.push(record);
        Ok(())
    }

    pub fn student(&self, collection: &str, student_id: &str) -> PortResult<Option<StudentRecord>> {
        let state = self.lock()?;
        Ok(state
            .students
            .iter()
            .find(|(c, s)| c == collection && s.student_id == student_id)
            .map(|(_, s)| s.clone()))
    }

    pub fn transactions(&self) -> PortResult<Vec<TransactionRecord>> {
        Ok(self.lock()?.transactions.clone())
    }

    /// Makes ledger appends fail, to exercise the best-effort ledger path.
    pub fn set_ledger_unavailable(&self, unavailable: bool) -> PortResult<()> {
        self.lock()?.ledger_unavailable = unavailable;
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn find_active_student(
        &self,
        collection: &str,
        phones: &[String],
    ) -> PortResult<Option<StudentRecord>> {
        let mut state = self.lock()?;
        Ok(state.first_active_mut(collection, phones).map(|s| s.clone()))
    }

    async fn purchase_session(
        &self,
        collection: &str,
        phones: &[String],
        session_number: u32,
        purchased_at: DateTime<Utc>,
    ) -> PortResult<Option<PurchaseReceipt>> {
        let mut state = self.lock()?;
        let Some(student) = state.first_active_mut(collection, phones) else {
            return Ok(None);
        };
        if student.has_purchased(session_number) || !student.can_afford() {
            return Ok(None);
        }

        let previous_balance = student.balance;
        student.balance -= student.payment_amount;
        let progress = student.sessions.entry(session_number).or_default();
        progress.online_session = true;
        progress.purchased_at = Some(purchased_at);

        Ok(Some(PurchaseReceipt {
            student_id: student.student_id.clone(),
            student_name: student.student_name.clone(),
            phone: student.phone.clone(),
            amount: student.payment_amount,
            previous_balance,
            new_balance: student.balance,
            purchased_at,
        }))
    }

    async fn mark_attendance(
        &self,
        collection: &str,
        phones: &[String],
        session_number: u32,
        grant: bool,
        completed_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut state = self.lock()?;
        let Some(student) = state.first_active_mut(collection, phones) else {
            return Ok(false);
        };
        if student.has_attended(session_number) {
            return Ok(false);
        }
        if !grant && !student.has_purchased(session_number) {
            return Ok(false);
        }

        let progress = student.sessions.entry(session_number).or_default();
        progress.online_session = true;
        progress.online_attendance = true;
        progress.online_attendance_completed_at = Some(completed_at);
        Ok(true)
    }

    async fn find_session(
        &self,
        grade: &str,
        subject: &str,
        session_number: u32,
    ) -> PortResult<Option<SessionRecord>> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .iter()
            .filter(|s| {
                s.grade == grade
                    && s.subject == subject
                    && s.session_number == session_number
                    && s.is_active
                    && s.is_published
            })
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<SessionRecord> {
        let state = self.lock()?;
        state
            .sessions
            .iter()
            .find(|s| s.id == session_id && s.is_active)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> PortResult<Vec<SessionRecord>> {
        let state = self.lock()?;
        let mut sessions: Vec<SessionRecord> = state
            .sessions
            .iter()
            .filter(|s| filter.include_inactive || s.is_active)
            .filter(|s| filter.grade.as_deref().map_or(true, |g| s.grade == g))
            .filter(|s| filter.subject.as_deref().map_or(true, |subj| s.subject == subj))
            .filter(|s| filter.status.map_or(true, |status| status.matches(s)))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let skip = filter.skip.unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(sessions.into_iter().skip(skip).take(limit).collect())
    }

    async fn session_stats(&self) -> PortResult<SessionStats> {
        let state = self.lock()?;
        let (published, draft) = state
            .sessions
            .iter()
            .filter(|s| s.is_active)
            .fold((0, 0), |(published, draft), s| {
                if s.is_published {
                    (published + 1, draft)
                } else {
                    (published, draft + 1)
                }
            });
        Ok(SessionStats {
            total: published + draft,
            published,
            draft,
        })
    }

    async fn append_transaction(&self, transaction: TransactionRecord) -> PortResult<()> {
        let mut state = self.lock()?;
        if state.ledger_unavailable {
            return Err(PortError::Unexpected("ledger unavailable".to_string()));
        }
        if transaction.new_balance != transaction.previous_balance - transaction.amount {
            return Err(PortError::InvalidRecord(format!(
                "transaction {} does not balance",
                transaction.id
            )));
        }
        state.transactions.push(transaction);
        Ok(())
    }

    async fn ping(&self) -> PortResult<()> {
        self.lock().map(|_| ())
    }
}
