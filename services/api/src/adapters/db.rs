//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Student documents keep their per-session progress in a JSONB `sessions` column
//! keyed `session_<N>`. Purchases and attendance are single conditional `UPDATE`
//! statements, so PostgreSQL's row lock serializes racing requests and re-checks the
//! predicate against the winner's write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use tutoring_core::domain::{
    AccessControl, PurchaseReceipt, SessionFilter, SessionProgress, SessionRecord, SessionStats,
    SessionStatus, StudentRecord, TransactionRecord, Video, VideoSource,
};
use tutoring_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Session numbers are `INTEGER` columns; anything larger cannot be stored.
fn session_number_param(session_number: u32) -> Option<i32> {
    i32::try_from(session_number).ok()
}

fn session_key(session_number: u32) -> String {
    format!("session_{}", session_number)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const STUDENT_COLUMNS: &str =
    "student_id, phone, student_name, grade, subject, balance, payment_amount, is_active, sessions";

#[derive(FromRow)]
struct StudentRow {
    student_id: String,
    phone: String,
    student_name: String,
    grade: String,
    subject: String,
    balance: i64,
    payment_amount: i64,
    is_active: bool,
    sessions: Json<serde_json::Value>,
}

#[derive(Deserialize)]
struct SessionProgressDoc {
    online_session: bool,
    #[serde(default)]
    purchased_at: Option<DateTime<Utc>>,
    #[serde(default)]
    online_attendance: bool,
    #[serde(default)]
    online_attendance_completed_at: Option<DateTime<Utc>>,
}

impl StudentRow {
    fn to_domain(self) -> PortResult<StudentRecord> {
        let docs: BTreeMap<String, SessionProgressDoc> = serde_json::from_value(self.sessions.0)
            .map_err(|e| {
                PortError::InvalidRecord(format!("student {}: sessions: {}", self.student_id, e))
            })?;

        let mut sessions = BTreeMap::new();
        for (key, doc) in docs {
            let number = key
                .strip_prefix("session_")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    PortError::InvalidRecord(format!(
                        "student {}: unexpected session key '{}'",
                        self.student_id, key
                    ))
                })?;
            if doc.online_attendance && !doc.online_session {
                return Err(PortError::InvalidRecord(format!(
                    "student {}: {} attended without access",
                    self.student_id, key
                )));
            }
            sessions.insert(
                number,
                SessionProgress {
                    online_session: doc.online_session,
                    purchased_at: doc.purchased_at,
                    online_attendance: doc.online_attendance,
                    online_attendance_completed_at: doc.online_attendance_completed_at,
                },
            );
        }

        Ok(StudentRecord {
            student_id: self.student_id,
            phone: self.phone,
            student_name: self.student_name,
            grade: self.grade,
            subject: self.subject,
            balance: self.balance,
            payment_amount: self.payment_amount,
            is_active: self.is_active,
            sessions,
        })
    }
}

#[derive(FromRow)]
struct ReceiptRow {
    student_id: String,
    student_name: String,
    phone: String,
    payment_amount: i64,
    new_balance: i64,
}
impl ReceiptRow {
    fn to_domain(self, purchased_at: DateTime<Utc>) -> PurchaseReceipt {
        PurchaseReceipt {
            student_id: self.student_id,
            student_name: self.student_name,
            phone: self.phone,
            amount: self.payment_amount,
            previous_balance: self.new_balance + self.payment_amount,
            new_balance: self.new_balance,
            purchased_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, session_number, access_control, grade, subject, title, \
     description, videos, is_active, is_published, created_at";

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    session_number: i32,
    access_control: String,
    grade: String,
    subject: String,
    title: String,
    description: String,
    videos: Json<serde_json::Value>,
    is_active: bool,
    is_published: bool,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum VideoSourceDoc {
    Upload,
    Link,
}

#[derive(Deserialize)]
struct VideoDoc {
    #[serde(default)]
    video_id: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    source: VideoSourceDoc,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
}

impl SessionRow {
    fn to_domain(self) -> PortResult<SessionRecord> {
        let access_control = AccessControl::parse(&self.access_control).ok_or_else(|| {
            PortError::InvalidRecord(format!(
                "session {}: unknown access control '{}'",
                self.id, self.access_control
            ))
        })?;
        let session_number = u32::try_from(self.session_number)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                PortError::InvalidRecord(format!(
                    "session {}: invalid session number {}",
                    self.id, self.session_number
                ))
            })?;
        let videos: Vec<VideoDoc> = serde_json::from_value(self.videos.0)
            .map_err(|e| PortError::InvalidRecord(format!("session {}: videos: {}", self.id, e)))?;

        Ok(SessionRecord {
            id: self.id,
            session_number,
            access_control,
            grade: self.grade,
            subject: self.subject,
            title: self.title,
            description: self.description,
            videos: videos
                .into_iter()
                .map(|v| Video {
                    video_id: v.video_id,
                    title: v.title,
                    description: v.description,
                    source: match v.source {
                        VideoSourceDoc::Upload => VideoSource::Upload,
                        VideoSourceDoc::Link => VideoSource::Link,
                    },
                    url: v.url,
                    file_path: v.file_path,
                })
                .collect(),
            is_active: self.is_active,
            is_published: self.is_published,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn find_active_student(
        &self,
        collection: &str,
        phones: &[String],
    ) -> PortResult<Option<StudentRecord>> {
        let sql = format!(
            "SELECT {} FROM students \
             WHERE collection = $1 AND phone = ANY($2) AND is_active \
             ORDER BY id LIMIT 1",
            STUDENT_COLUMNS
        );
        let row = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(collection)
            .bind(phones)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        row.map(StudentRow::to_domain).transpose()
    }

    async fn purchase_session(
        &self,
        collection: &str,
        phones: &[String],
        session_number: u32,
        purchased_at: DateTime<Utc>,
    ) -> PortResult<Option<PurchaseReceipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            r#"
            UPDATE students
            SET balance = balance - payment_amount,
                sessions = jsonb_set(
                    sessions,
                    ARRAY[$3::text],
                    COALESCE(sessions -> $3::text, '{}'::jsonb)
                        || jsonb_build_object(
                            'online_session', true,
                            'purchased_at', to_jsonb($4::timestamptz)
                        )
                )
            WHERE id = (
                    SELECT id FROM students
                    WHERE collection = $1 AND phone = ANY($2) AND is_active
                    ORDER BY id LIMIT 1
                )
              AND is_active
              AND balance >= payment_amount
              AND COALESCE((sessions -> $3::text ->> 'online_session')::boolean, false) = false
            RETURNING student_id, student_name, phone, payment_amount, balance AS new_balance
            "#,
        )
        .bind(collection)
        .bind(phones)
        .bind(session_key(session_number))
        .bind(purchased_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(row.map(|r| r.to_domain(purchased_at)))
    }

    async fn mark_attendance(
        &self,
        collection: &str,
        phones: &[String],
        session_number: u32,
        grant: bool,
        completed_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET sessions = jsonb_set(
                    sessions,
                    ARRAY[$3::text],
                    COALESCE(sessions -> $3::text, '{}'::jsonb)
                        || jsonb_build_object(
                            'online_session', true,
                            'online_attendance', true,
                            'online_attendance_completed_at', to_jsonb($5::timestamptz)
                        )
                )
            WHERE id = (
                    SELECT id FROM students
                    WHERE collection = $1 AND phone = ANY($2) AND is_active
                    ORDER BY id LIMIT 1
                )
              AND is_active
              AND COALESCE((sessions -> $3::text ->> 'online_attendance')::boolean, false) = false
              AND ($4 OR COALESCE((sessions -> $3::text ->> 'online_session')::boolean, false))
            "#,
        )
        .bind(collection)
        .bind(phones)
        .bind(session_key(session_number))
        .bind(grant)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_session(
        &self,
        grade: &str,
        subject: &str,
        session_number: u32,
    ) -> PortResult<Option<SessionRecord>> {
        let Some(session_number) = session_number_param(session_number) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM online_sessions \
             WHERE grade = $1 AND subject = $2 AND session_number = $3 \
               AND is_active AND is_published \
             ORDER BY created_at DESC LIMIT 1",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(grade)
            .bind(subject)
            .bind(session_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        row.map(SessionRow::to_domain).transpose()
    }

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<SessionRecord> {
        let sql = format!(
            "SELECT {} FROM online_sessions WHERE id = $1 AND is_active",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Session {} not found", session_id))
                }
                _ => unexpected(e),
            })?;
        row.to_domain()
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> PortResult<Vec<SessionRecord>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        query.push(SESSION_COLUMNS);
        query.push(" FROM online_sessions WHERE TRUE");
        if !filter.include_inactive {
            query.push(" AND is_active");
        }
        if let Some(grade) = &filter.grade {
            query.push(" AND grade = ").push_bind(grade.clone());
        }
        if let Some(subject) = &filter.subject {
            query.push(" AND subject = ").push_bind(subject.clone());
        }
        match filter.status {
            Some(SessionStatus::Published) => {
                query.push(" AND is_published");
            }
            Some(SessionStatus::Draft) => {
                query.push(" AND NOT is_published");
            }
            None => {}
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(skip) = filter.skip {
            query.push(" OFFSET ").push_bind(i64::from(skip));
        }

        let rows = query
            .build_query_as::<SessionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        rows.into_iter().map(SessionRow::to_domain).collect()
    }

    async fn session_stats(&self) -> PortResult<SessionStats> {
        let (published, draft): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE is_published), COUNT(*) FILTER (WHERE NOT is_published) \
             FROM online_sessions WHERE is_active",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        let count = |n: i64| u64::try_from(n).unwrap_or_default();
        Ok(SessionStats {
            total: count(published) + count(draft),
            published: count(published),
            draft: count(draft),
        })
    }

    async fn append_transaction(&self, transaction: TransactionRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO transactions \
             (id, student_id, student_name, phone, collection, kind, amount, previous_balance, \
              new_balance, note, recorded_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(transaction.id)
        .bind(&transaction.student_id)
        .bind(&transaction.student_name)
        .bind(&transaction.phone)
        .bind(&transaction.collection)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(transaction.previous_balance)
        .bind(transaction.new_balance)
        .bind(&transaction.note)
        .bind(&transaction.recorded_by)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn ping(&self) -> PortResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn student_row(sessions: serde_json::Value) -> StudentRow {
        StudentRow {
            student_id: "s-1".to_string(),
            phone: "01234567890".to_string(),
            student_name: "Mona".to_string(),
            grade: "senior2".to_string(),
            subject: "physics".to_string(),
            balance: 100,
            payment_amount: 80,
            is_active: true,
            sessions: Json(sessions),
        }
    }

    fn session_row(access_control: &str, session_number: i32) -> SessionRow {
        SessionRow {
            id: Uuid::new_v4(),
            session_number,
            access_control: access_control.to_string(),
            grade: "senior2".to_string(),
            subject: "physics".to_string(),
            title: "Kinematics".to_string(),
            description: String::new(),
            videos: Json(json!([
                {"video_id": "v1", "title": "Part 1", "source": "link", "url": "https://videos.example/1"},
                {"title": "Part 2", "source": "upload", "file_path": "uploads/2.mp4"}
            ])),
            is_active: true,
            is_published: true,
            created_at: Utc::now(),
        }
    }

    fn assert_invalid<T: std::fmt::Debug>(result: PortResult<T>) {
        match result {
            Err(PortError::InvalidRecord(_)) => {}
            other => panic!("expected an invalid record, got {:?}", other),
        }
    }

    #[test]
    fn well_formed_student_row_decodes() {
        let record = student_row(json!({
            "session_3": {
                "online_session": true,
                "purchased_at": "2026-01-10T09:00:00Z",
                "online_attendance": true,
                "online_attendance_completed_at": "2026-01-10T10:00:00Z"
            },
            "session_4": {"online_session": true}
        }))
        .to_domain()
        .unwrap();

        assert_eq!(record.student_id, "s-1");
        assert_eq!(record.balance, 100);
        assert!(record.has_purchased(3));
        assert!(record.has_attended(3));
        assert!(record.progress(3).unwrap().purchased_at.is_some());
        assert!(record.has_purchased(4));
        assert!(!record.has_attended(4));
        assert!(record.progress(5).is_none());
    }

    #[test]
    fn empty_progress_document_decodes() {
        let record = student_row(json!({})).to_domain().unwrap();
        assert!(record.sessions.is_empty());
    }

    #[test]
    fn malformed_session_keys_are_rejected() {
        assert_invalid(student_row(json!({"session_x": {"online_session": true}})).to_domain());
        assert_invalid(student_row(json!({"session_0": {"online_session": true}})).to_domain());
        assert_invalid(student_row(json!({"lesson_1": {"online_session": true}})).to_domain());
    }

    #[test]
    fn malformed_progress_entries_are_rejected() {
        assert_invalid(student_row(json!({"session_1": {"online_attendance": false}})).to_domain());
        assert_invalid(student_row(json!({"session_1": {"online_session": "yes"}})).to_domain());
        assert_invalid(student_row(json!(["session_1"])).to_domain());
    }

    #[test]
    fn attendance_without_access_is_rejected() {
        assert_invalid(
            student_row(json!({
                "session_2": {"online_session": false, "online_attendance": true}
            }))
            .to_domain(),
        );
    }

    #[test]
    fn well_formed_session_row_decodes() {
        let session = session_row("restricted", 7).to_domain().unwrap();
        assert_eq!(session.session_number, 7);
        assert_eq!(session.access_control, AccessControl::Restricted);
        assert_eq!(session.videos.len(), 2);
        assert_eq!(session.videos[0].source, VideoSource::Link);
        assert_eq!(session.videos[1].source, VideoSource::Upload);
        assert_eq!(session.videos[1].file_path.as_deref(), Some("uploads/2.mp4"));
        assert_eq!(session.videos[1].description, "");
    }

    #[test]
    fn malformed_session_rows_are_rejected() {
        assert_invalid(session_row("premium", 1).to_domain());
        assert_invalid(session_row("free", 0).to_domain());
        assert_invalid(session_row("free", -4).to_domain());

        let mut row = session_row("free", 1);
        row.videos = Json(json!([{"title": "No source"}]));
        assert_invalid(row.to_domain());
    }

    #[test]
    fn oversized_session_numbers_have_no_column_value() {
        assert_eq!(session_number_param(7), Some(7));
        assert_eq!(session_number_param(i32::MAX as u32), Some(i32::MAX));
        assert_eq!(session_number_param(3_000_000_000), None);
    }
}
