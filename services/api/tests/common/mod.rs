//! Shared fixtures for the API integration tests.

#![allow(dead_code)]

use api_lib::adapters::memory::MemoryDb;
use api_lib::config::{Config, StoreKind};
use api_lib::web::{router, state::AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;
use tutoring_core::domain::{AccessControl, SessionRecord, StudentRecord, Video, VideoSource};
use tutoring_core::ports::DatabaseService;
use tutoring_core::routing::RoutingTable;
use tutoring_core::service::AccessService;
use uuid::Uuid;

pub const PHYSICS: &str = "senior2_physics";
pub const MECHANICS: &str = "senior2_mechanics";

/// Stored in international form, the way enrollment imports wrote it.
pub const RICH_PHONE: &str = "+201234567890";
pub const POOR_PHONE: &str = "01098765432";

pub fn student(student_id: &str, phone: &str, subject: &str, balance: i64) -> StudentRecord {
    StudentRecord {
        student_id: student_id.to_string(),
        phone: phone.to_string(),
        student_name: format!("Student {}", student_id),
        grade: "senior2".to_string(),
        subject: subject.to_string(),
        balance,
        payment_amount: 80,
        is_active: true,
        sessions: BTreeMap::new(),
    }
}

pub fn session(session_number: u32, access_control: AccessControl) -> SessionRecord {
    SessionRecord {
        id: Uuid::new_v4(),
        session_number,
        access_control,
        grade: "senior2".to_string(),
        subject: "physics".to_string(),
        title: format!("Physics session {}", session_number),
        description: String::new(),
        videos: vec![Video {
            video_id: Some(format!("v{}", session_number)),
            title: "Lecture".to_string(),
            description: String::new(),
            source: VideoSource::Link,
            url: Some("https://videos.example/lecture".to_string()),
            file_path: None,
        }],
        is_active: true,
        is_published: true,
        created_at: Utc::now() - Duration::minutes(i64::from(session_number)),
    }
}

pub struct Fixture {
    pub db: Arc<MemoryDb>,
    pub free_session: SessionRecord,
    pub paid_session: SessionRecord,
}

/// Physics session 1 is free, session 3 is restricted. The rich student has 100
/// (enough for one purchase at 80), the poor one 50.
pub fn fixture() -> Fixture {
    let db = Arc::new(MemoryDb::new());
    db.insert_student(PHYSICS, student("rich", RICH_PHONE, "S2 Physics", 100))
        .unwrap();
    db.insert_student(PHYSICS, student("poor", POOR_PHONE, "S2 Physics", 50))
        .unwrap();
    db.insert_student(MECHANICS, student("rich-mech", RICH_PHONE, "S2 Mechanics", 300))
        .unwrap();

    let free_session = session(1, AccessControl::Free);
    let paid_session = session(3, AccessControl::Restricted);
    db.insert_session(free_session.clone()).unwrap();
    db.insert_session(paid_session.clone()).unwrap();

    Fixture {
        db,
        free_session,
        paid_session,
    }
}

pub fn access_service(db: Arc<MemoryDb>) -> AccessService {
    let db: Arc<dyn DatabaseService> = db;
    AccessService::new(db, Arc::new(RoutingTable::standard()))
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        store: StoreKind::Memory,
        db_max_connections: 1,
        log_level: tracing::Level::INFO,
        cors_allow_origin: None,
        routing_table: RoutingTable::standard(),
    }
}

pub fn app(db: Arc<MemoryDb>) -> axum::Router {
    let db: Arc<dyn DatabaseService> = db;
    router(Arc::new(AppState::new(db, Arc::new(test_config()))))
}

/// Sends a GET request and decodes the JSON body.
pub async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
