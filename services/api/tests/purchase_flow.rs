//! Purchase and attendance behavior of the access workflow against the
//! in-memory store.

mod common;

use common::{access_service, fixture, PHYSICS, POOR_PHONE, RICH_PHONE};
use futures::future::join_all;
use tutoring_core::entitlement::Entitlement;
use tutoring_core::ports::PortError;
use tutoring_core::service::{AttendanceOutcome, PurchaseOutcome, ServiceError, SessionTarget};
use tutoring_core::TransactionKind;

fn physics(session_number: u32) -> SessionTarget {
    SessionTarget::ByNumber {
        grade: "senior2".to_string(),
        subject: "physics".to_string(),
        session_number,
    }
}

#[tokio::test]
async fn purchase_debits_once_and_records_ledger_entry() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let outcome = service.purchase_session("01234567890", &physics(3)).await.unwrap();
    let receipt = match outcome {
        PurchaseOutcome::Purchased(receipt) => receipt,
        other => panic!("expected a purchase, got {:?}", other),
    };
    assert_eq!(receipt.previous_balance, 100);
    assert_eq!(receipt.new_balance, 20);
    assert_eq!(receipt.amount, 80);

    let stored = fx.db.student(PHYSICS, "rich").unwrap().unwrap();
    assert_eq!(stored.balance, 20);
    assert!(stored.has_purchased(3));
    assert!(stored.progress(3).unwrap().purchased_at.is_some());

    let ledger = fx.db.transactions().unwrap();
    assert_eq!(ledger.len(), 1);
    let entry = &ledger[0];
    assert_eq!(entry.kind, TransactionKind::SessionPurchase);
    assert_eq!(entry.student_id, "rich");
    assert_eq!(entry.collection, PHYSICS);
    assert_eq!(entry.previous_balance, 100);
    assert_eq!(entry.new_balance, entry.previous_balance - entry.amount);
}

#[tokio::test]
async fn retried_purchase_reports_already_purchased() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let first = service.purchase_session(RICH_PHONE, &physics(3)).await.unwrap();
    assert!(matches!(first, PurchaseOutcome::Purchased(_)));

    // Different spelling of the same phone.
    let second = service.purchase_session("201234567890", &physics(3)).await.unwrap();
    assert_eq!(second, PurchaseOutcome::AlreadyPurchased);
    assert!(second.is_success());

    assert_eq!(fx.db.student(PHYSICS, "rich").unwrap().unwrap().balance, 20);
    assert_eq!(fx.db.transactions().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_debit_exactly_once() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let attempts = (0..16).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.purchase_session(RICH_PHONE, &physics(3)).await })
    });
    let outcomes: Vec<PurchaseOutcome> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let purchased = outcomes
        .iter()
        .filter(|o| matches!(o, PurchaseOutcome::Purchased(_)))
        .count();
    let already = outcomes
        .iter()
        .filter(|o| **o == PurchaseOutcome::AlreadyPurchased)
        .count();
    assert_eq!(purchased, 1);
    assert_eq!(already, 15);

    let stored = fx.db.student(PHYSICS, "rich").unwrap().unwrap();
    assert_eq!(stored.balance, 20);
    assert_eq!(fx.db.transactions().unwrap().len(), 1);
}

#[tokio::test]
async fn insufficient_balance_leaves_record_untouched() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let outcome = service.purchase_session(POOR_PHONE, &physics(3)).await.unwrap();
    assert_eq!(
        outcome,
        PurchaseOutcome::InsufficientBalance {
            balance: 50,
            cost: 80
        }
    );
    assert!(!outcome.is_success());

    let stored = fx.db.student(PHYSICS, "poor").unwrap().unwrap();
    assert_eq!(stored.balance, 50);
    assert!(!stored.has_purchased(3));
    assert!(fx.db.transactions().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_student_and_session_are_outcomes_not_errors() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let outcome = service.purchase_session("01111111111", &physics(3)).await.unwrap();
    assert_eq!(outcome, PurchaseOutcome::StudentNotFound);

    let outcome = service.purchase_session(RICH_PHONE, &physics(42)).await.unwrap();
    assert_eq!(outcome, PurchaseOutcome::SessionNotFound);
}

#[tokio::test]
async fn inactive_student_is_never_debited() {
    let fx = fixture();
    let mut inactive = common::student("gone", "01555555555", "physics", 500);
    inactive.is_active = false;
    fx.db.insert_student(PHYSICS, inactive).unwrap();
    let service = access_service(fx.db.clone());

    let outcome = service.purchase_session("01555555555", &physics(3)).await.unwrap();
    assert_eq!(outcome, PurchaseOutcome::StudentNotFound);
    assert_eq!(fx.db.student(PHYSICS, "gone").unwrap().unwrap().balance, 500);
}

#[test]
fn negative_price_is_rejected_at_insert() {
    let fx = fixture();
    let mut refund = common::student("refund", "01666666666", "physics", 10);
    refund.payment_amount = -50;

    let err = fx.db.insert_student(PHYSICS, refund.clone()).unwrap_err();
    assert!(matches!(err, PortError::InvalidRecord(_)));
    assert!(fx.db.student(PHYSICS, "refund").unwrap().is_none());
    assert!(!refund.can_afford());
}

#[tokio::test]
async fn free_session_purchase_does_not_debit() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let outcome = service.purchase_session(RICH_PHONE, &physics(1)).await.unwrap();
    assert_eq!(outcome, PurchaseOutcome::FreeSession);
    assert_eq!(fx.db.student(PHYSICS, "rich").unwrap().unwrap().balance, 100);
}

#[tokio::test]
async fn unroutable_scope_is_a_validation_error() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let target = SessionTarget::ByNumber {
        grade: "senior1".to_string(),
        subject: "physics".to_string(),
        session_number: 3,
    };
    let err = service.purchase_session(RICH_PHONE, &target).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn ledger_failure_does_not_undo_purchase() {
    let fx = fixture();
    fx.db.set_ledger_unavailable(true).unwrap();
    let service = access_service(fx.db.clone());

    let outcome = service.purchase_session(RICH_PHONE, &physics(3)).await.unwrap();
    assert!(matches!(outcome, PurchaseOutcome::Purchased(_)));
    assert!(fx.db.transactions().unwrap().is_empty());

    // A client retry observes the purchase rather than debiting again.
    let retry = service.purchase_session(RICH_PHONE, &physics(3)).await.unwrap();
    assert_eq!(retry, PurchaseOutcome::AlreadyPurchased);
    assert_eq!(fx.db.student(PHYSICS, "rich").unwrap().unwrap().balance, 20);
}

#[tokio::test]
async fn check_access_after_purchase_grants_without_debit() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let before = service.check_access(RICH_PHONE, &physics(3)).await.unwrap();
    assert_eq!(
        before.entitlement,
        Entitlement::PurchaseAvailable {
            balance: 100,
            cost: 80
        }
    );
    assert!(!before.attendance_marked);

    service.purchase_session(RICH_PHONE, &physics(3)).await.unwrap();

    for _ in 0..3 {
        let report = service.check_access("01234567890", &physics(3)).await.unwrap();
        assert_eq!(report.entitlement, Entitlement::Purchased);
        assert!(report.entitlement.has_access());
    }
    assert_eq!(fx.db.student(PHYSICS, "rich").unwrap().unwrap().balance, 20);
    assert_eq!(fx.db.transactions().unwrap().len(), 1);
}

#[tokio::test]
async fn attendance_is_recorded_once() {
    let fx = fixture();
    let service = access_service(fx.db.clone());
    service.purchase_session(RICH_PHONE, &physics(3)).await.unwrap();

    let first = service.check_access(RICH_PHONE, &physics(3)).await.unwrap();
    assert!(first.attendance_marked);
    let stamped = fx
        .db
        .student(PHYSICS, "rich")
        .unwrap()
        .unwrap()
        .progress(3)
        .unwrap()
        .online_attendance_completed_at;
    assert!(stamped.is_some());

    let second = service.check_access(RICH_PHONE, &physics(3)).await.unwrap();
    assert!(!second.attendance_marked);
    assert_eq!(
        service.mark_attendance(RICH_PHONE, &physics(3)).await.unwrap(),
        AttendanceOutcome::AlreadyMarked
    );

    let progress = fx.db.student(PHYSICS, "rich").unwrap().unwrap().progress(3).cloned().unwrap();
    assert!(progress.online_attendance);
    assert_eq!(progress.online_attendance_completed_at, stamped);
}

#[tokio::test]
async fn attendance_requires_purchase() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let outcome = service.mark_attendance(RICH_PHONE, &physics(3)).await.unwrap();
    assert!(matches!(
        outcome,
        AttendanceOutcome::NotEntitled(Entitlement::PurchaseAvailable { .. })
    ));
    assert!(!fx.db.student(PHYSICS, "rich").unwrap().unwrap().has_attended(3));
}

#[tokio::test]
async fn free_session_allows_anyone_and_grants_known_students() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let stranger = service.check_access("01999999999", &physics(1)).await.unwrap();
    assert_eq!(stranger.entitlement, Entitlement::Free);
    assert!(stranger.student.is_none());
    assert!(!stranger.attendance_marked);

    let known = service.check_access(POOR_PHONE, &physics(1)).await.unwrap();
    assert_eq!(known.entitlement, Entitlement::Free);
    assert!(known.attendance_marked);

    let stored = fx.db.student(PHYSICS, "poor").unwrap().unwrap();
    let progress = stored.progress(1).unwrap();
    assert!(progress.online_session && progress.online_attendance);
    assert_eq!(stored.balance, 50);
}

#[tokio::test]
async fn session_can_be_addressed_by_id() {
    let fx = fixture();
    let service = access_service(fx.db.clone());
    let target = SessionTarget::ById(fx.paid_session.id);

    let outcome = service.purchase_session(RICH_PHONE, &target).await.unwrap();
    assert!(matches!(outcome, PurchaseOutcome::Purchased(_)));

    let report = service.check_access(RICH_PHONE, &target).await.unwrap();
    assert_eq!(report.session_number, Some(3));
    assert_eq!(report.entitlement, Entitlement::Purchased);

    let missing = service
        .check_access(RICH_PHONE, &SessionTarget::ById(uuid::Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(missing.entitlement, Entitlement::SessionNotFound);
}

#[tokio::test]
async fn overview_aggregates_subjects_for_one_phone() {
    let fx = fixture();
    let service = access_service(fx.db.clone());

    let enrollments = service.account_overview("01234567890", Some("senior2")).await.unwrap();
    let scopes: Vec<&str> = enrollments.keys().map(String::as_str).collect();
    assert_eq!(scopes, ["senior2/mechanics", "senior2/physics"]);

    let all_grades = service.account_overview(RICH_PHONE, None).await.unwrap();
    assert_eq!(all_grades.len(), 2);

    assert!(service.account_overview(RICH_PHONE, Some("senior9")).await.is_err());
}
