//! Payment verification tests: admin decisions and gateway callbacks.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use arena::services::{NotificationAck, VerificationDecision, VerifyPayment};
use arena_core::commerce::{
    CartStatus, PaymentStatus, RegistrationStatus, VerificationOutcome, VerificationSource,
};
use arena_core::store::{DISPLAY_CODE_CONSTRAINT, REGISTRATION_NUMBER_CONSTRAINT};
use arena_core::ArenaError;
use arena_testing::{ScriptedCodeGenerator, SentMail};
use common::{card_request, TestApp};

fn approve(app: &TestApp, index: usize) -> VerifyPayment {
    let registration = &app.store.registrations()[index];
    VerifyPayment {
        payment_id: registration.payment_id.unwrap(),
        registration_id: registration.id,
        decision: VerificationDecision::Approve,
    }
}

fn reject(app: &TestApp, index: usize, reason: &str) -> VerifyPayment {
    VerifyPayment {
        decision: VerificationDecision::Reject {
            reason: reason.to_string(),
        },
        ..approve(app, index)
    }
}

#[tokio::test]
async fn test_admin_approval_confirms_registration() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    let order_id = app.bank_checkout(&member).await;

    let updated = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 0))
        .await
        .unwrap();

    assert_eq!(updated.status, RegistrationStatus::Confirmed);
    assert_eq!(updated.display_code.as_deref(), Some("RBT26-0001"));
    assert_eq!(updated.confirmed_at, Some(app.now()));

    let payment = &app.store.payments()[0];
    assert_eq!(payment.status, PaymentStatus::Completed);
    let audit = &payment.metadata.verification;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, VerificationOutcome::Approved);
    assert_eq!(audit[0].source, VerificationSource::Admin);
    assert_eq!(audit[0].verified_by, Some(admin.id));
    assert_eq!(audit[0].registration_id, Some(updated.id));

    let sent = app.mailer.sent();
    let SentMail::PaymentVerified(email) = sent.last().unwrap() else {
        panic!("expected a verified email, got {sent:?}");
    };
    assert_eq!(email.to, "nimal@example.com");
    assert_eq!(email.order_id, order_id);
    assert_eq!(email.registration.registration_type_name, "Individual");
}

#[tokio::test]
async fn test_admin_rejection_cancels_registration() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    app.bank_checkout(&member).await;

    let err = app
        .services()
        .verification
        .verify_payment(&admin, reject(&app, 0, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Validation(_)));
    assert_eq!(app.store.payments()[0].status, PaymentStatus::Pending);

    let updated = app
        .services()
        .verification
        .verify_payment(&admin, reject(&app, 0, "Slip amount does not match"))
        .await
        .unwrap();

    assert_eq!(updated.status, RegistrationStatus::Cancelled);
    assert_eq!(updated.display_code, None);
    let payment = &app.store.payments()[0];
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(
        payment.metadata.verification[0].reject_reason.as_deref(),
        Some("Slip amount does not match")
    );

    let sent = app.mailer.sent();
    let SentMail::PaymentRejected(email) = sent.last().unwrap() else {
        panic!("expected a rejection email, got {sent:?}");
    };
    assert_eq!(email.reason, "Slip amount does not match");
}

#[tokio::test]
async fn test_only_admins_verify() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let moderator = app.moderator("mod@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    app.bank_checkout(&member).await;

    for user in [&member, &moderator] {
        let err = app
            .services()
            .verification
            .verify_payment(user, approve(&app, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Forbidden(_)));
    }
    assert_eq!(
        app.store.registrations()[0].status,
        RegistrationStatus::Pending
    );
}

#[tokio::test]
async fn test_registration_must_belong_to_payment() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let ana = app.member("ana@example.com");
    let ben = app.member("ben@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&ana, &catalog.individual, 1).await;
    app.bank_checkout(&ana).await;
    app.add(&ben, &catalog.individual, 1).await;
    app.bank_checkout(&ben).await;

    let mut request = approve(&app, 0);
    request.registration_id = app.store.registrations()[1].id;
    let err = app
        .services()
        .verification
        .verify_payment(&admin, request)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Validation(_)));

    let mut request = approve(&app, 0);
    request.payment_id = arena_core::types::PaymentId::new();
    let err = app
        .services()
        .verification
        .verify_payment(&admin, request)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::NotFound { entity: "payment", .. }));
}

#[tokio::test]
async fn test_display_codes_unique_within_competition() {
    let app = TestApp::with_codes(ScriptedCodeGenerator::new().with_display_serials([7, 7, 8]));
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    app.add(&member, &catalog.team, 2).await;
    app.bank_checkout(&member).await;

    let first = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 0))
        .await
        .unwrap();
    let second = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 1))
        .await
        .unwrap();

    assert_eq!(first.display_code.as_deref(), Some("RBT26-0007"));
    assert_eq!(second.display_code.as_deref(), Some("RBT26-0008"));
}

#[tokio::test]
async fn test_reapproval_keeps_display_code() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    app.bank_checkout(&member).await;

    let first = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 0))
        .await
        .unwrap();
    let again = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 0))
        .await
        .unwrap();

    assert_eq!(first.display_code, again.display_code);
    assert_eq!(app.store.payments()[0].metadata.verification.len(), 2);
}

#[tokio::test]
async fn test_display_code_taken_at_write_is_redrawn() {
    let app = TestApp::with_codes(ScriptedCodeGenerator::new().with_display_serials([3, 4]));
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    app.bank_checkout(&member).await;

    app.store.inject_unique_violation(DISPLAY_CODE_CONSTRAINT);
    let updated = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 0))
        .await
        .unwrap();

    assert_eq!(updated.display_code.as_deref(), Some("RBT26-0004"));
    assert_eq!(app.store.payments()[0].metadata.verification.len(), 1);
}

#[tokio::test]
async fn test_other_unique_violation_on_verify_is_not_retried() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    let admin = app.admin("admin@arena.test");
    app.add(&member, &catalog.individual, 1).await;
    app.bank_checkout(&member).await;

    app.store.inject_unique_violation("payments_order_id_key");
    let err = app
        .services()
        .verification
        .verify_payment(&admin, approve(&app, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, ArenaError::Conflict(_)));
    assert_eq!(app.store.registrations()[0].status, RegistrationStatus::Pending);
}

async fn card_order(app: &TestApp) -> String {
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    app.add(&member, &catalog.individual, 1).await;
    app.services()
        .checkout
        .checkout(&member, card_request())
        .await
        .unwrap()
        .order_id()
        .to_string()
}

#[tokio::test]
async fn test_gateway_success_settles_payment() {
    let app = TestApp::new();
    let order_id = card_order(&app).await;

    let ack = app
        .services()
        .verification
        .handle_gateway_notification(app.notification(&order_id, "5000.00", 2))
        .await
        .unwrap();
    assert_eq!(ack, NotificationAck::Settled(1));

    let payment = &app.store.payments()[0];
    assert_eq!(payment.status, PaymentStatus::Completed);
    let notice = payment.metadata.gateway.as_ref().unwrap();
    assert_eq!(notice.status_code, 2);
    assert_eq!(notice.gateway_payment_id.as_deref(), Some("320025071"));
    assert_eq!(
        payment.metadata.verification[0].source,
        VerificationSource::Gateway
    );

    let registrations = app.store.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].status, RegistrationStatus::Confirmed);
    assert_eq!(registrations[0].display_code.as_deref(), Some("RBT26-0001"));
    assert_eq!(registrations[0].payment_id, Some(payment.id));
    assert_eq!(app.store.carts()[0].status, CartStatus::Completed);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], SentMail::PaymentVerified(_)));
}

#[tokio::test]
async fn test_settlement_redraws_codes_taken_at_write() {
    let codes = ScriptedCodeGenerator::new()
        .with_registration_numbers(["K7M2QX", "P3RT9W"])
        .with_display_serials([3, 4]);
    let app = TestApp::with_codes(codes);
    let order_id = card_order(&app).await;

    app.store.inject_unique_violation(REGISTRATION_NUMBER_CONSTRAINT);
    let ack = app
        .services()
        .verification
        .handle_gateway_notification(app.notification(&order_id, "5000.00", 2))
        .await
        .unwrap();

    assert_eq!(ack, NotificationAck::Settled(1));
    let registrations = app.store.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].registration_number, "P3RT9W");
    assert_eq!(registrations[0].display_code.as_deref(), Some("RBT26-0004"));
    assert_eq!(app.store.payments()[0].status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_items_added_after_card_checkout_survive_settlement() {
    let app = TestApp::new();
    let catalog = app.catalog();
    let member = app.member("nimal@example.com");
    app.add(&member, &catalog.individual, 1).await;
    let order_id = app
        .services()
        .checkout
        .checkout(&member, card_request())
        .await
        .unwrap()
        .order_id()
        .to_string();

    app.add(&member, &catalog.team, 2).await;
    let ack = app
        .services()
        .verification
        .handle_gateway_notification(app.notification(&order_id, "5000.00", 2))
        .await
        .unwrap();
    assert_eq!(ack, NotificationAck::Settled(1));
    assert_eq!(app.store.registrations().len(), 1);

    let carts = app.store.carts();
    assert_eq!(carts.len(), 2);
    assert_eq!(carts[0].status, CartStatus::Completed);
    assert_eq!(carts[1].status, CartStatus::Active);
    assert_eq!(carts[1].items.len(), 1);
    assert_eq!(carts[1].items[0].registration_type_id, catalog.team.id);

    let view = app.services().carts.view(&member).await.unwrap();
    assert_eq!(view.item_count, 1);
}

#[tokio::test]
async fn test_gateway_retry_is_acknowledged_without_changes() {
    let app = TestApp::new();
    let order_id = card_order(&app).await;
    let notification = app.notification(&order_id, "5000.00", 2);

    app.services()
        .verification
        .handle_gateway_notification(notification.clone())
        .await
        .unwrap();
    let ack = app
        .services()
        .verification
        .handle_gateway_notification(notification)
        .await
        .unwrap();

    assert_eq!(ack, NotificationAck::Unchanged);
    assert_eq!(app.store.registrations().len(), 1);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_gateway_bad_signature_rejected() {
    let app = TestApp::new();
    let order_id = card_order(&app).await;
    let mut notification = app.notification(&order_id, "5000.00", 2);
    notification.status_code = -2;

    let err = app
        .services()
        .verification
        .handle_gateway_notification(notification)
        .await
        .unwrap_err();

    assert!(matches!(err, ArenaError::Validation(_)));
    assert_eq!(app.store.payments()[0].status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_gateway_amount_mismatch_rejected() {
    let app = TestApp::new();
    let order_id = card_order(&app).await;

    let err = app
        .services()
        .verification
        .handle_gateway_notification(app.notification(&order_id, "50.00", 2))
        .await
        .unwrap_err();

    assert!(matches!(err, ArenaError::Validation(_)));
    assert_eq!(app.store.payments()[0].status, PaymentStatus::Pending);
    assert!(app.store.registrations().is_empty());
}

#[tokio::test]
async fn test_gateway_failure_marks_payment_failed() {
    let app = TestApp::new();
    let order_id = card_order(&app).await;

    let ack = app
        .services()
        .verification
        .handle_gateway_notification(app.notification(&order_id, "5000.00", -2))
        .await
        .unwrap();

    assert_eq!(ack, NotificationAck::Failed);
    let payment = &app.store.payments()[0];
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(
        payment.metadata.verification[0].outcome,
        VerificationOutcome::Rejected
    );
    assert!(app.store.registrations().is_empty());
    // The cart was closed at checkout; the member starts a new one.
    assert_eq!(app.store.carts()[0].status, CartStatus::Completed);
}

#[tokio::test]
async fn test_gateway_pending_status_changes_nothing() {
    let app = TestApp::new();
    let order_id = card_order(&app).await;

    let ack = app
        .services()
        .verification
        .handle_gateway_notification(app.notification(&order_id, "5000.00", 0))
        .await
        .unwrap();

    assert_eq!(ack, NotificationAck::Unchanged);
    assert_eq!(app.store.payments()[0].status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_gateway_unknown_order_not_found() {
    let app = TestApp::new();

    let err = app
        .services()
        .verification
        .handle_gateway_notification(app.notification("ORDER-NOPE", "5000.00", 2))
        .await
        .unwrap_err();

    assert!(matches!(err, ArenaError::NotFound { entity: "order", .. }));
}
