//! Flag workflow tests: creation, staff alerts, reviews and listings.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use arena::live::LiveEvent;
use arena::services::{NewFlag, ReviewFlag};
use arena_core::commerce::Pagination;
use arena_core::moderation::{
    FlagQuery, FlagReason, FlagSeverity, FlagStatus, NotificationKind, Post, PostAction,
};
use arena_core::types::{FlagId, PostId, User};
use arena_core::store::ModerationStore;
use arena_core::ArenaError;
use arena_testing::{fixtures, SentMail};
use common::TestApp;

struct Forum {
    app: TestApp,
    author: User,
    reporter: User,
    moderator: User,
    admin: User,
    post: Post,
}

fn forum() -> Forum {
    let app = TestApp::new();
    let author = app.member("author@example.com");
    let reporter = app.member("reporter@example.com");
    let moderator = app.moderator("mod@arena.test");
    let admin = app.admin("admin@arena.test");
    let post = app.store.insert_post(fixtures::post(&author, app.now()));
    Forum {
        app,
        author,
        reporter,
        moderator,
        admin,
        post,
    }
}

fn flag(post_id: PostId, reason: FlagReason) -> NewFlag {
    NewFlag {
        post_id,
        reason,
        details: None,
    }
}

fn review(status: FlagStatus, action: Option<PostAction>) -> ReviewFlag {
    ReviewFlag {
        status,
        notes: Some("Checked against the forum rules".to_string()),
        action,
    }
}

#[tokio::test]
async fn test_flag_counts_and_notifies_staff() {
    let f = forum();
    let mut events = f.app.feed.subscribe();

    let created = f
        .app
        .services()
        .moderation
        .create_flag(
            &f.reporter,
            NewFlag {
                details: Some("  Links to a   shop ".to_string()),
                ..flag(f.post.id, FlagReason::Spam)
            },
        )
        .await
        .unwrap();

    assert_eq!(created.status, FlagStatus::Pending);
    assert_eq!(created.severity, FlagSeverity::Low);
    assert_eq!(created.details.as_deref(), Some("Links to a shop"));

    let stored = f.app.store.flags();
    assert_eq!(stored.len(), 1);

    let notifications = f.app.store.notifications();
    assert_eq!(notifications.len(), 2);
    assert!(notifications
        .iter()
        .all(|n| n.kind == NotificationKind::FlagRaised && n.flag_id == Some(created.id)));
    let recipients: Vec<_> = notifications.iter().map(|n| n.user_id).collect();
    assert!(recipients.contains(&f.moderator.id));
    assert!(recipients.contains(&f.admin.id));

    // Low severity: in-app only.
    assert!(f.app.mailer.sent().is_empty());

    let event = events.try_recv().unwrap();
    assert_eq!(
        event,
        LiveEvent::FlagCreated {
            flag_id: created.id,
            post_id: f.post.id,
            reason: FlagReason::Spam,
            severity: FlagSeverity::Low,
            flag_count: 1,
        }
    );
}

#[tokio::test]
async fn test_high_severity_emails_staff() {
    let f = forum();

    f.app
        .services()
        .moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Harassment))
        .await
        .unwrap();

    let sent = f.app.mailer.sent();
    assert_eq!(sent.len(), 2);
    let mut recipients: Vec<String> = sent
        .iter()
        .map(|mail| match mail {
            SentMail::FlagRaised(email) => {
                assert_eq!(email.severity, FlagSeverity::High);
                assert_eq!(email.post_title, f.post.title);
                email.to.clone()
            }
            other => panic!("unexpected mail {other:?}"),
        })
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["admin@arena.test", "mod@arena.test"]);
}

#[tokio::test]
async fn test_staff_reporter_is_not_alerted_about_own_flag() {
    let f = forum();

    f.app
        .services()
        .moderation
        .create_flag(&f.moderator, flag(f.post.id, FlagReason::HateSpeech))
        .await
        .unwrap();

    let notifications = f.app.store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, f.admin.id);

    let sent = f.app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], SentMail::FlagRaised(email) if email.to == "admin@arena.test"));
}

#[tokio::test]
async fn test_cannot_flag_own_post() {
    let f = forum();

    let err = f
        .app
        .services()
        .moderation
        .create_flag(&f.author, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap_err();

    assert!(matches!(err, ArenaError::Validation(_)));
    assert!(f.app.store.flags().is_empty());
}

#[tokio::test]
async fn test_unknown_post_not_found() {
    let f = forum();

    let err = f
        .app
        .services()
        .moderation
        .create_flag(&f.reporter, flag(PostId::new(), FlagReason::Spam))
        .await
        .unwrap_err();

    assert!(matches!(err, ArenaError::NotFound { entity: "post", .. }));
}

#[tokio::test]
async fn test_duplicate_reason_conflicts_but_other_reason_counts() {
    let f = forum();
    let moderation = &f.app.services().moderation;

    moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap();
    let err = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Conflict(_)));

    moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::OffTopic))
        .await
        .unwrap();

    assert_eq!(f.app.store.flags().len(), 2);
    let listed = moderation
        .list_flags(
            &f.moderator,
            FlagQuery {
                status: Some(FlagStatus::Pending),
                pagination: Pagination::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(listed.total, 2);
}

#[tokio::test]
async fn test_resolving_one_of_two_flags_keeps_post_flagged() {
    let f = forum();
    let moderation = &f.app.services().moderation;
    let spam = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap();
    let off_topic = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::OffTopic))
        .await
        .unwrap();
    let mut events = f.app.feed.subscribe();

    let outcome = moderation
        .review_flag(
            &f.moderator,
            spam.id,
            review(FlagStatus::Resolved, Some(PostAction::Hide)),
        )
        .await
        .unwrap();
    assert_eq!(outcome.flag.status, FlagStatus::Resolved);
    assert_eq!(outcome.flag.reviewed_by, Some(f.moderator.id));
    assert_eq!(outcome.post.flag_count, 1);
    assert!(outcome.post.is_flagged);
    assert!(outcome.post.is_hidden);

    let outcome = moderation
        .review_flag(&f.admin, off_topic.id, review(FlagStatus::Dismissed, None))
        .await
        .unwrap();
    assert_eq!(outcome.post.flag_count, 0);
    assert!(!outcome.post.is_flagged);
    assert!(outcome.post.is_hidden);

    let first = events.try_recv().unwrap();
    assert!(matches!(
        first,
        LiveEvent::FlagClosed {
            flag_count: 1,
            is_flagged: true,
            ..
        }
    ));
    let second = events.try_recv().unwrap();
    assert!(matches!(
        second,
        LiveEvent::FlagClosed {
            status: FlagStatus::Dismissed,
            flag_count: 0,
            is_flagged: false,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reviewed_flag_stays_open() {
    let f = forum();
    let moderation = &f.app.services().moderation;
    let spam = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap();
    let mut events = f.app.feed.subscribe();

    let outcome = moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Reviewed, None))
        .await
        .unwrap();
    assert_eq!(outcome.flag.status, FlagStatus::Reviewed);
    assert_eq!(outcome.post.flag_count, 1);
    assert!(outcome.post.is_flagged);
    assert!(events.try_recv().is_err());

    // Still open, so it can be reviewed again.
    let outcome = moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Dismissed, None))
        .await
        .unwrap();
    assert_eq!(outcome.post.flag_count, 0);
}

#[tokio::test]
async fn test_escalation_takes_flag_out_of_count() {
    let f = forum();
    let moderation = &f.app.services().moderation;
    let spam = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap();
    let mut events = f.app.feed.subscribe();

    let outcome = moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Escalated, None))
        .await
        .unwrap();
    assert_eq!(outcome.flag.status, FlagStatus::Escalated);
    assert_eq!(outcome.post.flag_count, 0);
    assert!(!outcome.post.is_flagged);
    assert!(matches!(
        events.try_recv().unwrap(),
        LiveEvent::FlagClosed {
            status: FlagStatus::Escalated,
            flag_count: 0,
            is_flagged: false,
            ..
        }
    ));

    let stored = f.app.store.post(f.post.id).await.unwrap().unwrap();
    assert_eq!(stored.flag_count, 0);
    assert!(!stored.is_flagged);

    let err = moderation
        .review_flag(&f.admin, spam.id, review(FlagStatus::Resolved, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Validation(ref m) if m == "Flag is already ESCALATED"));
}

#[tokio::test]
async fn test_review_rules() {
    let f = forum();
    let moderation = &f.app.services().moderation;
    let spam = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap();

    let err = moderation
        .review_flag(&f.reporter, spam.id, review(FlagStatus::Dismissed, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Forbidden(_)));

    let err = moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Pending, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Validation(_)));

    let err = moderation
        .review_flag(&f.moderator, FlagId::new(), review(FlagStatus::Dismissed, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::NotFound { entity: "flag", .. }));

    moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Dismissed, None))
        .await
        .unwrap();
    let err = moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Resolved, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Validation(ref m) if m == "Flag is already DISMISSED"));
}

#[tokio::test]
async fn test_listing_is_staff_only_and_filters_by_status() {
    let f = forum();
    let moderation = &f.app.services().moderation;
    let spam = moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Spam))
        .await
        .unwrap();
    moderation
        .create_flag(&f.reporter, flag(f.post.id, FlagReason::Misinformation))
        .await
        .unwrap();
    moderation
        .review_flag(&f.moderator, spam.id, review(FlagStatus::Resolved, None))
        .await
        .unwrap();

    let err = moderation
        .list_flags(&f.reporter, FlagQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Forbidden(_)));

    let all = moderation
        .list_flags(&f.admin, FlagQuery::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let resolved = moderation
        .list_flags(
            &f.moderator,
            FlagQuery {
                status: Some(FlagStatus::Resolved),
                pagination: Pagination::new(Some(1), Some(10)),
            },
        )
        .await
        .unwrap();
    assert_eq!(resolved.total, 1);
    assert_eq!(resolved.items[0].id, spam.id);
    assert_eq!(resolved.limit, 10);
}
