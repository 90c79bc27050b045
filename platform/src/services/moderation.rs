//! Flag workflows.
//!
//! ```text
//! PENDING ──> REVIEWED ──> RESOLVED | DISMISSED | ESCALATED
//!    └──────────────────> RESOLVED | DISMISSED | ESCALATED
//! ```
//!
//! PENDING and REVIEWED flags are open: they count towards a post's
//! `flagCount` and can be reviewed. Any other status takes the flag out of
//! both, ESCALATED included. Every review recomputes the count from the flag
//! rows inside the store call, never incrementing in place.

use super::{sanitize, Dependencies};
use crate::live::LiveEvent;
use crate::mail::log_failure;
use crate::metrics;
use arena_core::commerce::Page;
use arena_core::mail::FlagRaisedEmail;
use arena_core::moderation::{
    Flag, FlagQuery, FlagReason, FlagReview, FlagSeverity, FlagStatus, ModerationAction,
    Notification, NotificationKind, Post, PostAction,
};
use arena_core::store::FLAG_IDENTITY_CONSTRAINT;
use arena_core::types::{FlagId, ModerationActionId, NotificationId, PostId, User};
use arena_core::{ArenaError, ArenaResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

const DETAILS_MAX: usize = 1000;
const NOTES_MAX: usize = 1000;
const DUPLICATE_FLAG: &str = "You have already flagged this post for this reason";

/// Flag submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFlag {
    /// Post being reported
    pub post_id: PostId,
    /// Why
    pub reason: FlagReason,
    /// Free text
    #[serde(default)]
    pub details: Option<String>,
}

/// Moderator decision on a flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFlag {
    /// Target status; PENDING is refused
    pub status: FlagStatus,
    /// Review notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Optional action on the post
    #[serde(default)]
    pub action: Option<PostAction>,
}

/// Review result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    /// Flag after the review
    pub flag: Flag,
    /// Post after count recomputation and the action
    pub post: Post,
}

/// Flag operations.
pub struct ModerationService {
    deps: Dependencies,
}

impl ModerationService {
    /// New service.
    #[must_use]
    pub const fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    /// Flags a post.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown post
    /// - `Validation` when flagging your own post
    /// - `Conflict` for a repeated (reporter, post, reason)
    pub async fn create_flag(&self, reporter: &User, request: NewFlag) -> ArenaResult<Flag> {
        let store = &self.deps.store;
        let post = store
            .post(request.post_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("post", request.post_id))?;
        if post.author_id == reporter.id {
            return Err(ArenaError::validation("You cannot flag your own post"));
        }
        if store
            .flag_exists(reporter.id, post.id, request.reason)
            .await?
        {
            return Err(ArenaError::conflict(DUPLICATE_FLAG));
        }

        let now = self.deps.clock.now();
        let flag = Flag {
            id: FlagId::new(),
            reporter_id: reporter.id,
            post_id: post.id,
            reason: request.reason,
            details: sanitize::optional(request.details.as_deref(), DETAILS_MAX),
            status: FlagStatus::Pending,
            severity: request.reason.severity(),
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        };
        let post = match store.record_flag(&flag).await {
            Ok(post) => post,
            Err(e) if e.is_unique_violation_of(FLAG_IDENTITY_CONSTRAINT) => {
                return Err(ArenaError::conflict(DUPLICATE_FLAG));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            flag_id = %flag.id,
            post_id = %post.id,
            reporter_id = %reporter.id,
            reason = %flag.reason,
            severity = %flag.severity,
            flag_count = post.flag_count,
            "Post flagged"
        );
        metrics::record_flag_created(flag.severity);

        self.alert_staff(reporter, &post, &flag).await;
        self.deps.feed.publish(LiveEvent::FlagCreated {
            flag_id: flag.id,
            post_id: post.id,
            reason: flag.reason,
            severity: flag.severity,
            flag_count: post.flag_count,
        });

        Ok(flag)
    }

    /// In-app notifications for every staff member, plus email for high
    /// severity. Failures are logged; the flag is already recorded.
    async fn alert_staff(&self, reporter: &User, post: &Post, flag: &Flag) {
        let staff = match self.deps.store.staff().await {
            Ok(staff) => staff,
            Err(e) => {
                error!(flag_id = %flag.id, error = %e, "Could not load staff for flag alerts");
                return;
            }
        };

        let notifications: Vec<Notification> = staff
            .iter()
            .filter(|member| member.id != reporter.id)
            .map(|member| Notification {
                id: NotificationId::new(),
                user_id: member.id,
                kind: NotificationKind::FlagRaised,
                title: format!("Post flagged for {}", flag.reason),
                message: format!(
                    "{} flagged \"{}\" ({} severity)",
                    reporter.display_name, post.title, flag.severity
                ),
                post_id: Some(post.id),
                flag_id: Some(flag.id),
                is_read: false,
                created_at: flag.created_at,
            })
            .collect();
        if !notifications.is_empty() {
            if let Err(e) = self.deps.store.enqueue_notifications(&notifications).await {
                error!(flag_id = %flag.id, error = %e, "Failed to enqueue flag notifications");
            }
        }

        if flag.severity != FlagSeverity::High {
            return;
        }
        for member in staff.iter().filter(|member| member.id != reporter.id) {
            let email = FlagRaisedEmail {
                to: member.email.clone(),
                post_id: post.id,
                post_title: post.title.clone(),
                reporter_name: reporter.display_name.clone(),
                reason: flag.reason,
                severity: flag.severity,
                details: flag.details.clone(),
            };
            let result = self.deps.mailer.send_flag_raised(&email).await;
            log_failure("flag_raised", &member.email, result);
        }
    }

    /// Records a moderator's review of an open flag.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless `moderator` is staff
    /// - `NotFound` for an unknown flag
    /// - `Validation` if the flag is closed or the target is PENDING
    pub async fn review_flag(
        &self,
        moderator: &User,
        flag_id: FlagId,
        request: ReviewFlag,
    ) -> ArenaResult<ReviewOutcome> {
        if !moderator.role.is_staff() {
            return Err(ArenaError::forbidden("Moderator access required"));
        }
        let store = &self.deps.store;
        let mut flag = store
            .flag(flag_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("flag", flag_id))?;
        if !flag.status.is_open() {
            return Err(ArenaError::validation(format!(
                "Flag is already {}",
                flag.status
            )));
        }
        if request.status == FlagStatus::Pending {
            return Err(ArenaError::validation("A flag cannot be moved back to PENDING"));
        }

        let now = self.deps.clock.now();
        let notes = sanitize::optional(request.notes.as_deref(), NOTES_MAX);
        let review = FlagReview {
            flag_id: flag.id,
            post_id: flag.post_id,
            status: request.status,
            reviewer_id: moderator.id,
            notes: notes.clone(),
            reviewed_at: now,
            action: request.action,
            log_entry: ModerationAction {
                id: ModerationActionId::new(),
                moderator_id: moderator.id,
                post_id: flag.post_id,
                flag_id: Some(flag.id),
                flag_status: request.status,
                action: request.action,
                notes: notes.clone(),
                created_at: now,
            },
        };
        let post = store.record_review(&review).await?;

        flag.status = request.status;
        flag.reviewed_by = Some(moderator.id);
        flag.reviewed_at = Some(now);
        flag.review_notes = notes;
        flag.updated_at = now;

        info!(
            flag_id = %flag.id,
            post_id = %post.id,
            moderator_id = %moderator.id,
            status = %flag.status,
            action = request.action.map_or("none", |a| a.as_str()),
            flag_count = post.flag_count,
            "Flag reviewed"
        );
        metrics::record_flag_reviewed(flag.status);

        if !flag.status.is_open() {
            self.deps.feed.publish(LiveEvent::FlagClosed {
                flag_id: flag.id,
                post_id: post.id,
                status: flag.status,
                flag_count: post.flag_count,
                is_flagged: post.is_flagged,
            });
        }

        Ok(ReviewOutcome { flag, post })
    }

    /// Flags, newest first.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless `viewer` is staff.
    pub async fn list_flags(&self, viewer: &User, query: FlagQuery) -> ArenaResult<Page<Flag>> {
        if !viewer.role.is_staff() {
            return Err(ArenaError::forbidden("Moderator access required"));
        }
        Ok(self.deps.store.list_flags(&query).await?)
    }
}
