//! Posts, flags, the moderation log and notifications.

use crate::commerce::Pagination;
use crate::types::{FlagId, ModerationActionId, NotificationId, PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A forum post, as far as moderation is concerned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Post id
    pub id: PostId,
    /// Author
    pub author_id: UserId,
    /// Title
    pub title: String,
    /// Body
    pub body: String,
    /// Hidden from non-staff readers
    pub is_hidden: bool,
    /// Pinned to the top of its listing
    pub is_pinned: bool,
    /// Replies disabled
    pub is_locked: bool,
    /// Soft-deleted
    pub is_deleted: bool,
    /// Open (pending or reviewed) flags, recomputed from live rows
    pub flag_count: u32,
    /// `flag_count > 0`
    pub is_flagged: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Stores a freshly counted number of open flags.
    pub fn set_open_flags(&mut self, count: u32) {
        self.flag_count = count;
        self.is_flagged = count > 0;
    }
}

/// Why a post was flagged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Unsolicited promotion
    Spam,
    /// Targeted abuse
    Harassment,
    /// Attacks on protected groups
    HateSpeech,
    /// False or misleading claims
    Misinformation,
    /// Inappropriate content
    Inappropriate,
    /// Not relevant to the forum
    OffTopic,
    /// Anything else (details expected)
    Other,
}

text_enum!(FlagReason {
    Spam => "spam",
    Harassment => "harassment",
    HateSpeech => "hate_speech",
    Misinformation => "misinformation",
    Inappropriate => "inappropriate",
    OffTopic => "off_topic",
    Other => "other",
});

impl FlagReason {
    /// Severity assigned to new flags with this reason.
    #[must_use]
    pub const fn severity(&self) -> FlagSeverity {
        match self {
            Self::Harassment | Self::HateSpeech => FlagSeverity::High,
            Self::Misinformation | Self::Inappropriate => FlagSeverity::Medium,
            Self::Spam | Self::OffTopic | Self::Other => FlagSeverity::Low,
        }
    }
}

/// Flag severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    /// Review when convenient
    Low,
    /// Review soon
    Medium,
    /// Review immediately; moderators are emailed
    High,
}

text_enum!(FlagSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Flag review status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagStatus {
    /// Not looked at yet
    Pending,
    /// Looked at, still open
    Reviewed,
    /// Closed, action taken
    Resolved,
    /// Closed, no action needed
    Dismissed,
    /// Handed to admins
    Escalated,
}

text_enum!(FlagStatus {
    Pending => "PENDING",
    Reviewed => "REVIEWED",
    Resolved => "RESOLVED",
    Dismissed => "DISMISSED",
    Escalated => "ESCALATED",
});

impl FlagStatus {
    /// Open flags count towards a post's `flag_count` and can be reviewed.
    /// RESOLVED and DISMISSED close a flag; ESCALATED hands it to admins and
    /// takes it out of the moderator queue.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Reviewed)
    }
}

/// A user's report against a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    /// Flag id
    pub id: FlagId,
    /// Reporting user
    pub reporter_id: UserId,
    /// Flagged post
    pub post_id: PostId,
    /// Reason
    pub reason: FlagReason,
    /// Free-text details
    pub details: Option<String>,
    /// Review status
    pub status: FlagStatus,
    /// Severity
    pub severity: FlagSeverity,
    /// Reviewing moderator
    pub reviewed_by: Option<UserId>,
    /// Review time
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Reviewer notes
    pub review_notes: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Moderation action applied to a post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostAction {
    /// Hide from readers
    Hide,
    /// Undo hide
    Unhide,
    /// Pin
    Pin,
    /// Undo pin
    Unpin,
    /// Disable replies
    Lock,
    /// Undo lock
    Unlock,
    /// Soft-delete
    Delete,
}

text_enum!(PostAction {
    Hide => "hide",
    Unhide => "unhide",
    Pin => "pin",
    Unpin => "unpin",
    Lock => "lock",
    Unlock => "unlock",
    Delete => "delete",
});

impl PostAction {
    /// Mutates the post field this action controls.
    pub fn apply(self, post: &mut Post) {
        match self {
            Self::Hide => post.is_hidden = true,
            Self::Unhide => post.is_hidden = false,
            Self::Pin => post.is_pinned = true,
            Self::Unpin => post.is_pinned = false,
            Self::Lock => post.is_locked = true,
            Self::Unlock => post.is_locked = false,
            Self::Delete => post.is_deleted = true,
        }
    }
}

/// Immutable moderation log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationAction {
    /// Entry id
    pub id: ModerationActionId,
    /// Acting moderator
    pub moderator_id: UserId,
    /// Affected post
    pub post_id: PostId,
    /// Reviewed flag
    pub flag_id: Option<FlagId>,
    /// Flag status set by the review
    pub flag_status: FlagStatus,
    /// Post action applied, if any
    pub action: Option<PostAction>,
    /// Moderator notes
    pub notes: Option<String>,
    /// When the action was taken
    pub created_at: DateTime<Utc>,
}

/// A flag review, applied atomically by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagReview {
    /// Flag being reviewed
    pub flag_id: FlagId,
    /// Post the flag targets
    pub post_id: PostId,
    /// New flag status
    pub status: FlagStatus,
    /// Reviewer
    pub reviewer_id: UserId,
    /// Reviewer notes
    pub notes: Option<String>,
    /// Review time
    pub reviewed_at: DateTime<Utc>,
    /// Optional post action
    pub action: Option<PostAction>,
    /// Log entry to append
    pub log_entry: ModerationAction,
}

/// Notification kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A post was flagged
    FlagRaised,
}

text_enum!(NotificationKind {
    FlagRaised => "flag_raised",
});

/// Queued in-app notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification id
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    /// Kind
    pub kind: NotificationKind,
    /// Title
    pub title: String,
    /// Message body
    pub message: String,
    /// Related post
    pub post_id: Option<PostId>,
    /// Related flag
    pub flag_id: Option<FlagId>,
    /// Read marker
    pub is_read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Filter for the moderator flag listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagQuery {
    /// Only flags with this status
    pub status: Option<FlagStatus>,
    /// Page
    pub pagination: Pagination,
}
