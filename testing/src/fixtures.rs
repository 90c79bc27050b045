//! Ready-made domain values for tests.

use arena_core::moderation::Post;
use arena_core::types::{
    Competition, CompetitionId, CustomerDetails, MemberDetails, Money, ParticipantDetails,
    PostId, RegistrationType, RegistrationTypeId, Role, User, UserId,
};
use chrono::{DateTime, Utc};

fn user(email: &str, role: Role) -> User {
    User {
        id: UserId::new(),
        email: email.to_string(),
        display_name: email.split('@').next().unwrap_or(email).to_string(),
        role,
    }
}

/// Regular member.
#[must_use]
pub fn member(email: &str) -> User {
    user(email, Role::Member)
}

/// Moderator.
#[must_use]
pub fn moderator(email: &str) -> User {
    user(email, Role::Moderator)
}

/// Admin.
#[must_use]
pub fn admin(email: &str) -> User {
    user(email, Role::Admin)
}

/// Competition of the 2026 edition closing at `deadline`.
#[must_use]
pub fn competition(code: &str, deadline: DateTime<Utc>) -> Competition {
    Competition {
        id: CompetitionId::new(),
        code: code.to_string(),
        name: format!("{code} Challenge"),
        year: 2026,
        registration_deadline: deadline,
    }
}

/// Active registration type with a fee in whole LKR.
#[must_use]
pub fn registration_type(
    competition: &Competition,
    name: &str,
    fee_major: i64,
    max_members: u32,
) -> RegistrationType {
    RegistrationType {
        id: RegistrationTypeId::new(),
        competition_id: competition.id,
        name: name.to_string(),
        fee: Money::from_major(fee_major),
        max_members,
        is_active: true,
    }
}

/// Participant block with `count` members.
#[must_use]
pub fn participant(count: usize) -> ParticipantDetails {
    ParticipantDetails {
        team_name: (count > 1).then(|| "Circuit Breakers".to_string()),
        members: (1..=count)
            .map(|n| MemberDetails {
                name: format!("Member {n}"),
                email: Some(format!("member{n}@example.com")),
                phone: None,
                school: Some("Royal College".to_string()),
            })
            .collect(),
    }
}

/// Complete checkout contact details.
#[must_use]
pub fn customer() -> CustomerDetails {
    CustomerDetails {
        first_name: "Nimal".to_string(),
        last_name: "Perera".to_string(),
        email: "nimal@example.com".to_string(),
        phone: "0771234567".to_string(),
        address: Some("12 Galle Road".to_string()),
        city: Some("Colombo".to_string()),
    }
}

/// Visible, unflagged post.
#[must_use]
pub fn post(author: &User, created_at: DateTime<Utc>) -> Post {
    Post {
        id: PostId::new(),
        author_id: author.id,
        title: "Line follower tuning".to_string(),
        body: "What PID gains are people using?".to_string(),
        is_hidden: false,
        is_pinned: false,
        is_locked: false,
        is_deleted: false,
        flag_count: 0,
        is_flagged: false,
        created_at,
        updated_at: created_at,
    }
}
