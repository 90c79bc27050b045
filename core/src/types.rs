//! Identifiers, money, users and the competition catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

// ============================================================================
// Identifiers
// ============================================================================

define_id!(
    /// Unique identifier for a user account
    UserId
);
define_id!(
    /// Unique identifier for a competition
    CompetitionId
);
define_id!(
    /// Unique identifier for a registration type (individual, team, ...)
    RegistrationTypeId
);
define_id!(
    /// Unique identifier for a cart
    CartId
);
define_id!(
    /// Unique identifier for a cart item
    CartItemId
);
define_id!(
    /// Unique identifier for a payment
    PaymentId
);
define_id!(
    /// Unique identifier for a registration
    RegistrationId
);
define_id!(
    /// Unique identifier for a forum post
    PostId
);
define_id!(
    /// Unique identifier for a flag
    FlagId
);
define_id!(
    /// Unique identifier for a moderation log entry
    ModerationActionId
);
define_id!(
    /// Unique identifier for a notification
    NotificationId
);

// ============================================================================
// Money
// ============================================================================

/// Amount in minor units (cents). Currency lives next to the amount on the
/// records that need it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates an amount from whole major units (`5000` → 5000.00).
    #[must_use]
    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    /// Minor units.
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Major units as a float, for JSON responses.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Display only; fees are far below 2^52 cents
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Two-decimal representation (`5000.00`), as the payment gateway
    /// expects it.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

// ============================================================================
// Users
// ============================================================================

/// Account role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular community member
    Member,
    /// Can review flags and moderate posts
    Moderator,
    /// Full administrative access (payment verification included)
    Admin,
}

text_enum!(Role {
    Member => "member",
    Moderator => "moderator",
    Admin => "admin",
});

impl Role {
    /// Moderators and admins.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

/// An authenticated account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Account id
    pub id: UserId,
    /// Account email
    pub email: String,
    /// Public display name
    pub display_name: String,
    /// Role
    pub role: Role,
}

// ============================================================================
// Competition catalog
// ============================================================================

/// A competition users can register for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competition {
    /// Competition id
    pub id: CompetitionId,
    /// Short uppercase code used as display-code prefix (e.g. `RBT`)
    pub code: String,
    /// Human-readable name
    pub name: String,
    /// Edition year; display codes are scoped to it
    pub year: i32,
    /// Registrations close at this instant
    pub registration_deadline: DateTime<Utc>,
}

impl Competition {
    /// Returns `true` once the registration deadline has passed.
    #[must_use]
    pub fn registration_closed(&self, now: DateTime<Utc>) -> bool {
        now > self.registration_deadline
    }

    /// Two-digit edition year (`2026` → `26`).
    #[must_use]
    pub fn short_year(&self) -> u32 {
        self.year.rem_euclid(100).unsigned_abs()
    }
}

/// A way of entering a competition (individual, team of N, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationType {
    /// Registration type id
    pub id: RegistrationTypeId,
    /// Competition this type belongs to
    pub competition_id: CompetitionId,
    /// Name shown to users
    pub name: String,
    /// Entry fee
    pub fee: Money,
    /// Maximum number of members per entry
    pub max_members: u32,
    /// Inactive types cannot be added to a cart
    pub is_active: bool,
}

// ============================================================================
// Participant / customer details
// ============================================================================

/// One member of an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetails {
    /// Full name
    pub name: String,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone
    #[serde(default)]
    pub phone: Option<String>,
    /// School or institution
    #[serde(default)]
    pub school: Option<String>,
}

/// Snapshot of who is entering: a team name (for team entries) and members.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDetails {
    /// Team name, for team registration types
    #[serde(default)]
    pub team_name: Option<String>,
    /// Members of the entry
    #[serde(default)]
    pub members: Vec<MemberDetails>,
}

/// Contact details captured at checkout. Notifications about a registration
/// go to this email, not necessarily the account email.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: String,
    /// Email address
    #[serde(default)]
    pub email: String,
    /// Phone number
    #[serde(default)]
    pub phone: String,
    /// Street address
    #[serde(default)]
    pub address: Option<String>,
    /// City
    #[serde(default)]
    pub city: Option<String>,
}

impl CustomerDetails {
    /// `"First Last"`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_decimal_string() {
        assert_eq!(Money::from_major(5000).to_decimal_string(), "5000.00");
        assert_eq!(Money::from_cents(1_050).to_decimal_string(), "10.50");
        assert_eq!(Money::from_cents(7).to_decimal_string(), "0.07");
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::from_major(10), Money::from_cents(50)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 1_050);
    }

    #[test]
    fn test_role_text_form() {
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!("moderator".parse::<Role>(), Ok(Role::Moderator));
        assert!("root".parse::<Role>().is_err());
        assert!(Role::Moderator.is_staff());
        assert!(!Role::Member.is_staff());
    }

    #[test]
    fn test_short_year() {
        let competition = Competition {
            id: CompetitionId::new(),
            code: "RBT".to_string(),
            name: "Robotics".to_string(),
            year: 2026,
            registration_deadline: Utc::now(),
        };
        assert_eq!(competition.short_year(), 26);
    }
}
