//! Carts, payments and registrations.
//!
//! # Lifecycles
//!
//! ```text
//! Cart:          ACTIVE ──checkout──> COMPLETED
//!                  └────read past expiry──> EXPIRED
//!
//! Payment:       PENDING ──approve / gateway success──> COMPLETED
//!                  └──────reject / gateway failure────> FAILED
//!
//! Registration:  PENDING ──approve──> CONFIRMED ──submission──> SUBMITTED
//!                  └──────reject───> CANCELLED
//! ```

use crate::types::{
    CartId, CartItemId, CompetitionId, CustomerDetails, Money, ParticipantDetails, PaymentId,
    RegistrationId, RegistrationTypeId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Cart
// ============================================================================

/// Cart lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// Open for mutation
    Active,
    /// Converted into a payment
    Completed,
    /// Read after its expiry timestamp
    Expired,
}

text_enum!(CartStatus {
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Expired => "EXPIRED",
});

/// A user's in-progress collection of registration intents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Cart id
    pub id: CartId,
    /// Owner
    pub user_id: UserId,
    /// Status
    pub status: CartStatus,
    /// The cart is treated as expired once read after this instant
    pub expires_at: DateTime<Utc>,
    /// Items, oldest first
    pub items: Vec<CartItem>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty active cart.
    #[must_use]
    pub fn open(user_id: UserId, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            status: CartStatus::Active,
            expires_at,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the cart is past its expiry timestamp.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Sum of item subtotals.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(|item| item.subtotal).sum()
    }
}

/// One registration intent inside a cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Item id
    pub id: CartItemId,
    /// Owning cart
    pub cart_id: CartId,
    /// Competition entered
    pub competition_id: CompetitionId,
    /// Registration type chosen
    pub registration_type_id: RegistrationTypeId,
    /// Competition name at the time the item was added
    pub competition_name: String,
    /// Registration type name at the time the item was added
    pub registration_type_name: String,
    /// Sanitized participant snapshot
    pub participant: ParticipantDetails,
    /// Registration type fee
    pub unit_price: Money,
    /// Amount charged for this item
    pub subtotal: Money,
    /// When the item was added
    pub created_at: DateTime<Utc>,
}

/// Outcome of removing a cart item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemRemoval {
    /// The item was removed; the cart still has items
    ItemRemoved,
    /// The item was the last one; the cart was deleted too
    CartDeleted,
}

// ============================================================================
// Payment
// ============================================================================

/// Payment status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Awaiting verification or gateway confirmation
    Pending,
    /// Money received
    Completed,
    /// Rejected or declined
    Failed,
}

text_enum!(PaymentStatus {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

/// How the customer pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment through the external gateway
    Gateway,
    /// Bank transfer with an uploaded slip, verified by an admin
    BankTransfer,
}

text_enum!(PaymentMethod {
    Gateway => "gateway",
    BankTransfer => "bank_transfer",
});

/// Denormalized copy of a cart item, frozen at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    /// Source cart item
    pub cart_item_id: CartItemId,
    /// Competition entered
    pub competition_id: CompetitionId,
    /// Registration type chosen
    pub registration_type_id: RegistrationTypeId,
    /// Competition name
    pub competition_name: String,
    /// Registration type name
    pub registration_type_name: String,
    /// Participant snapshot
    pub participant: ParticipantDetails,
    /// Amount charged for this item
    pub amount: Money,
}

impl From<&CartItem> for ItemSnapshot {
    fn from(item: &CartItem) -> Self {
        Self {
            cart_item_id: item.id,
            competition_id: item.competition_id,
            registration_type_id: item.registration_type_id,
            competition_name: item.competition_name.clone(),
            registration_type_name: item.registration_type_name.clone(),
            participant: item.participant.clone(),
            amount: item.subtotal,
        }
    }
}

/// Who or what verified a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSource {
    /// An admin reviewed the bank slip
    Admin,
    /// The gateway notified us
    Gateway,
}

/// Verification decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Payment accepted
    Approved,
    /// Payment refused
    Rejected,
}

/// One entry of a payment's verification audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationAudit {
    /// Registration the decision was made for, if any
    pub registration_id: Option<RegistrationId>,
    /// Decision
    pub outcome: VerificationOutcome,
    /// Source of the decision
    pub source: VerificationSource,
    /// Verifying admin (absent for gateway decisions)
    pub verified_by: Option<crate::types::UserId>,
    /// When the decision was made
    pub verified_at: DateTime<Utc>,
    /// Human-entered reason, for rejections
    pub reject_reason: Option<String>,
}

/// Raw facts reported by the gateway callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayNotice {
    /// Gateway-side payment reference
    pub gateway_payment_id: Option<String>,
    /// Gateway status code
    pub status_code: i32,
    /// Amount as reported
    pub amount: String,
    /// Currency as reported
    pub currency: String,
    /// When the callback arrived
    pub received_at: DateTime<Utc>,
}

/// Payment metadata (JSONB).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    /// Cart that was checked out
    #[serde(default)]
    pub cart_id: Option<CartId>,
    /// Cart items that were checked out
    #[serde(default)]
    pub item_ids: Vec<CartItemId>,
    /// Uploaded bank slip reference (bank transfers)
    #[serde(default)]
    pub bank_slip_url: Option<String>,
    /// Last gateway callback (gateway payments)
    #[serde(default)]
    pub gateway: Option<GatewayNotice>,
    /// Verification decisions, oldest first
    #[serde(default)]
    pub verification: Vec<VerificationAudit>,
}

/// A payment for one checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Payment id
    pub id: PaymentId,
    /// Unique order identifier shared with the gateway
    pub order_id: String,
    /// Payer
    pub user_id: UserId,
    /// Total amount
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Status
    pub status: PaymentStatus,
    /// Method
    pub method: PaymentMethod,
    /// Item snapshot, immutable after creation
    pub items: Vec<ItemSnapshot>,
    /// Contact details captured at checkout
    pub customer: CustomerDetails,
    /// Metadata and audit trail
    pub metadata: PaymentMetadata,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Registration
// ============================================================================

/// Registration status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// Payment not yet verified
    Pending,
    /// Payment verified
    Confirmed,
    /// Payment rejected
    Cancelled,
    /// Entry submitted (later stage of the competition)
    Submitted,
}

text_enum!(RegistrationStatus {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
    Submitted => "SUBMITTED",
});

/// A competition entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Registration id
    pub id: RegistrationId,
    /// Owner
    pub user_id: UserId,
    /// Competition entered
    pub competition_id: CompetitionId,
    /// Registration type
    pub registration_type_id: RegistrationTypeId,
    /// Public random identifier
    pub registration_number: String,
    /// Admin-only identifier, assigned on confirmation
    pub display_code: Option<String>,
    /// Status
    pub status: RegistrationStatus,
    /// Amount paid for this entry
    pub amount_paid: Money,
    /// Backing payment (one payment may back several registrations)
    pub payment_id: Option<PaymentId>,
    /// Contact details captured at checkout
    pub customer: CustomerDetails,
    /// Participant snapshot
    pub participant: ParticipantDetails,
    /// When the registration was confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Pagination
// ============================================================================

/// Page request (1-based page).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    /// Page number, starting at 1
    pub page: u32,
    /// Page size
    pub limit: u32,
}

impl Pagination {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest accepted page size.
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a page request, clamping out-of-range values.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total matching rows
    pub total: u64,
    /// Page number
    pub page: u32,
    /// Page size
    pub limit: u32,
}

/// Filter for the admin registration listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistrationQuery {
    /// Only registrations with this status
    pub status: Option<RegistrationStatus>,
    /// Page
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cart_expiry_boundary() {
        let now = Utc::now();
        let cart = Cart::open(UserId::new(), now, now + Duration::minutes(30));
        assert!(!cart.is_expired_at(now));
        assert!(!cart.is_expired_at(now + Duration::minutes(30)));
        assert!(cart.is_expired_at(now + Duration::minutes(31)));
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(Some(0), Some(1_000));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(Pagination::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_status_text_matches_serde() {
        for status in [
            RegistrationStatus::Pending,
            RegistrationStatus::Confirmed,
            RegistrationStatus::Cancelled,
            RegistrationStatus::Submitted,
        ] {
            let json = serde_json::to_string(&status).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap_or_default(),
            "\"bank_transfer\""
        );
    }
}
