//! Persistence traits.
//!
//! Each trait groups the reads and writes of one workflow. Methods that take
//! a compound write (`BankCheckout`, `GatewaySettlement`, `FlagReview`, ...)
//! must apply it atomically: either every row changes or none does.
//!
//! Writes that depend on a row's state are guarded inside the same
//! transaction: a cart must still be ACTIVE, a flag must still be open.
//! A failed guard is [`StoreError::Precondition`](crate::StoreError::Precondition)
//! and changes nothing.
//!
//! Unique constraints are part of the contract. Backends report violations
//! as [`StoreError::UniqueViolation`](crate::StoreError::UniqueViolation)
//! carrying one of the constraint names below, so services can tell an
//! order-id collision from anything else.

use crate::commerce::{
    Cart, CartItem, CartStatus, GatewayNotice, ItemRemoval, Page, Payment, PaymentStatus,
    Registration, RegistrationQuery, RegistrationStatus, VerificationAudit,
};
use crate::error::StoreResult;
use crate::moderation::{
    Flag, FlagQuery, FlagReason, FlagReview, ModerationAction, Notification, Post,
};
use crate::types::{
    CartId, CartItemId, Competition, CompetitionId, FlagId, PaymentId, PostId, RegistrationId,
    RegistrationType, RegistrationTypeId, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Unique index on `payments.order_id`.
pub const ORDER_ID_CONSTRAINT: &str = "payments_order_id_key";
/// Unique index on `registrations.registration_number`.
pub const REGISTRATION_NUMBER_CONSTRAINT: &str = "registrations_registration_number_key";
/// Unique index on `(competition_id, display_code)`.
pub const DISPLAY_CODE_CONSTRAINT: &str = "registrations_competition_display_code_key";
/// Unique index on `(reporter_id, post_id, reason)`.
pub const FLAG_IDENTITY_CONSTRAINT: &str = "flags_reporter_post_reason_key";
/// Partial unique index on `carts(user_id) WHERE status = 'ACTIVE'`.
pub const ACTIVE_CART_CONSTRAINT: &str = "carts_one_active_per_user";

/// Sessions and accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Resolves a bearer token to its user. Unknown or expired sessions
    /// yield `None`.
    async fn user_for_session(&self, token: &str, now: DateTime<Utc>)
    -> StoreResult<Option<User>>;

    /// Looks up a user.
    async fn user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// All moderators and admins.
    async fn staff(&self) -> StoreResult<Vec<User>>;
}

/// Competitions and registration types.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Looks up a competition.
    async fn competition(&self, id: CompetitionId) -> StoreResult<Option<Competition>>;

    /// Looks up a registration type.
    async fn registration_type(
        &self,
        id: RegistrationTypeId,
    ) -> StoreResult<Option<RegistrationType>>;
}

/// Carts and cart items.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's ACTIVE cart with its items (oldest first), regardless of
    /// expiry.
    async fn active_cart(&self, user_id: UserId) -> StoreResult<Option<Cart>>;

    /// Inserts an empty ACTIVE cart. Fails with
    /// [`ACTIVE_CART_CONSTRAINT`] if the user already has one.
    async fn create_cart(&self, cart: &Cart) -> StoreResult<()>;

    /// Appends an item and moves the cart's expiry to `expires_at`. Fails
    /// with a precondition error unless the cart is ACTIVE.
    async fn append_item(&self, item: &CartItem, expires_at: DateTime<Utc>) -> StoreResult<()>;

    /// Owner of the ACTIVE cart holding `item_id`. Items of completed or
    /// expired carts yield `None`.
    async fn cart_item_owner(&self, item_id: CartItemId) -> StoreResult<Option<UserId>>;

    /// Deletes an item from an ACTIVE cart and moves the cart's expiry to
    /// `expires_at`, or deletes the cart when it was the last item.
    async fn remove_item(
        &self,
        item_id: CartItemId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<ItemRemoval>;

    /// Sets a cart's status.
    async fn set_cart_status(
        &self,
        cart_id: CartId,
        status: CartStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// Bank-transfer checkout: one payment, its registrations and the cart
/// completion.
#[derive(Clone, Debug)]
pub struct BankCheckout {
    /// PENDING bank-transfer payment
    pub payment: Payment,
    /// PENDING registrations, one per cart item
    pub registrations: Vec<Registration>,
    /// Cart to mark COMPLETED
    pub cart_id: CartId,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// Gateway checkout: the PENDING payment and the cart completion. The
/// registrations follow from the payment's item snapshot once the gateway
/// confirms.
#[derive(Clone, Debug)]
pub struct GatewayCheckout {
    /// PENDING gateway payment
    pub payment: Payment,
    /// Cart to mark COMPLETED
    pub cart_id: CartId,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// A verification decision for one registration of a payment.
#[derive(Clone, Debug)]
pub struct VerificationUpdate {
    /// Payment being verified
    pub payment_id: PaymentId,
    /// New payment status
    pub payment_status: PaymentStatus,
    /// Audit entry appended to the payment metadata
    pub audit: VerificationAudit,
    /// Registration being verified
    pub registration_id: RegistrationId,
    /// New registration status
    pub registration_status: RegistrationStatus,
    /// Display code to store (approval only)
    pub display_code: Option<String>,
    /// Confirmation time (approval only)
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: DateTime<Utc>,
}

/// Successful gateway callback.
#[derive(Clone, Debug)]
pub struct GatewaySettlement {
    /// Payment to complete
    pub payment_id: PaymentId,
    /// Callback facts
    pub notice: GatewayNotice,
    /// Audit entry
    pub audit: VerificationAudit,
    /// CONFIRMED registrations, one per item snapshot
    pub registrations: Vec<Registration>,
    /// Settlement time
    pub settled_at: DateTime<Utc>,
}

/// Failed gateway callback.
#[derive(Clone, Debug)]
pub struct GatewayFailure {
    /// Payment to fail
    pub payment_id: PaymentId,
    /// Callback facts
    pub notice: GatewayNotice,
    /// Audit entry
    pub audit: VerificationAudit,
    /// Failure time
    pub failed_at: DateTime<Utc>,
}

/// Payments and registrations.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Commits a bank-transfer checkout atomically. Fails with a
    /// precondition error unless the cart is still ACTIVE.
    async fn record_bank_checkout(&self, checkout: &BankCheckout) -> StoreResult<()>;

    /// Inserts a PENDING gateway payment and completes its cart atomically.
    /// Fails with a precondition error unless the cart is still ACTIVE.
    async fn record_gateway_payment(&self, checkout: &GatewayCheckout) -> StoreResult<()>;

    /// Looks up a payment.
    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>>;

    /// Looks up a payment by order id.
    async fn payment_by_order_id(&self, order_id: &str) -> StoreResult<Option<Payment>>;

    /// Looks up a registration.
    async fn registration(&self, id: RegistrationId) -> StoreResult<Option<Registration>>;

    /// A user's registrations, newest first.
    async fn registrations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Registration>>;

    /// Admin listing, newest first.
    async fn list_registrations(
        &self,
        query: &RegistrationQuery,
    ) -> StoreResult<Page<Registration>>;

    /// Returns `true` if the registration number is taken.
    async fn registration_number_exists(&self, number: &str) -> StoreResult<bool>;

    /// Returns `true` if the display code is taken within the competition.
    async fn display_code_exists(
        &self,
        competition_id: CompetitionId,
        code: &str,
    ) -> StoreResult<bool>;

    /// Applies a verification decision to the payment and registration
    /// atomically. Returns the updated registration.
    async fn apply_verification(&self, update: &VerificationUpdate) -> StoreResult<Registration>;

    /// Completes a PENDING gateway payment and creates its registrations.
    /// Returns `false` without changes if the payment is no longer PENDING.
    async fn settle_gateway_payment(&self, settlement: &GatewaySettlement) -> StoreResult<bool>;

    /// Fails a PENDING gateway payment. Returns `false` without changes if
    /// the payment is no longer PENDING.
    async fn fail_gateway_payment(&self, failure: &GatewayFailure) -> StoreResult<bool>;
}

/// Posts, flags, the moderation log and notifications.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Looks up a post.
    async fn post(&self, id: PostId) -> StoreResult<Option<Post>>;

    /// Looks up a flag.
    async fn flag(&self, id: FlagId) -> StoreResult<Option<Flag>>;

    /// Returns `true` if the reporter already flagged the post for `reason`.
    async fn flag_exists(
        &self,
        reporter_id: UserId,
        post_id: PostId,
        reason: FlagReason,
    ) -> StoreResult<bool>;

    /// Inserts a flag and recomputes the post's open-flag count from live
    /// rows. Returns the updated post.
    async fn record_flag(&self, flag: &Flag) -> StoreResult<Post>;

    /// Applies a review: flag status and review metadata, the recomputed
    /// open-flag count, the optional post action, and the log entry.
    /// Returns the updated post. Fails with a precondition error if the
    /// flag is no longer open.
    async fn record_review(&self, review: &FlagReview) -> StoreResult<Post>;

    /// Flag listing, newest first.
    async fn list_flags(&self, query: &FlagQuery) -> StoreResult<Page<Flag>>;

    /// Log entries for a post, oldest first.
    async fn moderation_log(&self, post_id: PostId) -> StoreResult<Vec<ModerationAction>>;

    /// Queues in-app notifications.
    async fn enqueue_notifications(&self, notifications: &[Notification]) -> StoreResult<()>;
}

/// Everything the platform needs from persistence.
#[async_trait]
pub trait ArenaStore:
    UserStore + CatalogStore + CartStore + PaymentStore + ModerationStore
{
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}
