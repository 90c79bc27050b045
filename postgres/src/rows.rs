//! Row structs and their conversion into domain types.
//!
//! Each `*_select!` macro expands to the canonical column list of a table so
//! queries can append their own `WHERE`/`ORDER BY` with `concat!`.

use arena_core::commerce::{
    Cart, CartItem, ItemSnapshot, Payment, PaymentMetadata, Registration,
};
use arena_core::error::StoreError;
use arena_core::moderation::{Flag, ModerationAction, Post, PostAction};
use arena_core::types::{
    CartId, CartItemId, Competition, CompetitionId, CustomerDetails, FlagId, Money,
    ModerationActionId, ParticipantDetails, PaymentId, PostId, RegistrationId,
    RegistrationType, RegistrationTypeId, User, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

macro_rules! user_select {
    () => {
        "SELECT id, email, display_name, role FROM users"
    };
}

macro_rules! cart_select {
    () => {
        "SELECT id, user_id, status, expires_at, created_at, updated_at FROM carts"
    };
}

macro_rules! cart_item_select {
    () => {
        "SELECT id, cart_id, competition_id, registration_type_id, competition_name, \
         registration_type_name, participant, unit_price_cents, subtotal_cents, created_at \
         FROM cart_items"
    };
}

macro_rules! payment_select {
    () => {
        "SELECT id, order_id, user_id, amount_cents, currency, status, method, items, \
         customer, metadata, created_at, updated_at FROM payments"
    };
}

macro_rules! registration_select {
    () => {
        "SELECT id, user_id, competition_id, registration_type_id, registration_number, \
         display_code, status, amount_paid_cents, payment_id, customer, participant, \
         confirmed_at, created_at, updated_at FROM registrations"
    };
}

macro_rules! post_select {
    () => {
        "SELECT id, author_id, title, body, is_hidden, is_pinned, is_locked, is_deleted, \
         flag_count, is_flagged, created_at, updated_at FROM posts"
    };
}

macro_rules! flag_select {
    () => {
        "SELECT id, reporter_id, post_id, reason, details, status, severity, reviewed_by, \
         reviewed_at, review_notes, created_at, updated_at FROM flags"
    };
}

fn counter(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}

#[derive(FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            display_name: row.display_name,
            role: row.role.parse()?,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct CompetitionRow {
    id: Uuid,
    code: String,
    name: String,
    year: i32,
    registration_deadline: DateTime<Utc>,
}

impl From<CompetitionRow> for Competition {
    fn from(row: CompetitionRow) -> Self {
        Self {
            id: CompetitionId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            year: row.year,
            registration_deadline: row.registration_deadline,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct RegistrationTypeRow {
    id: Uuid,
    competition_id: Uuid,
    name: String,
    fee_cents: i64,
    max_members: i32,
    is_active: bool,
}

impl TryFrom<RegistrationTypeRow> for RegistrationType {
    type Error = StoreError;

    fn try_from(row: RegistrationTypeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RegistrationTypeId::from_uuid(row.id),
            competition_id: CompetitionId::from_uuid(row.competition_id),
            name: row.name,
            fee: Money::from_cents(row.fee_cents),
            max_members: counter(row.max_members, "max_members")?,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct CartRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    pub(crate) const fn id_uuid(&self) -> Uuid {
        self.id
    }

    pub(crate) fn into_cart(self, items: Vec<CartItem>) -> Result<Cart, StoreError> {
        Ok(Cart {
            id: CartId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            status: self.status.parse()?,
            expires_at: self.expires_at,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct CartItemRow {
    id: Uuid,
    cart_id: Uuid,
    competition_id: Uuid,
    registration_type_id: Uuid,
    competition_name: String,
    registration_type_name: String,
    participant: Json<ParticipantDetails>,
    unit_price_cents: i64,
    subtotal_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: CartItemId::from_uuid(row.id),
            cart_id: CartId::from_uuid(row.cart_id),
            competition_id: CompetitionId::from_uuid(row.competition_id),
            registration_type_id: RegistrationTypeId::from_uuid(row.registration_type_id),
            competition_name: row.competition_name,
            registration_type_name: row.registration_type_name,
            participant: row.participant.0,
            unit_price: Money::from_cents(row.unit_price_cents),
            subtotal: Money::from_cents(row.subtotal_cents),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct PaymentRow {
    id: Uuid,
    order_id: String,
    user_id: Uuid,
    amount_cents: i64,
    currency: String,
    status: String,
    method: String,
    items: Json<Vec<ItemSnapshot>>,
    customer: Json<CustomerDetails>,
    metadata: Json<PaymentMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PaymentId::from_uuid(row.id),
            order_id: row.order_id,
            user_id: UserId::from_uuid(row.user_id),
            amount: Money::from_cents(row.amount_cents),
            currency: row.currency,
            status: row.status.parse()?,
            method: row.method.parse()?,
            items: row.items.0,
            customer: row.customer.0,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct RegistrationRow {
    id: Uuid,
    user_id: Uuid,
    competition_id: Uuid,
    registration_type_id: Uuid,
    registration_number: String,
    display_code: Option<String>,
    status: String,
    amount_paid_cents: i64,
    payment_id: Option<Uuid>,
    customer: Json<CustomerDetails>,
    participant: Json<ParticipantDetails>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RegistrationId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            competition_id: CompetitionId::from_uuid(row.competition_id),
            registration_type_id: RegistrationTypeId::from_uuid(row.registration_type_id),
            registration_number: row.registration_number,
            display_code: row.display_code,
            status: row.status.parse()?,
            amount_paid: Money::from_cents(row.amount_paid_cents),
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            customer: row.customer.0,
            participant: row.participant.0,
            confirmed_at: row.confirmed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct PostRow {
    id: Uuid,
    author_id: Uuid,
    title: String,
    body: String,
    is_hidden: bool,
    is_pinned: bool,
    is_locked: bool,
    is_deleted: bool,
    flag_count: i32,
    is_flagged: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = StoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PostId::from_uuid(row.id),
            author_id: UserId::from_uuid(row.author_id),
            title: row.title,
            body: row.body,
            is_hidden: row.is_hidden,
            is_pinned: row.is_pinned,
            is_locked: row.is_locked,
            is_deleted: row.is_deleted,
            flag_count: counter(row.flag_count, "flag_count")?,
            is_flagged: row.is_flagged,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct FlagRow {
    id: Uuid,
    reporter_id: Uuid,
    post_id: Uuid,
    reason: String,
    details: Option<String>,
    status: String,
    severity: String,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlagRow> for Flag {
    type Error = StoreError;

    fn try_from(row: FlagRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: FlagId::from_uuid(row.id),
            reporter_id: UserId::from_uuid(row.reporter_id),
            post_id: PostId::from_uuid(row.post_id),
            reason: row.reason.parse()?,
            details: row.details,
            status: row.status.parse()?,
            severity: row.severity.parse()?,
            reviewed_by: row.reviewed_by.map(UserId::from_uuid),
            reviewed_at: row.reviewed_at,
            review_notes: row.review_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct ModerationActionRow {
    id: Uuid,
    moderator_id: Uuid,
    post_id: Uuid,
    flag_id: Option<Uuid>,
    flag_status: String,
    action: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ModerationActionRow> for ModerationAction {
    type Error = StoreError;

    fn try_from(row: ModerationActionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ModerationActionId::from_uuid(row.id),
            moderator_id: UserId::from_uuid(row.moderator_id),
            post_id: PostId::from_uuid(row.post_id),
            flag_id: row.flag_id.map(FlagId::from_uuid),
            flag_status: row.flag_status.parse()?,
            action: row
                .action
                .as_deref()
                .map(str::parse::<PostAction>)
                .transpose()?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

/// Converts a batch of rows, failing on the first bad one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
