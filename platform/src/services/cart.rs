//! Cart workflows.
//!
//! A user has at most one ACTIVE cart. Every successful add pushes the
//! expiry to `now + ttl`; a cart read after its expiry is marked EXPIRED
//! and treated as absent.

use super::{sanitize, Dependencies};
use arena_core::commerce::{Cart, CartItem, CartStatus, ItemRemoval};
use arena_core::store::ACTIVE_CART_CONSTRAINT;
use arena_core::types::{
    CartId, CartItemId, CompetitionId, MemberDetails, ParticipantDetails, RegistrationTypeId,
    User, UserId,
};
use arena_core::{ArenaError, ArenaResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 254;
const PHONE_MAX: usize = 32;
const SCHOOL_MAX: usize = 200;

/// Request to add one registration intent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    /// Competition to enter
    pub competition_id: CompetitionId,
    /// Registration type within it
    pub registration_type_id: RegistrationTypeId,
    /// Team and member details
    pub participant_details: ParticipantDetails,
}

/// Cart item as shown to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    /// Item id (for removal)
    pub id: CartItemId,
    /// Competition
    pub competition_id: CompetitionId,
    /// Competition name
    pub competition_name: String,
    /// Registration type
    pub registration_type_id: RegistrationTypeId,
    /// Registration type name
    pub registration_type_name: String,
    /// Participant snapshot
    pub participant_details: ParticipantDetails,
    /// Fee, major units
    pub unit_price: f64,
    /// Charged amount, major units
    pub subtotal: f64,
    /// When it was added
    pub added_at: DateTime<Utc>,
}

impl From<&CartItem> for CartItemView {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id,
            competition_id: item.competition_id,
            competition_name: item.competition_name.clone(),
            registration_type_id: item.registration_type_id,
            registration_type_name: item.registration_type_name.clone(),
            participant_details: item.participant.clone(),
            unit_price: item.unit_price.as_major(),
            subtotal: item.subtotal.as_major(),
            added_at: item.created_at,
        }
    }
}

/// The caller's cart. Empty when no ACTIVE, unexpired cart exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    /// Cart id, if a cart exists
    pub cart_id: Option<CartId>,
    /// Items, oldest first
    pub items: Vec<CartItemView>,
    /// Number of items
    pub item_count: usize,
    /// Sum of subtotals, major units
    pub subtotal: f64,
    /// Expiry of the cart
    pub expires_at: Option<DateTime<Utc>>,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart_id: None,
            items: Vec::new(),
            item_count: 0,
            subtotal: 0.0,
            expires_at: None,
        }
    }
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            cart_id: Some(cart.id),
            items: cart.items.iter().map(CartItemView::from).collect(),
            item_count: cart.items.len(),
            subtotal: cart.subtotal().as_major(),
            expires_at: Some(cart.expires_at),
        }
    }
}

/// Cart operations.
pub struct CartService {
    deps: Dependencies,
    ttl: Duration,
}

impl CartService {
    /// Service with carts living `ttl` past their last add.
    #[must_use]
    pub const fn new(deps: Dependencies, ttl: Duration) -> Self {
        Self { deps, ttl }
    }

    /// Adds a registration intent to the user's cart, creating the cart if
    /// needed.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown competition or a registration type that
    ///   does not belong to it
    /// - `Validation` past the deadline, for an inactive type, or for bad
    ///   participant details
    pub async fn add_item(&self, user: &User, request: AddItem) -> ArenaResult<CartView> {
        let store = &self.deps.store;
        let now = self.deps.clock.now();

        let competition = store
            .competition(request.competition_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("competition", request.competition_id))?;
        if competition.registration_closed(now) {
            return Err(ArenaError::validation(format!(
                "Registration for {} closed on {}",
                competition.name,
                competition.registration_deadline.format("%Y-%m-%d")
            )));
        }

        let registration_type = store
            .registration_type(request.registration_type_id)
            .await?
            .filter(|t| t.competition_id == competition.id)
            .ok_or_else(|| {
                ArenaError::not_found("registration type", request.registration_type_id)
            })?;
        if !registration_type.is_active {
            return Err(ArenaError::validation(format!(
                "Registration type {} is not open",
                registration_type.name
            )));
        }

        let participant =
            clean_participant(request.participant_details, registration_type.max_members)?;

        let cart = self.open_cart(user.id, now).await?;
        let item = CartItem {
            id: CartItemId::new(),
            cart_id: cart.id,
            competition_id: competition.id,
            registration_type_id: registration_type.id,
            competition_name: competition.name.clone(),
            registration_type_name: registration_type.name.clone(),
            participant,
            unit_price: registration_type.fee,
            subtotal: registration_type.fee,
            created_at: now,
        };
        store.append_item(&item, now + self.ttl).await?;

        info!(
            user_id = %user.id,
            cart_id = %cart.id,
            item_id = %item.id,
            competition = %competition.code,
            "Cart item added"
        );

        let cart = store
            .active_cart(user.id)
            .await?
            .ok_or_else(|| ArenaError::internal("Cart disappeared after adding an item"))?;
        Ok(CartView::from(&cart))
    }

    /// Removes an item from the caller's cart. Removing the last item
    /// deletes the cart.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown item or one in a cart that is no longer
    /// ACTIVE, `Forbidden` for someone else's.
    pub async fn remove_item(&self, user: &User, item_id: CartItemId) -> ArenaResult<ItemRemoval> {
        let store = &self.deps.store;
        let owner = store
            .cart_item_owner(item_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("cart item", item_id))?;
        if owner != user.id {
            return Err(ArenaError::forbidden("Cart item belongs to another user"));
        }

        let now = self.deps.clock.now();
        let removal = store.remove_item(item_id, now, now + self.ttl).await?;
        info!(user_id = %user.id, %item_id, ?removal, "Cart item removed");
        Ok(removal)
    }

    /// The caller's current cart.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn view(&self, user: &User) -> ArenaResult<CartView> {
        let now = self.deps.clock.now();
        match self.deps.store.active_cart(user.id).await? {
            Some(cart) if cart.is_expired_at(now) => {
                self.expire(&cart, now).await?;
                Ok(CartView::empty())
            }
            Some(cart) => Ok(CartView::from(&cart)),
            None => Ok(CartView::empty()),
        }
    }

    /// Marks an expired cart EXPIRED.
    pub(crate) async fn expire(&self, cart: &Cart, now: DateTime<Utc>) -> ArenaResult<()> {
        self.deps
            .store
            .set_cart_status(cart.id, CartStatus::Expired, now)
            .await?;
        info!(cart_id = %cart.id, user_id = %cart.user_id, expired_at = %cart.expires_at, "Cart expired");
        Ok(())
    }

    async fn open_cart(&self, user_id: UserId, now: DateTime<Utc>) -> ArenaResult<Cart> {
        let store = &self.deps.store;
        if let Some(cart) = store.active_cart(user_id).await? {
            if !cart.is_expired_at(now) {
                return Ok(cart);
            }
            self.expire(&cart, now).await?;
        }

        let cart = Cart::open(user_id, now, now + self.ttl);
        match store.create_cart(&cart).await {
            Ok(()) => {
                debug!(cart_id = %cart.id, %user_id, "Cart created");
                Ok(cart)
            }
            // A concurrent request created the cart first; use theirs.
            Err(e) if e.is_unique_violation_of(ACTIVE_CART_CONSTRAINT) => store
                .active_cart(user_id)
                .await?
                .ok_or_else(|| ArenaError::internal("Active cart vanished after a create race")),
            Err(e) => Err(e.into()),
        }
    }
}

fn clean_member(member: MemberDetails, position: usize) -> ArenaResult<MemberDetails> {
    let name = sanitize::text(&member.name, NAME_MAX);
    if name.is_empty() {
        return Err(ArenaError::validation(format!(
            "Member {position} needs a name"
        )));
    }

    let email = sanitize::optional(member.email.as_deref(), EMAIL_MAX);
    if let Some(email) = &email {
        if !sanitize::looks_like_email(email) {
            return Err(ArenaError::validation(format!(
                "Member {position} has an invalid email address"
            )));
        }
    }

    let phone = sanitize::optional(member.phone.as_deref(), PHONE_MAX);
    if let Some(phone) = &phone {
        let valid = phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
        if !valid {
            return Err(ArenaError::validation(format!(
                "Member {position} has an invalid phone number"
            )));
        }
    }

    Ok(MemberDetails {
        name,
        email,
        phone,
        school: sanitize::optional(member.school.as_deref(), SCHOOL_MAX),
    })
}

fn clean_participant(
    participant: ParticipantDetails,
    max_members: u32,
) -> ArenaResult<ParticipantDetails> {
    if participant.members.is_empty() {
        return Err(ArenaError::validation("At least one member is required"));
    }
    if participant.members.len() > max_members as usize {
        return Err(ArenaError::validation(format!(
            "This registration type allows at most {max_members} member(s)"
        )));
    }

    let members = participant
        .members
        .into_iter()
        .enumerate()
        .map(|(idx, member)| clean_member(member, idx + 1))
        .collect::<ArenaResult<Vec<_>>>()?;

    Ok(ParticipantDetails {
        team_name: sanitize::optional(participant.team_name.as_deref(), NAME_MAX),
        members,
    })
}
