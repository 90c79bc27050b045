//! In-memory implementation of every store trait.

use arena_core::commerce::{
    Cart, CartItem, CartStatus, ItemRemoval, Page, Pagination, Payment, PaymentStatus,
    Registration, RegistrationQuery,
};
use arena_core::error::{StoreError, StoreResult};
use arena_core::moderation::{
    Flag, FlagQuery, FlagReason, FlagReview, ModerationAction, Notification, Post,
};
use arena_core::store::{
    ACTIVE_CART_CONSTRAINT, ArenaStore, BankCheckout, CartStore, CatalogStore,
    DISPLAY_CODE_CONSTRAINT, FLAG_IDENTITY_CONSTRAINT, GatewayCheckout, GatewayFailure,
    GatewaySettlement, ModerationStore, ORDER_ID_CONSTRAINT, PaymentStore,
    REGISTRATION_NUMBER_CONSTRAINT, UserStore, VerificationUpdate,
};
use arena_core::types::{
    CartId, CartItemId, Competition, CompetitionId, FlagId, PaymentId, PostId, RegistrationId,
    RegistrationType, RegistrationTypeId, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, (UserId, DateTime<Utc>)>,
    competitions: HashMap<CompetitionId, Competition>,
    registration_types: HashMap<RegistrationTypeId, RegistrationType>,
    carts: Vec<Cart>,
    payments: Vec<Payment>,
    registrations: Vec<Registration>,
    posts: HashMap<PostId, Post>,
    flags: Vec<Flag>,
    log: Vec<ModerationAction>,
    notifications: Vec<Notification>,
    injected_violation: Option<String>,
}

/// In-memory store.
///
/// All state sits behind one mutex, so every trait method is atomic and
/// unique constraints are checked before anything is mutated. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn paginate<T: Clone>(rows: Vec<&T>, pagination: Pagination) -> Page<T> {
    let total = rows.len() as u64;
    let skip = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
    Page {
        items: rows
            .into_iter()
            .skip(skip)
            .take(pagination.limit as usize)
            .cloned()
            .collect(),
        total,
        page: pagination.page,
        limit: pagination.limit,
    }
}

impl State {
    fn open_flag_count(&self, post_id: PostId) -> u32 {
        let count = self
            .flags
            .iter()
            .filter(|f| f.post_id == post_id && f.status.is_open())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn check_new_registrations(&self, registrations: &[Registration]) -> StoreResult<()> {
        let mut numbers: HashSet<&str> = self
            .registrations
            .iter()
            .map(|r| r.registration_number.as_str())
            .collect();
        let mut codes: HashSet<(CompetitionId, &str)> = self
            .registrations
            .iter()
            .filter_map(|r| r.display_code.as_deref().map(|c| (r.competition_id, c)))
            .collect();
        for registration in registrations {
            if !numbers.insert(&registration.registration_number) {
                return Err(unique(REGISTRATION_NUMBER_CONSTRAINT));
            }
            if let Some(code) = registration.display_code.as_deref() {
                if !codes.insert((registration.competition_id, code)) {
                    return Err(unique(DISPLAY_CODE_CONSTRAINT));
                }
            }
        }
        Ok(())
    }

    fn payment_mut(&mut self, id: PaymentId) -> StoreResult<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("payment", id))
    }

    fn active_cart_mut(&mut self, cart_id: CartId) -> StoreResult<&mut Cart> {
        let cart = self
            .carts
            .iter_mut()
            .find(|c| c.id == cart_id)
            .ok_or_else(|| not_found("cart", cart_id))?;
        if cart.status != CartStatus::Active {
            return Err(StoreError::cart_not_active());
        }
        Ok(cart)
    }

    fn take_injected_violation(&mut self) -> StoreResult<()> {
        match self.injected_violation.take() {
            Some(constraint) => Err(unique(&constraint)),
            None => Ok(()),
        }
    }
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    /// Seeds a user and returns it.
    pub fn insert_user(&self, user: User) -> User {
        self.with(|s| s.users.insert(user.id, user.clone()));
        user
    }

    /// Seeds a session token for `user_id`.
    pub fn insert_session(&self, token: &str, user_id: UserId, expires_at: DateTime<Utc>) {
        self.with(|s| s.sessions.insert(token.to_string(), (user_id, expires_at)));
    }

    /// Seeds a competition and returns it.
    pub fn insert_competition(&self, competition: Competition) -> Competition {
        self.with(|s| s.competitions.insert(competition.id, competition.clone()));
        competition
    }

    /// Seeds a registration type and returns it.
    pub fn insert_registration_type(&self, registration_type: RegistrationType) -> RegistrationType {
        self.with(|s| {
            s.registration_types
                .insert(registration_type.id, registration_type.clone())
        });
        registration_type
    }

    /// Seeds a post and returns it.
    pub fn insert_post(&self, post: Post) -> Post {
        self.with(|s| s.posts.insert(post.id, post.clone()));
        post
    }

    /// Makes the next checkout, settlement or verification write fail with a
    /// unique violation of `constraint`, as if a concurrent writer had taken
    /// the value between the service's check and its write.
    pub fn inject_unique_violation(&self, constraint: &str) {
        self.with(|s| s.injected_violation = Some(constraint.to_string()));
    }

    /// Seeds a payment without any constraint checks.
    pub fn insert_payment(&self, payment: Payment) {
        self.with(|s| s.payments.push(payment));
    }

    /// Every cart ever created, any status.
    #[must_use]
    pub fn carts(&self) -> Vec<Cart> {
        self.with(|s| s.carts.clone()).unwrap_or_default()
    }

    /// Every payment.
    #[must_use]
    pub fn payments(&self) -> Vec<Payment> {
        self.with(|s| s.payments.clone()).unwrap_or_default()
    }

    /// Every registration.
    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        self.with(|s| s.registrations.clone()).unwrap_or_default()
    }

    /// Every flag.
    #[must_use]
    pub fn flags(&self) -> Vec<Flag> {
        self.with(|s| s.flags.clone()).unwrap_or_default()
    }

    /// Every queued notification.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.with(|s| s.notifications.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn user_for_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .get(token)
            .filter(|(_, expires_at)| *expires_at > now)
            .and_then(|(user_id, _)| state.users.get(user_id).cloned()))
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn staff(&self) -> StoreResult<Vec<User>> {
        let mut staff: Vec<User> = self
            .lock()?
            .users
            .values()
            .filter(|u| u.role.is_staff())
            .cloned()
            .collect();
        staff.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(staff)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn competition(&self, id: CompetitionId) -> StoreResult<Option<Competition>> {
        Ok(self.lock()?.competitions.get(&id).cloned())
    }

    async fn registration_type(
        &self,
        id: RegistrationTypeId,
    ) -> StoreResult<Option<RegistrationType>> {
        Ok(self.lock()?.registration_types.get(&id).cloned())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn active_cart(&self, user_id: UserId) -> StoreResult<Option<Cart>> {
        Ok(self
            .lock()?
            .carts
            .iter()
            .find(|c| c.user_id == user_id && c.status == CartStatus::Active)
            .cloned())
    }

    async fn create_cart(&self, cart: &Cart) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state
            .carts
            .iter()
            .any(|c| c.user_id == cart.user_id && c.status == CartStatus::Active)
        {
            return Err(unique(ACTIVE_CART_CONSTRAINT));
        }
        state.carts.push(cart.clone());
        Ok(())
    }

    async fn append_item(&self, item: &CartItem, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.lock()?;
        let cart = state.active_cart_mut(item.cart_id)?;
        cart.items.push(item.clone());
        cart.expires_at = expires_at;
        cart.updated_at = item.created_at;
        Ok(())
    }

    async fn cart_item_owner(&self, item_id: CartItemId) -> StoreResult<Option<UserId>> {
        Ok(self
            .lock()?
            .carts
            .iter()
            .find(|c| c.status == CartStatus::Active && c.items.iter().any(|i| i.id == item_id))
            .map(|c| c.user_id))
    }

    async fn remove_item(
        &self,
        item_id: CartItemId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<ItemRemoval> {
        let mut state = self.lock()?;
        let idx = state
            .carts
            .iter()
            .position(|c| c.status == CartStatus::Active && c.items.iter().any(|i| i.id == item_id))
            .ok_or_else(|| not_found("cart item", item_id))?;
        let cart = &mut state.carts[idx];
        cart.items.retain(|i| i.id != item_id);
        if cart.items.is_empty() {
            state.carts.remove(idx);
            Ok(ItemRemoval::CartDeleted)
        } else {
            cart.expires_at = expires_at;
            cart.updated_at = now;
            Ok(ItemRemoval::ItemRemoved)
        }
    }

    async fn set_cart_status(
        &self,
        cart_id: CartId,
        status: CartStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        let cart = state
            .carts
            .iter_mut()
            .find(|c| c.id == cart_id)
            .ok_or_else(|| not_found("cart", cart_id))?;
        cart.status = status;
        cart.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn record_bank_checkout(&self, checkout: &BankCheckout) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.take_injected_violation()?;
        if state
            .payments
            .iter()
            .any(|p| p.order_id == checkout.payment.order_id)
        {
            return Err(unique(ORDER_ID_CONSTRAINT));
        }
        state.check_new_registrations(&checkout.registrations)?;

        let cart = state.active_cart_mut(checkout.cart_id)?;
        cart.status = CartStatus::Completed;
        cart.updated_at = checkout.completed_at;
        state.payments.push(checkout.payment.clone());
        state
            .registrations
            .extend(checkout.registrations.iter().cloned());
        Ok(())
    }

    async fn record_gateway_payment(&self, checkout: &GatewayCheckout) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.take_injected_violation()?;
        if state
            .payments
            .iter()
            .any(|p| p.order_id == checkout.payment.order_id)
        {
            return Err(unique(ORDER_ID_CONSTRAINT));
        }

        let cart = state.active_cart_mut(checkout.cart_id)?;
        cart.status = CartStatus::Completed;
        cart.updated_at = checkout.completed_at;
        state.payments.push(checkout.payment.clone());
        Ok(())
    }

    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
        Ok(self.lock()?.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn payment_by_order_id(&self, order_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .lock()?
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn registration(&self, id: RegistrationId) -> StoreResult<Option<Registration>> {
        Ok(self
            .lock()?
            .registrations
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn registrations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Registration>> {
        let state = self.lock()?;
        let mut rows: Vec<Registration> = state
            .registrations
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_registrations(
        &self,
        query: &RegistrationQuery,
    ) -> StoreResult<Page<Registration>> {
        let state = self.lock()?;
        let mut rows: Vec<&Registration> = state
            .registrations
            .iter()
            .rev()
            .filter(|r| query.status.is_none_or(|s| r.status == s))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, query.pagination))
    }

    async fn registration_number_exists(&self, number: &str) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .registrations
            .iter()
            .any(|r| r.registration_number == number))
    }

    async fn display_code_exists(
        &self,
        competition_id: CompetitionId,
        code: &str,
    ) -> StoreResult<bool> {
        Ok(self.lock()?.registrations.iter().any(|r| {
            r.competition_id == competition_id && r.display_code.as_deref() == Some(code)
        }))
    }

    async fn apply_verification(&self, update: &VerificationUpdate) -> StoreResult<Registration> {
        let mut state = self.lock()?;
        state.take_injected_violation()?;
        let idx = state
            .registrations
            .iter()
            .position(|r| r.id == update.registration_id)
            .ok_or_else(|| not_found("registration", update.registration_id))?;
        if let Some(code) = update.display_code.as_deref() {
            let competition_id = state.registrations[idx].competition_id;
            if state.registrations.iter().any(|r| {
                r.id != update.registration_id
                    && r.competition_id == competition_id
                    && r.display_code.as_deref() == Some(code)
            }) {
                return Err(unique(DISPLAY_CODE_CONSTRAINT));
            }
        }

        let payment = state.payment_mut(update.payment_id)?;
        payment.status = update.payment_status;
        payment.metadata.verification.push(update.audit.clone());
        payment.updated_at = update.updated_at;

        let registration = &mut state.registrations[idx];
        registration.status = update.registration_status;
        if update.display_code.is_some() {
            registration.display_code.clone_from(&update.display_code);
        }
        if update.confirmed_at.is_some() {
            registration.confirmed_at = update.confirmed_at;
        }
        registration.updated_at = update.updated_at;
        Ok(registration.clone())
    }

    async fn settle_gateway_payment(&self, settlement: &GatewaySettlement) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.payment_mut(settlement.payment_id)?.status != PaymentStatus::Pending {
            return Ok(false);
        }
        state.take_injected_violation()?;
        state.check_new_registrations(&settlement.registrations)?;

        let payment = state.payment_mut(settlement.payment_id)?;
        payment.status = PaymentStatus::Completed;
        payment.metadata.gateway = Some(settlement.notice.clone());
        payment.metadata.verification.push(settlement.audit.clone());
        payment.updated_at = settlement.settled_at;
        state
            .registrations
            .extend(settlement.registrations.iter().cloned());
        Ok(true)
    }

    async fn fail_gateway_payment(&self, failure: &GatewayFailure) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let payment = state.payment_mut(failure.payment_id)?;
        if payment.status != PaymentStatus::Pending {
            return Ok(false);
        }
        payment.status = PaymentStatus::Failed;
        payment.metadata.gateway = Some(failure.notice.clone());
        payment.metadata.verification.push(failure.audit.clone());
        payment.updated_at = failure.failed_at;
        Ok(true)
    }
}

#[async_trait]
impl ModerationStore for InMemoryStore {
    async fn post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.lock()?.posts.get(&id).cloned())
    }

    async fn flag(&self, id: FlagId) -> StoreResult<Option<Flag>> {
        Ok(self.lock()?.flags.iter().find(|f| f.id == id).cloned())
    }

    async fn flag_exists(
        &self,
        reporter_id: UserId,
        post_id: PostId,
        reason: FlagReason,
    ) -> StoreResult<bool> {
        Ok(self.lock()?.flags.iter().any(|f| {
            f.reporter_id == reporter_id && f.post_id == post_id && f.reason == reason
        }))
    }

    async fn record_flag(&self, flag: &Flag) -> StoreResult<Post> {
        let mut state = self.lock()?;
        if !state.posts.contains_key(&flag.post_id) {
            return Err(not_found("post", flag.post_id));
        }
        if state.flags.iter().any(|f| {
            f.reporter_id == flag.reporter_id && f.post_id == flag.post_id && f.reason == flag.reason
        }) {
            return Err(unique(FLAG_IDENTITY_CONSTRAINT));
        }
        state.flags.push(flag.clone());

        let open = state.open_flag_count(flag.post_id);
        let post = state
            .posts
            .get_mut(&flag.post_id)
            .ok_or_else(|| not_found("post", flag.post_id))?;
        post.set_open_flags(open);
        post.updated_at = flag.created_at;
        Ok(post.clone())
    }

    async fn record_review(&self, review: &FlagReview) -> StoreResult<Post> {
        let mut state = self.lock()?;
        if !state.posts.contains_key(&review.post_id) {
            return Err(not_found("post", review.post_id));
        }
        let flag = state
            .flags
            .iter_mut()
            .find(|f| f.id == review.flag_id)
            .ok_or_else(|| not_found("flag", review.flag_id))?;
        if !flag.status.is_open() {
            return Err(StoreError::Precondition(format!(
                "Flag is already {}",
                flag.status
            )));
        }
        flag.status = review.status;
        flag.reviewed_by = Some(review.reviewer_id);
        flag.reviewed_at = Some(review.reviewed_at);
        flag.review_notes.clone_from(&review.notes);
        flag.updated_at = review.reviewed_at;

        let open = state.open_flag_count(review.post_id);
        let post = state
            .posts
            .get_mut(&review.post_id)
            .ok_or_else(|| not_found("post", review.post_id))?;
        post.set_open_flags(open);
        if let Some(action) = review.action {
            action.apply(post);
        }
        post.updated_at = review.reviewed_at;
        let post = post.clone();
        state.log.push(review.log_entry.clone());
        Ok(post)
    }

    async fn list_flags(&self, query: &FlagQuery) -> StoreResult<Page<Flag>> {
        let state = self.lock()?;
        let mut rows: Vec<&Flag> = state
            .flags
            .iter()
            .rev()
            .filter(|f| query.status.is_none_or(|s| f.status == s))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, query.pagination))
    }

    async fn moderation_log(&self, post_id: PostId) -> StoreResult<Vec<ModerationAction>> {
        Ok(self
            .lock()?
            .log
            .iter()
            .filter(|entry| entry.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn enqueue_notifications(&self, notifications: &[Notification]) -> StoreResult<()> {
        self.lock()?
            .notifications
            .extend(notifications.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl ArenaStore for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}
