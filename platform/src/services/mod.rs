//! Business workflows.
//!
//! Each service is a thin orchestrator over [`Dependencies`]: it validates
//! input, reads through the store traits, commits one atomic store call and
//! then runs best-effort side effects (mail, live feed, metrics).
//!
//! - [`CartService`]: add, remove, view
//! - [`CheckoutService`]: bank-transfer and gateway checkout
//! - [`VerificationService`]: admin approval/rejection and gateway callbacks
//! - [`RegistrationService`]: member and admin registration listings
//! - [`ModerationService`]: flag creation, review and listing

pub mod cart;
pub mod checkout;
pub mod moderation;
pub mod registrations;
pub mod verification;

pub use cart::{AddItem, CartItemView, CartService, CartView};
pub use checkout::{CheckoutOutcome, CheckoutRequest, CheckoutService, PaymentChoice};
pub use moderation::{ModerationService, NewFlag, ReviewFlag, ReviewOutcome};
pub use registrations::{MemberRegistration, RegistrationService};
pub use verification::{NotificationAck, VerificationDecision, VerificationService, VerifyPayment};

use crate::config::Config;
use crate::gateway::Gateway;
use crate::live::LiveFeed;
use crate::retry::RetryPolicy;
use arena_core::environment::{Clock, CodeGenerator, OrderSequence};
use arena_core::mail::Mailer;
use arena_core::{ArenaError, ArenaStore, StoreError};
use std::sync::Arc;

/// Shared collaborators injected into every service.
#[derive(Clone)]
pub struct Dependencies {
    /// Persistence
    pub store: Arc<dyn ArenaStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Order id draws
    pub orders: Arc<dyn OrderSequence>,
    /// Registration number and display code draws
    pub codes: Arc<dyn CodeGenerator>,
    /// Outgoing mail
    pub mailer: Arc<dyn Mailer>,
    /// Staff live feed
    pub feed: LiveFeed,
}

/// Every service, wired from one set of dependencies.
#[derive(Clone)]
pub struct Services {
    /// Cart workflows
    pub carts: Arc<CartService>,
    /// Checkout workflows
    pub checkout: Arc<CheckoutService>,
    /// Payment verification
    pub verification: Arc<VerificationService>,
    /// Registration listings
    pub registrations: Arc<RegistrationService>,
    /// Flag workflows
    pub moderation: Arc<ModerationService>,
}

impl Services {
    /// Wires every service.
    #[must_use]
    pub fn new(deps: &Dependencies, config: &Config) -> Self {
        let gateway = Gateway::new(config.gateway.clone());
        let order_policy = RetryPolicy::fixed(
            checkout::ORDER_ID_ATTEMPTS,
            config.checkout.order_retry_delay(),
        );

        Self {
            carts: Arc::new(CartService::new(deps.clone(), config.cart.ttl())),
            checkout: Arc::new(CheckoutService::new(
                deps.clone(),
                gateway.clone(),
                order_policy,
                config.checkout.currency.clone(),
            )),
            verification: Arc::new(VerificationService::new(deps.clone(), gateway)),
            registrations: Arc::new(RegistrationService::new(deps.clone())),
            moderation: Arc::new(ModerationService::new(deps.clone())),
        }
    }
}

/// Failure of one draw-then-write attempt.
///
/// Store errors keep their constraint name so a collision on a freshly
/// drawn code can be told apart from any other failure.
#[derive(Debug, thiserror::Error)]
pub(crate) enum AttemptError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] ArenaError),
}

impl AttemptError {
    /// Unique violation of any of `constraints`.
    pub(crate) fn collided_on(&self, constraints: &[&str]) -> bool {
        match self {
            Self::Store(err) => constraints
                .iter()
                .any(|constraint| err.is_unique_violation_of(constraint)),
            Self::Domain(_) => false,
        }
    }
}

impl From<AttemptError> for ArenaError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Store(err) => err.into(),
            AttemptError::Domain(err) => err,
        }
    }
}

/// Text cleanup shared by every user-supplied field.
pub(crate) mod sanitize {
    /// Trims, drops control characters and angle brackets, collapses runs of
    /// whitespace and truncates to `max_chars`.
    pub fn text(input: &str, max_chars: usize) -> String {
        let mut out = String::with_capacity(input.len().min(max_chars));
        let mut pending_space = false;
        for c in input.chars() {
            if c.is_whitespace() {
                pending_space = !out.is_empty();
                continue;
            }
            if c.is_control() || c == '<' || c == '>' {
                continue;
            }
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
        out.chars().take(max_chars).collect::<String>().trim_end().to_string()
    }

    /// [`text`] for optional fields; blank becomes `None`.
    pub fn optional(input: Option<&str>, max_chars: usize) -> Option<String> {
        input
            .map(|value| text(value, max_chars))
            .filter(|value| !value.is_empty())
    }

    /// Loose address check: one `@` with text on both sides and a dot in
    /// the domain.
    pub fn looks_like_email(value: &str) -> bool {
        match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        }
    }

}
