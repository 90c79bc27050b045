//! Authentication extractors.
//!
//! Sessions are opaque bearer tokens resolved through the store:
//!
//! ```rust,ignore
//! async fn my_registrations(session: SessionUser, ...) -> ... {
//!     // session.user() is a live, non-expired session's user
//! }
//!
//! async fn verify_payment(admin: RequireAdmin, ...) -> ... {
//!     // admin.user().role == Role::Admin
//! }
//! ```
//!
//! Missing or unknown tokens are rejected with 401; authenticated users
//! without the required role get 403.

use crate::server::state::AppState;
use arena_core::types::{Role, User, UserId};
use arena_core::ArenaError;
use arena_web::{AppError, BearerToken};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated user.
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

impl SessionUser {
    /// The session's user.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.0
    }

    /// The session's user id.
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.0.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let user = state
            .deps
            .store
            .user_for_session(&token, state.deps.clock.now())
            .await
            .map_err(ArenaError::from)?
            .ok_or_else(|| AppError::unauthorized("Invalid or expired session"))?;

        tracing::Span::current().record("user_id", tracing::field::display(user.id));
        Ok(Self(user))
    }
}

/// Authenticated admin.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub User);

impl RequireAdmin {
    /// The admin.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionUser(user) = SessionUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            tracing::warn!(user_id = %user.id, role = %user.role, "Admin route refused");
            return Err(AppError::forbidden("Admin access required"));
        }
        Ok(Self(user))
    }
}

/// Authenticated moderator or admin.
#[derive(Debug, Clone)]
pub struct RequireStaff(pub User);

impl RequireStaff {
    /// The staff member.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionUser(user) = SessionUser::from_request_parts(parts, state).await?;
        if !user.role.is_staff() {
            tracing::warn!(user_id = %user.id, "Staff route refused");
            return Err(AppError::forbidden("Moderator access required"));
        }
        Ok(Self(user))
    }
}
