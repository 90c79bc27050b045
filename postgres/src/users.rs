//! Sessions, accounts and the competition catalog.

use crate::rows::{CompetitionRow, RegistrationTypeRow, UserRow, convert_all};
use crate::{PostgresStore, db_error};
use arena_core::error::StoreResult;
use arena_core::store::{CatalogStore, UserStore};
use arena_core::types::{
    Competition, CompetitionId, RegistrationType, RegistrationTypeId, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
impl UserStore for PostgresStore {
    async fn user_for_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            r"
            SELECT u.id, u.email, u.display_name, u.role
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = $1 AND s.expires_at > $2
            ",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(User::try_from)
        .transpose()
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(concat!(user_select!(), " WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn staff(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(concat!(
            user_select!(),
            " WHERE role IN ('moderator', 'admin') ORDER BY email"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        convert_all(rows)
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn competition(&self, id: CompetitionId) -> StoreResult<Option<Competition>> {
        let row = sqlx::query_as::<_, CompetitionRow>(
            r"
            SELECT id, code, name, year, registration_deadline
            FROM competitions
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Competition::from))
    }

    async fn registration_type(
        &self,
        id: RegistrationTypeId,
    ) -> StoreResult<Option<RegistrationType>> {
        sqlx::query_as::<_, RegistrationTypeRow>(
            r"
            SELECT id, competition_id, name, fee_cents, max_members, is_active
            FROM registration_types
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(RegistrationType::try_from)
        .transpose()
    }
}
