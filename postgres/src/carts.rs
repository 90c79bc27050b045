//! Carts and cart items.

use crate::rows::{CartItemRow, CartRow};
use crate::{PostgresStore, db_error};
use arena_core::commerce::{Cart, CartItem, CartStatus, ItemRemoval};
use arena_core::error::{StoreError, StoreResult};
use arena_core::store::CartStore;
use arena_core::types::{CartId, CartItemId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

#[async_trait]
impl CartStore for PostgresStore {
    async fn active_cart(&self, user_id: UserId) -> StoreResult<Option<Cart>> {
        let Some(cart) = sqlx::query_as::<_, CartRow>(concat!(
            cart_select!(),
            " WHERE user_id = $1 AND status = 'ACTIVE'"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CartItemRow>(concat!(
            cart_item_select!(),
            " WHERE cart_id = $1 ORDER BY seq"
        ))
        .bind(cart.id_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        cart.into_cart(items.into_iter().map(CartItem::from).collect())
            .map(Some)
    }

    async fn create_cart(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO carts (id, user_id, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.status.as_str())
        .bind(cart.expires_at)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn append_item(&self, item: &CartItem, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let updated = sqlx::query(
            "UPDATE carts SET expires_at = $2, updated_at = $3 WHERE id = $1 AND status = 'ACTIVE'",
        )
        .bind(item.cart_id.as_uuid())
        .bind(expires_at)
        .bind(item.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::cart_not_active());
        }

        sqlx::query(
            r"
            INSERT INTO cart_items (
                id, cart_id, competition_id, registration_type_id, competition_name,
                registration_type_name, participant, unit_price_cents, subtotal_cents, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.competition_id.as_uuid())
        .bind(item.registration_type_id.as_uuid())
        .bind(&item.competition_name)
        .bind(&item.registration_type_name)
        .bind(Json(&item.participant))
        .bind(item.unit_price.cents())
        .bind(item.subtotal.cents())
        .bind(item.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn cart_item_owner(&self, item_id: CartItemId) -> StoreResult<Option<UserId>> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            r"
            SELECT c.user_id
            FROM cart_items i
            JOIN carts c ON c.id = i.cart_id
            WHERE i.id = $1 AND c.status = 'ACTIVE'
            ",
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(owner.map(UserId::from_uuid))
    }

    async fn remove_item(
        &self,
        item_id: CartItemId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<ItemRemoval> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let cart_id: Uuid = sqlx::query_scalar(
            r"
            DELETE FROM cart_items i
            USING carts c
            WHERE i.id = $1 AND c.id = i.cart_id AND c.status = 'ACTIVE'
            RETURNING i.cart_id
            ",
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "cart item",
            id: item_id.to_string(),
        })?;

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        let outcome = if remaining == 0 {
            sqlx::query("DELETE FROM carts WHERE id = $1")
                .bind(cart_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            ItemRemoval::CartDeleted
        } else {
            sqlx::query("UPDATE carts SET updated_at = $2, expires_at = $3 WHERE id = $1")
                .bind(cart_id)
                .bind(now)
                .bind(expires_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            ItemRemoval::ItemRemoved
        };

        tx.commit().await.map_err(db_error)?;
        Ok(outcome)
    }

    async fn set_cart_status(
        &self,
        cart_id: CartId,
        status: CartStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE carts SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(cart_id.as_uuid())
            .bind(status.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "cart",
                id: cart_id.to_string(),
            });
        }
        Ok(())
    }
}
