//! Payments, registrations and the verification cascade.

use crate::rows::{PaymentRow, RegistrationRow, convert_all};
use crate::{PostgresStore, db_error, sql_i64};
use arena_core::commerce::{
    CartStatus, Page, Payment, PaymentStatus, Registration, RegistrationQuery,
};
use arena_core::error::{StoreError, StoreResult};
use arena_core::store::{
    BankCheckout, GatewayCheckout, GatewayFailure, GatewaySettlement, PaymentStore,
    VerificationUpdate,
};
use arena_core::types::{CartId, CompetitionId, PaymentId, RegistrationId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use sqlx::types::Json;

async fn insert_payment(conn: &mut PgConnection, payment: &Payment) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO payments (
            id, order_id, user_id, amount_cents, currency, status, method,
            items, customer, metadata, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ",
    )
    .bind(payment.id.as_uuid())
    .bind(&payment.order_id)
    .bind(payment.user_id.as_uuid())
    .bind(payment.amount.cents())
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(payment.method.as_str())
    .bind(Json(&payment.items))
    .bind(Json(&payment.customer))
    .bind(Json(&payment.metadata))
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn insert_registration(
    conn: &mut PgConnection,
    registration: &Registration,
) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO registrations (
            id, user_id, competition_id, registration_type_id, registration_number,
            display_code, status, amount_paid_cents, payment_id, customer, participant,
            confirmed_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ",
    )
    .bind(registration.id.as_uuid())
    .bind(registration.user_id.as_uuid())
    .bind(registration.competition_id.as_uuid())
    .bind(registration.registration_type_id.as_uuid())
    .bind(&registration.registration_number)
    .bind(registration.display_code.as_deref())
    .bind(registration.status.as_str())
    .bind(registration.amount_paid.cents())
    .bind(registration.payment_id.map(|id| *id.as_uuid()))
    .bind(Json(&registration.customer))
    .bind(Json(&registration.participant))
    .bind(registration.confirmed_at)
    .bind(registration.created_at)
    .bind(registration.updated_at)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

/// Moves an ACTIVE cart to COMPLETED. The row lock makes a concurrent
/// checkout of the same cart wait, then find it no longer ACTIVE.
async fn complete_cart(
    conn: &mut PgConnection,
    cart_id: CartId,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let done = sqlx::query(
        "UPDATE carts SET status = $2, updated_at = $3 WHERE id = $1 AND status = 'ACTIVE'",
    )
    .bind(cart_id.as_uuid())
    .bind(CartStatus::Completed.as_str())
    .bind(now)
    .execute(conn)
    .await
    .map_err(db_error)?;
    if done.rows_affected() == 0 {
        return Err(StoreError::cart_not_active());
    }
    Ok(())
}

/// Loads a payment and locks its row until the transaction ends.
async fn lock_payment(conn: &mut PgConnection, id: PaymentId) -> StoreResult<Payment> {
    sqlx::query_as::<_, PaymentRow>(concat!(payment_select!(), " WHERE id = $1 FOR UPDATE"))
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "payment",
            id: id.to_string(),
        })
        .and_then(Payment::try_from)
}

async fn store_payment_state(conn: &mut PgConnection, payment: &Payment) -> StoreResult<()> {
    sqlx::query("UPDATE payments SET status = $2, metadata = $3, updated_at = $4 WHERE id = $1")
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(Json(&payment.metadata))
        .bind(payment.updated_at)
        .execute(conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn record_bank_checkout(&self, checkout: &BankCheckout) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        complete_cart(&mut tx, checkout.cart_id, checkout.completed_at).await?;
        insert_payment(&mut tx, &checkout.payment).await?;
        for registration in &checkout.registrations {
            insert_registration(&mut tx, registration).await?;
        }

        tx.commit().await.map_err(db_error)?;
        tracing::debug!(
            order_id = %checkout.payment.order_id,
            registrations = checkout.registrations.len(),
            "Bank checkout committed"
        );
        Ok(())
    }

    async fn record_gateway_payment(&self, checkout: &GatewayCheckout) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        complete_cart(&mut tx, checkout.cart_id, checkout.completed_at).await?;
        insert_payment(&mut tx, &checkout.payment).await?;

        tx.commit().await.map_err(db_error)?;
        tracing::debug!(order_id = %checkout.payment.order_id, "Gateway checkout committed");
        Ok(())
    }

    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(concat!(payment_select!(), " WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn payment_by_order_id(&self, order_id: &str) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(concat!(payment_select!(), " WHERE order_id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn registration(&self, id: RegistrationId) -> StoreResult<Option<Registration>> {
        sqlx::query_as::<_, RegistrationRow>(concat!(registration_select!(), " WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Registration::try_from)
            .transpose()
    }

    async fn registrations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Registration>> {
        let rows = sqlx::query_as::<_, RegistrationRow>(concat!(
            registration_select!(),
            " WHERE user_id = $1 ORDER BY created_at DESC, seq DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        convert_all(rows)
    }

    async fn list_registrations(
        &self,
        query: &RegistrationQuery,
    ) -> StoreResult<Page<Registration>> {
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        let rows = sqlx::query_as::<_, RegistrationRow>(concat!(
            registration_select!(),
            " WHERE ($1::text IS NULL OR status = $1)",
            " ORDER BY created_at DESC, seq DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(i64::from(query.pagination.limit))
        .bind(sql_i64(query.pagination.offset()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(Page {
            items: convert_all(rows)?,
            total: u64::try_from(total).unwrap_or_default(),
            page: query.pagination.page,
            limit: query.pagination.limit,
        })
    }

    async fn registration_number_exists(&self, number: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM registrations WHERE registration_number = $1)",
        )
        .bind(number)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn display_code_exists(
        &self,
        competition_id: CompetitionId,
        code: &str,
    ) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM registrations WHERE competition_id = $1 AND display_code = $2
            )
            ",
        )
        .bind(competition_id.as_uuid())
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn apply_verification(&self, update: &VerificationUpdate) -> StoreResult<Registration> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut payment = lock_payment(&mut tx, update.payment_id).await?;
        payment.status = update.payment_status;
        payment.metadata.verification.push(update.audit.clone());
        payment.updated_at = update.updated_at;
        store_payment_state(&mut tx, &payment).await?;

        let registration = sqlx::query_as::<_, RegistrationRow>(
            r"
            UPDATE registrations
            SET status = $2,
                display_code = COALESCE($3, display_code),
                confirmed_at = COALESCE($4, confirmed_at),
                updated_at = $5
            WHERE id = $1
            RETURNING id, user_id, competition_id, registration_type_id, registration_number,
                      display_code, status, amount_paid_cents, payment_id, customer, participant,
                      confirmed_at, created_at, updated_at
            ",
        )
        .bind(update.registration_id.as_uuid())
        .bind(update.registration_status.as_str())
        .bind(update.display_code.as_deref())
        .bind(update.confirmed_at)
        .bind(update.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "registration",
            id: update.registration_id.to_string(),
        })?;

        tx.commit().await.map_err(db_error)?;
        Registration::try_from(registration)
    }

    async fn settle_gateway_payment(&self, settlement: &GatewaySettlement) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut payment = lock_payment(&mut tx, settlement.payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Ok(false);
        }
        payment.status = PaymentStatus::Completed;
        payment.metadata.gateway = Some(settlement.notice.clone());
        payment.metadata.verification.push(settlement.audit.clone());
        payment.updated_at = settlement.settled_at;
        store_payment_state(&mut tx, &payment).await?;

        for registration in &settlement.registrations {
            insert_registration(&mut tx, registration).await?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(true)
    }

    async fn fail_gateway_payment(&self, failure: &GatewayFailure) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut payment = lock_payment(&mut tx, failure.payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Ok(false);
        }
        payment.status = PaymentStatus::Failed;
        payment.metadata.gateway = Some(failure.notice.clone());
        payment.metadata.verification.push(failure.audit.clone());
        payment.updated_at = failure.failed_at;
        store_payment_state(&mut tx, &payment).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(true)
    }
}
