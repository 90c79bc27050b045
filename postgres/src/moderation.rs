//! Flags, reviews, the moderation log and notifications.

use crate::rows::{FlagRow, ModerationActionRow, PostRow, convert_all};
use crate::{PostgresStore, db_error, sql_i32, sql_i64};
use arena_core::commerce::Page;
use arena_core::error::{StoreError, StoreResult};
use arena_core::moderation::{
    Flag, FlagQuery, FlagReason, FlagReview, ModerationAction, Notification, Post,
};
use arena_core::store::ModerationStore;
use arena_core::types::{FlagId, PostId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

async fn lock_post(conn: &mut PgConnection, id: PostId) -> StoreResult<Post> {
    sqlx::query_as::<_, PostRow>(concat!(post_select!(), " WHERE id = $1 FOR UPDATE"))
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "post",
            id: id.to_string(),
        })
        .and_then(Post::try_from)
}

async fn open_flag_count(conn: &mut PgConnection, post_id: PostId) -> StoreResult<u32> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM flags WHERE post_id = $1 AND status IN ('PENDING', 'REVIEWED')",
    )
    .bind(post_id.as_uuid())
    .fetch_one(conn)
    .await
    .map_err(db_error)?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

async fn store_post_state(
    conn: &mut PgConnection,
    post: &Post,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        r"
        UPDATE posts
        SET is_hidden = $2, is_pinned = $3, is_locked = $4, is_deleted = $5,
            flag_count = $6, is_flagged = $7, updated_at = $8
        WHERE id = $1
        ",
    )
    .bind(post.id.as_uuid())
    .bind(post.is_hidden)
    .bind(post.is_pinned)
    .bind(post.is_locked)
    .bind(post.is_deleted)
    .bind(sql_i32(post.flag_count))
    .bind(post.is_flagged)
    .bind(now)
    .execute(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl ModerationStore for PostgresStore {
    async fn post(&self, id: PostId) -> StoreResult<Option<Post>> {
        sqlx::query_as::<_, PostRow>(concat!(post_select!(), " WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Post::try_from)
            .transpose()
    }

    async fn flag(&self, id: FlagId) -> StoreResult<Option<Flag>> {
        sqlx::query_as::<_, FlagRow>(concat!(flag_select!(), " WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(Flag::try_from)
            .transpose()
    }

    async fn flag_exists(
        &self,
        reporter_id: UserId,
        post_id: PostId,
        reason: FlagReason,
    ) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM flags WHERE reporter_id = $1 AND post_id = $2 AND reason = $3
            )
            ",
        )
        .bind(reporter_id.as_uuid())
        .bind(post_id.as_uuid())
        .bind(reason.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn record_flag(&self, flag: &Flag) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut post = lock_post(&mut tx, flag.post_id).await?;

        sqlx::query(
            r"
            INSERT INTO flags (
                id, reporter_id, post_id, reason, details, status, severity,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(flag.id.as_uuid())
        .bind(flag.reporter_id.as_uuid())
        .bind(flag.post_id.as_uuid())
        .bind(flag.reason.as_str())
        .bind(flag.details.as_deref())
        .bind(flag.status.as_str())
        .bind(flag.severity.as_str())
        .bind(flag.created_at)
        .bind(flag.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let open = open_flag_count(&mut tx, flag.post_id).await?;
        post.set_open_flags(open);
        post.updated_at = flag.created_at;
        store_post_state(&mut tx, &post, flag.created_at).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(post)
    }

    async fn record_review(&self, review: &FlagReview) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut post = lock_post(&mut tx, review.post_id).await?;

        let updated = sqlx::query(
            r"
            UPDATE flags
            SET status = $2, reviewed_by = $3, reviewed_at = $4, review_notes = $5,
                updated_at = $4
            WHERE id = $1 AND status IN ('PENDING', 'REVIEWED')
            ",
        )
        .bind(review.flag_id.as_uuid())
        .bind(review.status.as_str())
        .bind(review.reviewer_id.as_uuid())
        .bind(review.reviewed_at)
        .bind(review.notes.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM flags WHERE id = $1")
                    .bind(review.flag_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error)?;
            return Err(match status {
                Some(status) => StoreError::Precondition(format!("Flag is already {status}")),
                None => StoreError::NotFound {
                    entity: "flag",
                    id: review.flag_id.to_string(),
                },
            });
        }

        let open = open_flag_count(&mut tx, review.post_id).await?;
        post.set_open_flags(open);
        if let Some(action) = review.action {
            action.apply(&mut post);
        }
        post.updated_at = review.reviewed_at;
        store_post_state(&mut tx, &post, review.reviewed_at).await?;

        let entry = &review.log_entry;
        sqlx::query(
            r"
            INSERT INTO moderation_actions (
                id, moderator_id, post_id, flag_id, flag_status, action, notes, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.moderator_id.as_uuid())
        .bind(entry.post_id.as_uuid())
        .bind(entry.flag_id.map(|id| *id.as_uuid()))
        .bind(entry.flag_status.as_str())
        .bind(entry.action.map(|a| a.as_str()))
        .bind(entry.notes.as_deref())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(post)
    }

    async fn list_flags(&self, query: &FlagQuery) -> StoreResult<Page<Flag>> {
        let status = query.status.map(|s| s.as_str());

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM flags WHERE ($1::text IS NULL OR status = $1)")
                .bind(status)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        let rows = sqlx::query_as::<_, FlagRow>(concat!(
            flag_select!(),
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

    async fn moderation_log(&self, post_id: PostId) -> StoreResult<Vec<ModerationAction>> {
        let rows = sqlx::query_as::<_, ModerationActionRow>(
            r"
            SELECT id, moderator_id, post_id, flag_id, flag_status, action, notes, created_at
            FROM moderation_actions
            WHERE post_id = $1
            ORDER BY seq
            ",
        )
        .bind(post_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        convert_all(rows)
    }

    async fn enqueue_notifications(&self, notifications: &[Notification]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for notification in notifications {
            sqlx::query(
                r"
                INSERT INTO notifications (
                    id, user_id, kind, title, message, post_id, flag_id, is_read, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(notification.id.as_uuid())
            .bind(notification.user_id.as_uuid())
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.post_id.map(|id| *id.as_uuid()))
            .bind(notification.flag_id.map(|id| *id.as_uuid()))
            .bind(notification.is_read)
            .bind(notification.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
