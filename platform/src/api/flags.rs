//! Flag endpoints.

use crate::auth::{RequireStaff, SessionUser};
use crate::server::state::AppState;
use crate::services::{NewFlag, ReviewFlag, ReviewOutcome};
use arena_core::commerce::{Page, Pagination};
use arena_core::moderation::{Flag, FlagQuery, FlagStatus};
use arena_core::types::FlagId;
use arena_web::{ApiResponse, AppError, JsonBody, QueryParams};
use axum::extract::{Path, State};
use serde::Deserialize;

/// `GET /flags` query.
#[derive(Debug, Default, Deserialize)]
pub struct FlagListParams {
    /// Status filter
    pub status: Option<FlagStatus>,
    /// 1-based page
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
}

/// `POST /flags`
///
/// # Errors
///
/// 400 for your own post, 404 for an unknown post, 409 for a repeated
/// reason.
pub async fn create_flag(
    session: SessionUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<NewFlag>,
) -> Result<ApiResponse<Flag>, AppError> {
    let flag = state
        .services
        .moderation
        .create_flag(session.user(), request)
        .await?;
    Ok(ApiResponse::created(flag).with_message("Thanks, a moderator will review this post"))
}

/// `GET /flags?status=&page=&limit=`
///
/// # Errors
///
/// 403 for members.
pub async fn list_flags(
    staff: RequireStaff,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<FlagListParams>,
) -> Result<ApiResponse<Page<Flag>>, AppError> {
    let query = FlagQuery {
        status: params.status,
        pagination: Pagination::new(params.page, params.limit),
    };
    let page = state
        .services
        .moderation
        .list_flags(staff.user(), query)
        .await?;
    Ok(ApiResponse::ok(page))
}

/// `POST /flags/:id/review`
///
/// # Errors
///
/// 403 for members, 404 for an unknown flag, 400 for a closed flag or a
/// PENDING target.
pub async fn review_flag(
    staff: RequireStaff,
    State(state): State<AppState>,
    Path(flag_id): Path<FlagId>,
    JsonBody(request): JsonBody<ReviewFlag>,
) -> Result<ApiResponse<ReviewOutcome>, AppError> {
    let outcome = state
        .services
        .moderation
        .review_flag(staff.user(), flag_id, request)
        .await?;
    Ok(ApiResponse::ok(outcome).with_message("Flag reviewed"))
}
