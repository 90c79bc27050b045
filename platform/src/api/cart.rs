//! Cart endpoints.

use crate::auth::SessionUser;
use crate::server::state::AppState;
use crate::services::{AddItem, CartView};
use arena_core::commerce::ItemRemoval;
use arena_core::types::CartItemId;
use arena_web::{ApiResponse, AppError, JsonBody, QueryParams};
use axum::extract::State;
use serde::Deserialize;

/// `DELETE /cart/remove` query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemParams {
    /// Item to remove
    pub item_id: CartItemId,
}

/// `GET /cart`
///
/// # Errors
///
/// 401 without a session.
pub async fn view_cart(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<ApiResponse<CartView>, AppError> {
    let view = state.services.carts.view(session.user()).await?;
    Ok(ApiResponse::ok(view))
}

/// `POST /cart/add`
///
/// ```bash
/// curl -X POST http://localhost:8080/cart/add \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"competitionId":"...","registrationTypeId":"...",
///        "participantDetails":{"teamName":"Bots","members":[{"name":"Ana"}]}}'
/// ```
///
/// # Errors
///
/// 400 for closed registration or bad participant details, 404 for an
/// unknown competition or registration type.
pub async fn add_item(
    session: SessionUser,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AddItem>,
) -> Result<ApiResponse<CartView>, AppError> {
    let view = state
        .services
        .carts
        .add_item(session.user(), request)
        .await?;
    Ok(ApiResponse::created(view).with_message("Item added to cart"))
}

/// `DELETE /cart/remove?itemId=...`
///
/// # Errors
///
/// 403 for another user's item, 404 for an unknown one.
pub async fn remove_item(
    session: SessionUser,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<RemoveItemParams>,
) -> Result<ApiResponse<()>, AppError> {
    let removal = state
        .services
        .carts
        .remove_item(session.user(), params.item_id)
        .await?;
    Ok(ApiResponse::message(match removal {
        ItemRemoval::ItemRemoved => "Item removed from cart",
        ItemRemoval::CartDeleted => "Item removed, cart is now empty",
    }))
}
