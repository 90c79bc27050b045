//! Checkout endpoint.

use crate::auth::SessionUser;
use crate::server::state::AppState;
use crate::services::{CheckoutOutcome, CheckoutRequest, PaymentChoice};
use arena_core::types::CustomerDetails;
use arena_web::{ApiResponse, AppError, JsonBody};
use axum::extract::State;
use serde::Deserialize;

/// Payment method as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodParam {
    /// Bank transfer with slip
    Bank,
    /// Hosted card gateway
    Card,
}

/// `POST /checkout` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    /// Contact details
    pub customer_info: CustomerDetails,
    /// `bank` or `card`
    pub payment_method: PaymentMethodParam,
    /// Required for `bank`
    #[serde(default)]
    pub bank_slip_url: Option<String>,
}

impl From<CheckoutBody> for CheckoutRequest {
    fn from(body: CheckoutBody) -> Self {
        let payment = match body.payment_method {
            PaymentMethodParam::Bank => PaymentChoice::Bank {
                bank_slip_url: body.bank_slip_url.unwrap_or_default(),
            },
            PaymentMethodParam::Card => PaymentChoice::Card,
        };
        Self {
            customer: body.customer_info,
            payment,
        }
    }
}

/// `POST /checkout`
///
/// Bank transfer answers `{orderId, registrationNumbers}`; card answers
/// `{orderId, gateway}` with the signed redirect fields.
///
/// # Errors
///
/// 400 for missing fields or an empty/expired cart, 500 when no unique
/// order id could be drawn.
pub async fn checkout(
    session: SessionUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CheckoutBody>,
) -> Result<ApiResponse<CheckoutOutcome>, AppError> {
    let outcome = state
        .services
        .checkout
        .checkout(session.user(), body.into())
        .await?;
    let message = match &outcome {
        CheckoutOutcome::BankTransfer { .. } => {
            "Registration submitted, pending payment verification"
        }
        CheckoutOutcome::Gateway { .. } => "Redirect to the payment gateway to complete payment",
    };
    Ok(ApiResponse::ok(outcome).with_message(message))
}
