//! Payment and registration endpoints.
//!
//! - `POST /payments/notify`: gateway callback (form-encoded, signed)
//! - `POST /admin/verify-payment`: admin approval or rejection
//! - `GET /my-registrations`: the caller's registrations
//! - `GET /admin/registrations`: every registration, with display codes

use crate::auth::{RequireAdmin, SessionUser};
use crate::gateway::GatewayNotification;
use crate::server::state::AppState;
use crate::services::{MemberRegistration, NotificationAck, VerificationDecision, VerifyPayment};
use arena_core::commerce::{Page, Pagination, Registration, RegistrationQuery, RegistrationStatus};
use arena_core::types::{PaymentId, RegistrationId};
use arena_web::{ApiResponse, AppError, JsonBody, QueryParams};
use axum::extract::{rejection::FormRejection, Form, State};
use serde::Deserialize;

/// `POST /admin/verify-payment` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentBody {
    /// Payment
    pub payment_id: PaymentId,
    /// Registration of that payment
    pub registration_id: RegistrationId,
    /// `true` approves, `false` rejects
    pub approve: bool,
    /// Required when rejecting
    #[serde(default)]
    pub reject_reason: Option<String>,
}

impl From<VerifyPaymentBody> for VerifyPayment {
    fn from(body: VerifyPaymentBody) -> Self {
        let decision = if body.approve {
            VerificationDecision::Approve
        } else {
            VerificationDecision::Reject {
                reason: body.reject_reason.unwrap_or_default(),
            }
        };
        Self {
            payment_id: body.payment_id,
            registration_id: body.registration_id,
            decision,
        }
    }
}

/// `GET /admin/registrations` query.
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationListParams {
    /// Status filter
    pub status: Option<RegistrationStatus>,
    /// 1-based page
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
}

/// `POST /payments/notify`
///
/// # Errors
///
/// 400 for a malformed or badly signed notification, 404 for an unknown
/// order.
pub async fn gateway_notify(
    State(state): State<AppState>,
    notification: Result<Form<GatewayNotification>, FormRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let Form(notification) =
        notification.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    let ack = state
        .services
        .verification
        .handle_gateway_notification(notification)
        .await?;
    Ok(ApiResponse::message(match ack {
        NotificationAck::Settled(_) => "Payment completed",
        NotificationAck::Failed => "Payment failure recorded",
        NotificationAck::Unchanged => "Notification acknowledged",
    }))
}

/// `POST /admin/verify-payment`
///
/// # Errors
///
/// 403 for non-admins, 400 for a missing reject reason or a mismatched
/// registration, 404 for unknown ids.
pub async fn verify_payment(
    admin: RequireAdmin,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VerifyPaymentBody>,
) -> Result<ApiResponse<Registration>, AppError> {
    let approve = body.approve;
    let registration = state
        .services
        .verification
        .verify_payment(admin.user(), body.into())
        .await?;
    let message = if approve {
        "Payment approved, registration confirmed"
    } else {
        "Payment rejected, registration cancelled"
    };
    Ok(ApiResponse::ok(registration).with_message(message))
}

/// `GET /my-registrations`
///
/// # Errors
///
/// 401 without a session.
pub async fn my_registrations(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<MemberRegistration>>, AppError> {
    let rows = state
        .services
        .registrations
        .for_member(session.user())
        .await?;
    Ok(ApiResponse::ok(rows))
}

/// `GET /admin/registrations?status=&page=&limit=`
///
/// # Errors
///
/// 403 for non-admins, 400 for an unknown status.
pub async fn list_registrations(
    admin: RequireAdmin,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<RegistrationListParams>,
) -> Result<ApiResponse<Page<Registration>>, AppError> {
    let query = RegistrationQuery {
        status: params.status,
        pagination: Pagination::new(params.page, params.limit),
    };
    let page = state
        .services
        .registrations
        .list(admin.user(), query)
        .await?;
    Ok(ApiResponse::ok(page))
}
