//! Business metrics for the Arena platform.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `arena_checkouts_total{method}` - Completed checkouts by payment method
//! - `arena_order_id_collisions_total` - Order-id draws rejected by the
//!   unique index
//! - `arena_payments_verified_total{outcome, source}` - Verification
//!   decisions
//! - `arena_flags_created_total{severity}` - Flags raised
//! - `arena_flags_reviewed_total{status}` - Flag reviews
//! - `arena_emails_failed_total{template}` - Swallowed mail failures
//! - `arena_rate_limited_total` - Requests rejected with 429 (recorded by
//!   `arena-web`)

use arena_core::commerce::{PaymentMethod, VerificationOutcome, VerificationSource};
use arena_core::moderation::{FlagSeverity, FlagStatus};
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Registers metric descriptions. Call once at startup.
pub fn register_business_metrics() {
    describe_counter!(
        "arena_checkouts_total",
        "Checkouts that created a payment, by payment method"
    );
    describe_counter!(
        "arena_order_id_collisions_total",
        "Order-id draws that collided with an existing payment"
    );
    describe_counter!(
        "arena_payments_verified_total",
        "Payment verification decisions by outcome and source"
    );
    describe_counter!(
        "arena_flags_created_total",
        "Flags raised against posts, by severity"
    );
    describe_counter!(
        "arena_flags_reviewed_total",
        "Flag reviews by resulting status"
    );
    describe_counter!(
        "arena_emails_failed_total",
        "Transactional emails that failed and were dropped"
    );
    describe_counter!(
        "arena_rate_limited_total",
        "Requests rejected by the per-instance rate limiter"
    );

    tracing::info!("Business metrics registered");
}

/// Starts the Prometheus exporter on `addr`.
///
/// # Errors
///
/// Fails if the listener cannot bind or a recorder is already installed.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a checkout.
pub fn record_checkout(method: PaymentMethod) {
    metrics::counter!("arena_checkouts_total", "method" => method.as_str()).increment(1);
}

/// Record an order-id collision.
pub fn record_order_id_collision() {
    metrics::counter!("arena_order_id_collisions_total").increment(1);
}

/// Record a verification decision.
pub fn record_verification(outcome: VerificationOutcome, source: VerificationSource) {
    let outcome = match outcome {
        VerificationOutcome::Approved => "approved",
        VerificationOutcome::Rejected => "rejected",
    };
    let source = match source {
        VerificationSource::Admin => "admin",
        VerificationSource::Gateway => "gateway",
    };
    metrics::counter!(
        "arena_payments_verified_total",
        "outcome" => outcome,
        "source" => source
    )
    .increment(1);
    tracing::debug!(outcome, source, "Recorded payment verification metric");
}

/// Record a new flag.
pub fn record_flag_created(severity: FlagSeverity) {
    metrics::counter!("arena_flags_created_total", "severity" => severity.as_str()).increment(1);
}

/// Record a flag review.
pub fn record_flag_reviewed(status: FlagStatus) {
    metrics::counter!("arena_flags_reviewed_total", "status" => status.as_str()).increment(1);
}

/// Record a dropped email.
pub fn record_email_failure(template: &'static str) {
    metrics::counter!("arena_emails_failed_total", "template" => template).increment(1);
}
