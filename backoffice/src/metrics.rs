//! Business metrics for the back office.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `busdesk_accounts_created_total{role}` - Accounts created, by role
//! - `busdesk_logins_total{outcome}` - Login attempts (`success`, `failure`)
//! - `busdesk_trips_created_total` - Trips scheduled
//! - `busdesk_tickets_issued_total` - Tickets generated from payments
//! - `busdesk_payments_total{channel}` - Payments recorded (`online`, `staff`)
//! - `busdesk_payment_amount_cents_total` - Sum of recorded payments in cents

use busdesk_auth::Role;
use metrics::describe_counter;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "busdesk_accounts_created_total",
        "Total number of accounts created, by role"
    );
    describe_counter!(
        "busdesk_logins_total",
        "Total number of login attempts by outcome (success, failure)"
    );
    describe_counter!("busdesk_trips_created_total", "Total number of trips scheduled");
    describe_counter!(
        "busdesk_tickets_issued_total",
        "Total number of tickets generated from completed payments"
    );
    describe_counter!(
        "busdesk_payments_total",
        "Total number of payments recorded by channel (online, staff)"
    );
    describe_counter!(
        "busdesk_payment_amount_cents_total",
        "Total amount of recorded payments in cents"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record an account creation.
pub fn record_account_created(role: Role) {
    metrics::counter!("busdesk_accounts_created_total", "role" => role.as_str()).increment(1);
    tracing::debug!(role = %role, "Recorded account_created metric");
}

/// Record a login attempt.
pub fn record_login(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("busdesk_logins_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded login metric");
}

/// Record a scheduled trip.
pub fn record_trip_created() {
    metrics::counter!("busdesk_trips_created_total").increment(1);
    tracing::debug!("Recorded trip_created metric");
}

/// Record an issued ticket.
pub fn record_ticket_issued() {
    metrics::counter!("busdesk_tickets_issued_total").increment(1);
    tracing::debug!("Recorded ticket_issued metric");
}

/// Record a payment.
///
/// # Arguments
///
/// * `channel` - `online` or `staff`
/// * `amount_cents` - Payment amount in cents
pub fn record_payment(channel: &'static str, amount_cents: u64) {
    metrics::counter!("busdesk_payments_total", "channel" => channel).increment(1);
    metrics::counter!("busdesk_payment_amount_cents_total").increment(amount_cents);
    tracing::debug!(channel, amount_cents, "Recorded payment metric");
}
