//! Payment endpoints.
//!
//! - GET /api/payments - Every payment with ticket (trip, route) and account
//! - POST /api/payments/online - Pay for an issued ticket
//! - POST /api/payments/staff-payment - Record a counter payment for a trip (staff or admin)
//! - PUT /api/payments/:id/status - Change a payment's status (staff or admin)
//!
//! No gateway is contacted: payments are recorded as `completed` with a
//! `MOCK_<uuid>` transaction id.

use super::{Relations, TicketWithTrip};
use crate::auth::{AuthUser, RequireStaff};
use crate::metrics;
use crate::scheduling::seats_remaining;
use crate::server::state::AppState;
use crate::types::{Id, Money, NewPayment, Payment, PaymentMethod, PaymentStatus, User};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Online payment for a ticket.
#[derive(Debug, Deserialize)]
pub struct OnlinePaymentRequest {
    /// Ticket paid for (must exist)
    pub ticket_id: Option<Id>,
    /// Amount, at least 0
    pub amount: Option<f64>,
    /// `ecocash`, `zb`, `cbz`, `usd`, or `zig`
    pub method: Option<String>,
}

/// Counter payment for a trip.
#[derive(Debug, Deserialize)]
pub struct StaffPaymentRequest {
    /// Trip paid for (must exist)
    pub trip_id: Option<Id>,
    /// Amount, at least 0
    pub amount: Option<f64>,
    /// `ecocash`, `zb`, `cbz`, `usd`, or `zig`
    pub method: Option<String>,
}

/// Status change.
#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    /// `pending`, `completed`, or `failed`
    pub status: Option<String>,
}

/// A payment with its ticket and account.
#[derive(Debug, Serialize)]
pub struct PaymentWithRelations {
    /// The payment
    #[serde(flatten)]
    pub payment: Payment,
    /// Linked ticket with trip and route
    pub ticket: Option<TicketWithTrip>,
    /// Account that made or recorded the payment
    pub user: Option<User>,
}

/// Response for listing payments.
#[derive(Debug, Serialize)]
pub struct ListPaymentsResponse {
    /// Every payment
    pub payments: Vec<PaymentWithRelations>,
}

/// Response carrying a payment.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    /// Success message
    pub message: &'static str,
    /// The stored payment
    pub payment: Payment,
}

/// Response after a counter payment.
#[derive(Debug, Serialize)]
pub struct StaffPaymentResponse {
    /// Success message
    pub message: &'static str,
    /// Id of the recorded payment, for ticket generation
    pub payment_id: Id,
}

/// Amount and method, common to both payment bodies.
fn amount_and_method(
    errors: &mut FieldErrors,
    amount: Option<f64>,
    method: Option<String>,
) -> (Option<Money>, Option<PaymentMethod>) {
    let amount = errors.required("amount", amount).and_then(|amount| {
        if !errors.min_number("amount", amount, 0.0) {
            return None;
        }
        let money = Money::from_major(amount);
        if money.is_none() {
            errors.add("amount", "The amount is too large.");
        }
        money
    });
    let method = errors
        .required_str("method", method)
        .and_then(|m| errors.one_of::<PaymentMethod>("method", &m));
    (amount, method)
}

fn mock_transaction_id() -> String {
    format!("MOCK_{}", Uuid::new_v4())
}

// ============================================================================
// Handlers
// ============================================================================

/// List every payment.
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn list_payments(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ListPaymentsResponse>, AppError> {
    let payments = state.store.list_payments().await?;

    let mut relations = Relations::new(state.store.as_ref());
    let mut out = Vec::with_capacity(payments.len());
    for payment in payments {
        let ticket = match payment.ticket_id {
            Some(ticket_id) => relations.ticket_with_trip(ticket_id).await?,
            None => None,
        };
        let user = relations.user(payment.user_id).await?;
        out.push(PaymentWithRelations {
            payment,
            ticket,
            user,
        });
    }

    Ok(Json(ListPaymentsResponse { payments: out }))
}

/// Pay online for an issued ticket.
///
/// The payment is attributed to the caller and recorded against the ticket's
/// trip. A ticket may collect several payments.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/payments/online \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"ticket_id": 3, "amount": 25.0, "method": "ecocash"}'
/// ```
///
/// # Errors
///
/// Returns 422 on field errors, including an unknown ticket.
pub async fn online_payment(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<OnlinePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let mut errors = FieldErrors::new();

    let ticket_id = errors.required("ticket_id", req.ticket_id);
    let ticket = match ticket_id {
        Some(id) => state.store.get_ticket(id).await?,
        None => None,
    };
    if ticket_id.is_some() && ticket.is_none() {
        errors.invalid_selection("ticket_id");
    }
    let (amount, method) = amount_and_method(&mut errors, req.amount, req.method);
    errors.into_result()?;

    let (Some(ticket), Some(amount), Some(method)) = (ticket, amount, method) else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let payment = state
        .store
        .create_payment(
            NewPayment {
                ticket_id: Some(ticket.id),
                trip_id: ticket.trip_id,
                user_id: user.id,
                amount,
                method,
                status: PaymentStatus::Completed,
                transaction_id: Some(mock_transaction_id()),
            },
            state.now(),
        )
        .await?;

    metrics::record_payment("online", payment.amount.cents());
    tracing::info!(
        payment_id = payment.id,
        ticket_id = ticket.id,
        amount = %payment.amount,
        method = %payment.method,
        "Online payment recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            message: "Online payment successful!",
            payment,
        }),
    ))
}

/// Record a counter payment for a trip.
///
/// Refused when every seat on the trip's bus already has a ticket.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/payments/staff-payment \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"trip_id": 1, "amount": 25.0, "method": "usd"}'
/// ```
///
/// # Errors
///
/// - 403 for operators
/// - 422 on field errors, including an unknown trip
/// - 400 when the trip is full
pub async fn staff_payment(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StaffPaymentRequest>,
) -> Result<(StatusCode, Json<StaffPaymentResponse>), AppError> {
    let mut errors = FieldErrors::new();

    let trip_id = errors.required("trip_id", req.trip_id);
    let trip = match trip_id {
        Some(id) => state.store.get_trip(id).await?,
        None => None,
    };
    if trip_id.is_some() && trip.is_none() {
        errors.invalid_selection("trip_id");
    }
    let (amount, method) = amount_and_method(&mut errors, req.amount, req.method);
    errors.into_result()?;

    let (Some(trip), Some(amount), Some(method)) = (trip, amount, method) else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let bus = state
        .store
        .get_bus(trip.bus_id)
        .await?
        .ok_or_else(|| AppError::not_found("Bus", trip.bus_id))?;
    let issued = state.store.taken_seats(trip.id).await?.len();
    if seats_remaining(bus.capacity, issued) <= 0 {
        tracing::info!(trip_id = trip.id, capacity = bus.capacity, issued, "Counter payment refused: trip full");
        return Err(AppError::bad_request("No available seats on this trip."));
    }

    let payment = state
        .store
        .create_payment(
            NewPayment {
                ticket_id: None,
                trip_id: trip.id,
                user_id: staff.user.id,
                amount,
                method,
                status: PaymentStatus::Completed,
                transaction_id: Some(mock_transaction_id()),
            },
            state.now(),
        )
        .await?;

    metrics::record_payment("staff", payment.amount.cents());
    tracing::info!(
        payment_id = payment.id,
        trip_id = trip.id,
        recorded_by = staff.user.id,
        amount = %payment.amount,
        "Counter payment recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(StaffPaymentResponse {
            message: "Staff payment successful!",
            payment_id: payment.id,
        }),
    ))
}

/// Change a payment's status.
///
/// # Errors
///
/// Returns 422 for an unknown status, 404 when the payment does not exist.
pub async fn update_payment_status(
    _staff: RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<PaymentStatusRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let mut errors = FieldErrors::new();
    let status = errors
        .required_str("status", req.status)
        .and_then(|s| errors.one_of::<PaymentStatus>("status", &s));
    errors.into_result()?;
    let Some(status) = status else {
        return Err(AppError::validation("The given data was invalid."));
    };

    if state.store.get_payment(id).await?.is_none() {
        return Err(AppError::not_found("Payment", id));
    }
    let payment = state
        .store
        .update_payment_status(id, status, state.now())
        .await?;

    tracing::info!(payment_id = id, status = %status, "Payment status updated");
    Ok(Json(PaymentResponse {
        message: "Payment status updated successfully!",
        payment,
    }))
}
