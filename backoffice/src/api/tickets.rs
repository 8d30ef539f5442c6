//! Ticket endpoints.
//!
//! - GET /api/tickets/my - The caller's tickets, 20 per page
//! - GET /api/tickets/admin-tickets - Every ticket, 20 per page (admin)
//! - POST /api/tickets/generate - Issue a ticket for a completed payment (admin)
//! - GET /api/tickets/:id - One ticket with trip, account, and payment details
//! - DELETE /api/tickets/:id - Remove a ticket (admin)
//!
//! # Issuance
//!
//! A ticket is issued against exactly one completed payment. The seat is the
//! lowest free seat on the trip's bus; the code is `{route_code}-XXXXXXXX`.
//! Inserting the ticket and linking the payment happen in one transaction, so
//! two concurrent requests for the same payment cannot both succeed.

use super::{MessageResponse, Relations, TripWithRoute};
use crate::auth::middleware::ADMIN_ONLY;
use crate::auth::{AuthUser, RequireAdmin};
use crate::codes::ticket_code;
use crate::metrics;
use crate::scheduling::lowest_free_seat;
use crate::server::state::AppState;
use crate::types::{Id, Money, NewTicket, Payment, PaymentStatus, Ticket, TicketStatus, Trip, User};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody, Page, PageQuery, PageRequest};
use serde::{Deserialize, Serialize};

const TICKETS_PER_PAGE: u32 = 20;

const NO_SEATS: &str = "No available seats on this trip.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to issue a ticket.
#[derive(Debug, Deserialize)]
pub struct GenerateTicketRequest {
    /// A completed payment without a ticket
    pub payment_id: Option<Id>,
}

/// A ticket with its trip (and route), account, and payment.
#[derive(Debug, Serialize)]
pub struct TicketWithRelations {
    /// The ticket
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Trip with route
    pub trip: Option<TripWithRoute>,
    /// Owning account
    pub user: Option<User>,
    /// Earliest payment recorded against the ticket
    pub payment: Option<Payment>,
}

/// Response for listing tickets.
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    /// One page of tickets
    pub tickets: Page<TicketWithRelations>,
}

/// Response after issuing a ticket.
#[derive(Debug, Serialize)]
pub struct GenerateTicketResponse {
    /// Success message
    pub message: &'static str,
    /// The new ticket
    pub ticket: Ticket,
    /// The payment, now linked to the ticket
    pub payment: Payment,
}

/// Amount paid for a ticket, or `"N/A"` without a payment.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AmountPaid {
    /// Paid amount
    Paid(Money),
    /// No payment recorded
    NotAvailable(&'static str),
}

impl From<Option<&Payment>> for AmountPaid {
    fn from(payment: Option<&Payment>) -> Self {
        payment.map_or(Self::NotAvailable("N/A"), |p| Self::Paid(p.amount))
    }
}

/// Ticket details.
#[derive(Debug, Serialize)]
pub struct TicketDetailsResponse {
    /// The ticket
    pub ticket: Ticket,
    /// Its trip
    pub trip_details: Option<Trip>,
    /// Owning account
    pub user_details: Option<User>,
    /// Earliest payment recorded against the ticket
    pub payment_details: Option<Payment>,
    /// Amount of that payment, or `"N/A"`
    pub amount_paid: AmountPaid,
}

async fn page_of_tickets(
    state: &AppState,
    owner: Option<Id>,
    request: PageRequest,
) -> Result<Page<TicketWithRelations>, AppError> {
    let (tickets, total) = state.store.page_tickets(owner, request).await?;

    let mut relations = Relations::new(state.store.as_ref());
    let mut data = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        let trip = relations.trip_with_route(ticket.trip_id).await?;
        let user = relations.user(ticket.user_id).await?;
        let payment = relations.payment_for_ticket(ticket.id).await?;
        data.push(TicketWithRelations {
            ticket,
            trip,
            user,
            payment,
        });
    }
    Ok(Page::new(data, request, total))
}

async fn find_ticket(state: &AppState, id: Id) -> Result<Ticket, AppError> {
    state
        .store
        .get_ticket(id)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket", id))
}

/// Draw ticket codes until one is unused.
async fn unused_ticket_code(state: &AppState, route_code: Option<&str>) -> Result<String, AppError> {
    loop {
        let code = ticket_code(route_code, &mut rand::thread_rng());
        if !state.store.ticket_code_exists(&code).await? {
            return Ok(code);
        }
        tracing::debug!(code = %code, "Ticket code collision, drawing again");
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// The caller's tickets, newest first.
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn my_tickets(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTicketsResponse>, AppError> {
    let tickets = page_of_tickets(&state, Some(user.id), query.with_per_page(TICKETS_PER_PAGE)).await?;
    Ok(Json(ListTicketsResponse { tickets }))
}

/// Every ticket, newest first.
///
/// # Errors
///
/// Returns 401/403 for non-admins, 500 on storage failure.
pub async fn all_tickets(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTicketsResponse>, AppError> {
    let tickets = page_of_tickets(&state, None, query.with_per_page(TICKETS_PER_PAGE)).await?;
    Ok(Json(ListTicketsResponse { tickets }))
}

/// Issue a ticket for a completed payment.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/tickets/generate \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"payment_id": 7}'
/// ```
///
/// # Errors
///
/// - 403 for non-admins
/// - 422 when the payment does not exist
/// - 400 when the payment is not completed or the trip is full
/// - 409 when the payment already has a ticket
/// - 404 when the payment's trip or account is gone
pub async fn generate_ticket(
    AuthUser { user: caller, .. }: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GenerateTicketRequest>,
) -> Result<(StatusCode, Json<GenerateTicketResponse>), AppError> {
    if !caller.role.is_admin() {
        tracing::warn!(
            user_id = caller.id,
            role = %caller.role,
            "Unauthorized attempt to generate ticket"
        );
        return Err(AppError::forbidden(ADMIN_ONLY));
    }

    let mut errors = FieldErrors::new();
    let payment_id = errors.required("payment_id", req.payment_id);
    let payment = match payment_id {
        Some(id) => state.store.get_payment(id).await?,
        None => None,
    };
    if payment_id.is_some() && payment.is_none() {
        errors.invalid_selection("payment_id");
    }
    errors.into_result()?;
    let Some(payment) = payment else {
        return Err(AppError::validation("The given data was invalid."));
    };

    if payment.status != PaymentStatus::Completed {
        tracing::warn!(
            payment_id = payment.id,
            status = %payment.status,
            "Ticket requested for an uncompleted payment"
        );
        return Err(AppError::bad_request("Payment not completed. Cannot generate ticket."));
    }

    if let Some(ticket_id) = payment.ticket_id {
        tracing::info!(payment_id = payment.id, ticket_id, "Ticket already generated for payment");
        return Err(AppError::conflict("Ticket already generated for this payment.")
            .with_context("ticket_id", ticket_id));
    }

    let mut relations = Relations::new(state.store.as_ref());
    let trip = relations
        .trip(payment.trip_id)
        .await?
        .ok_or_else(|| AppError::not_found("Trip", payment.trip_id))?;
    let owner = relations
        .user(payment.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", payment.user_id))?;
    let bus = relations
        .bus(trip.bus_id)
        .await?
        .ok_or_else(|| AppError::not_found("Bus", trip.bus_id))?;
    let route = relations.route(trip.route_id).await?;

    let taken = state.store.taken_seats(trip.id).await?;
    let Some(seat_number) = lowest_free_seat(bus.capacity, &taken) else {
        return Err(AppError::bad_request(NO_SEATS));
    };

    let route_code = route.as_ref().map(|r| r.route_code.as_str());
    let code = unused_ticket_code(&state, route_code).await?;

    let (ticket, payment) = state
        .store
        .issue_ticket(
            NewTicket {
                trip_id: trip.id,
                user_id: owner.id,
                ticket_code: code,
                seat_number,
                status: TicketStatus::Confirmed,
            },
            payment.id,
            state.now(),
        )
        .await?;

    metrics::record_ticket_issued();
    tracing::info!(
        ticket_id = ticket.id,
        ticket_code = %ticket.ticket_code,
        payment_id = payment.id,
        seat_number,
        "Ticket generated"
    );

    Ok((
        StatusCode::CREATED,
        Json(GenerateTicketResponse {
            message: "Ticket generated successfully!",
            ticket,
            payment,
        }),
    ))
}

/// One ticket with its trip, account, and payment.
///
/// # Errors
///
/// Returns 404 when the ticket does not exist.
pub async fn get_ticket(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<TicketDetailsResponse>, AppError> {
    let ticket = find_ticket(&state, id).await?;

    let mut relations = Relations::new(state.store.as_ref());
    let trip_details = relations.trip(ticket.trip_id).await?;
    let user_details = relations.user(ticket.user_id).await?;
    let payment_details = relations.payment_for_ticket(ticket.id).await?;
    let amount_paid = AmountPaid::from(payment_details.as_ref());

    Ok(Json(TicketDetailsResponse {
        ticket,
        trip_details,
        user_details,
        payment_details,
        amount_paid,
    }))
}

/// Remove a ticket. Payments recorded against it are kept and unlinked.
///
/// # Errors
///
/// Returns 404 when the ticket does not exist.
pub async fn delete_ticket(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    find_ticket(&state, id).await?;
    state.store.delete_ticket(id).await?;
    tracing::info!(ticket_id = id, "Ticket deleted");
    Ok(Json(MessageResponse::new("Ticket deleted successfully.")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_paid_is_na_without_payment() {
        let json = serde_json::to_value(AmountPaid::from(None::<&Payment>)).unwrap();
        assert_eq!(json, serde_json::json!("N/A"));
    }
}
