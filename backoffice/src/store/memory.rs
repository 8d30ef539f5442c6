//! In-memory storage for tests.
//!
//! Tables live behind one mutex, so every call is atomic with respect to the
//! others. Uniqueness and referential rules match the `PostgreSQL` schema.

use super::{
    BusRepository, PaymentRepository, RouteRepository, ScheduleRepository, StopRepository,
    StoreError, StoreHealth, StoreResult, TicketRepository, TokenDenylist, TripRepository,
    UserRepository,
};
use crate::types::{
    Bus, Id, NewBus, NewPayment, NewRoute, NewSchedule, NewStop, NewTicket, NewTrip, NewUser,
    Payment, PaymentStatus, Route, Schedule, Stop, Ticket, Trip, User,
};
use async_trait::async_trait;
use busdesk_auth::Role;
use busdesk_web::PageRequest;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    next_id: Id,
    users: BTreeMap<Id, User>,
    revoked: HashMap<String, DateTime<Utc>>,
    buses: BTreeMap<Id, Bus>,
    routes: BTreeMap<Id, Route>,
    stops: BTreeMap<Id, Stop>,
    schedules: BTreeMap<Id, Schedule>,
    trips: BTreeMap<Id, Trip>,
    tickets: BTreeMap<Id, Ticket>,
    payments: BTreeMap<Id, Payment>,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn remove_trips(&mut self, doomed: &[Id]) {
        let tickets: Vec<Id> = self
            .tickets
            .values()
            .filter(|t| doomed.contains(&t.trip_id))
            .map(|t| t.id)
            .collect();
        self.remove_tickets(&tickets);
        self.payments.retain(|_, p| !doomed.contains(&p.trip_id));
        self.trips.retain(|id, _| !doomed.contains(id));
    }

    fn remove_tickets(&mut self, doomed: &[Id]) {
        for payment in self.payments.values_mut() {
            if payment.ticket_id.is_some_and(|id| doomed.contains(&id)) {
                payment.ticket_id = None;
            }
        }
        self.tickets.retain(|id, _| !doomed.contains(id));
    }
}

fn unique<'a, T: 'a>(
    rows: impl IntoIterator<Item = &'a T>,
    this: Option<Id>,
    id: impl Fn(&T) -> Id,
    clash: impl Fn(&T) -> bool,
    what: &str,
) -> StoreResult<()> {
    if rows
        .into_iter()
        .any(|row| Some(id(row)) != this && clash(row))
    {
        return Err(StoreError::Conflict(format!("{what} already exists")));
    }
    Ok(())
}

fn missing(what: &str, id: Id) -> StoreError {
    StoreError::Conflict(format!("{what} {id} does not exist"))
}

fn page_of<T: Clone>(rows: &[T], page: PageRequest) -> (Vec<T>, u64) {
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let data = rows.iter().skip(skip).take(take).cloned().collect();
    (data, rows.len() as u64)
}

/// Shared in-process tables.
///
/// Clones share state, so a test can seed rows through one handle and
/// observe what the router wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let mut t = self.lock()?;
        unique(t.users.values(), None, |u| u.id, |u| u.email == user.email, "email")?;
        unique(t.users.values(), None, |u| u.id, |u| u.staff_id == user.staff_id, "staff id")?;
        let id = t.next_id();
        let user = User {
            id,
            name: user.name,
            surname: user.surname,
            email: user.email,
            address: user.address,
            phone: user.phone,
            gender: user.gender,
            password_hash: user.password_hash,
            staff_id: user.staff_id,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_staff_id(&self, staff_id: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.staff_id == staff_id)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn staff_ids_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .users
            .values()
            .filter(|u| u.staff_id.starts_with(prefix))
            .map(|u| u.staff_id.clone())
            .collect())
    }

    async fn users_with_roles(&self, roles: &[Role]) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .filter(|u| roles.contains(&u.role))
            .cloned()
            .collect())
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        Ok(self.lock()?.users.values().any(|u| u.role.is_admin()))
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let mut t = self.lock()?;
        if !t.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        unique(t.users.values(), Some(user.id), |u| u.id, |u| u.email == user.email, "email")?;
        unique(
            t.users.values(),
            Some(user.id),
            |u| u.id,
            |u| u.staff_id == user.staff_id,
            "staff id",
        )?;
        t.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Id) -> StoreResult<()> {
        let mut t = self.lock()?;
        if !t.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if t.tickets.values().any(|x| x.user_id == id) || t.payments.values().any(|p| p.user_id == id)
        {
            return Err(StoreError::Conflict(format!(
                "user {id} is referenced by tickets or payments"
            )));
        }
        for trip in t.trips.values_mut() {
            if trip.created_by == Some(id) {
                trip.created_by = None;
            }
        }
        t.users.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TokenDenylist for MemoryStore {
    async fn revoke_token(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut t = self.lock()?;
        t.revoked.retain(|_, expiry| *expiry > now);
        t.revoked.entry(jti.to_string()).or_insert(expires_at);
        Ok(())
    }

    async fn is_token_revoked(&self, jti: &str) -> StoreResult<bool> {
        Ok(self.lock()?.revoked.contains_key(jti))
    }
}

#[async_trait]
impl BusRepository for MemoryStore {
    async fn create_bus(&self, bus: NewBus, now: DateTime<Utc>) -> StoreResult<Bus> {
        let mut t = self.lock()?;
        unique(t.buses.values(), None, |b| b.id, |b| b.bus_number == bus.bus_number, "bus number")?;
        let id = t.next_id();
        let bus = Bus {
            id,
            bus_number: bus.bus_number,
            bus_type: bus.bus_type,
            capacity: bus.capacity,
            status: bus.status,
            created_at: now,
            updated_at: now,
        };
        t.buses.insert(id, bus.clone());
        Ok(bus)
    }

    async fn get_bus(&self, id: Id) -> StoreResult<Option<Bus>> {
        Ok(self.lock()?.buses.get(&id).cloned())
    }

    async fn list_buses(&self) -> StoreResult<Vec<Bus>> {
        Ok(self.lock()?.buses.values().cloned().collect())
    }

    async fn find_bus_by_number(&self, bus_number: &str) -> StoreResult<Option<Bus>> {
        Ok(self
            .lock()?
            .buses
            .values()
            .find(|b| b.bus_number == bus_number)
            .cloned())
    }

    async fn bus_numbers_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .buses
            .values()
            .filter(|b| b.bus_number.starts_with(prefix))
            .map(|b| b.bus_number.clone())
            .collect())
    }

    async fn update_bus(&self, bus: &Bus) -> StoreResult<Bus> {
        let mut t = self.lock()?;
        if !t.buses.contains_key(&bus.id) {
            return Err(StoreError::NotFound);
        }
        unique(
            t.buses.values(),
            Some(bus.id),
            |b| b.id,
            |b| b.bus_number == bus.bus_number,
            "bus number",
        )?;
        t.buses.insert(bus.id, bus.clone());
        Ok(bus.clone())
    }

    async fn delete_bus(&self, id: Id) -> StoreResult<()> {
        let mut t = self.lock()?;
        if t.buses.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        t.schedules.retain(|_, s| s.bus_id != id);
        let trips: Vec<Id> = t.trips.values().filter(|x| x.bus_id == id).map(|x| x.id).collect();
        t.remove_trips(&trips);
        Ok(())
    }
}

#[async_trait]
impl RouteRepository for MemoryStore {
    async fn create_route(&self, route: NewRoute, now: DateTime<Utc>) -> StoreResult<Route> {
        let mut t = self.lock()?;
        unique(
            t.routes.values(),
            None,
            |r| r.id,
            |r| r.route_code == route.route_code,
            "route code",
        )?;
        let id = t.next_id();
        let route = Route {
            id,
            route_code: route.route_code,
            origin: route.origin,
            destination: route.destination,
            distance_km: route.distance_km,
            estimated_time: route.estimated_time,
            created_at: now,
            updated_at: now,
        };
        t.routes.insert(id, route.clone());
        Ok(route)
    }

    async fn get_route(&self, id: Id) -> StoreResult<Option<Route>> {
        Ok(self.lock()?.routes.get(&id).cloned())
    }

    async fn list_routes(&self) -> StoreResult<Vec<Route>> {
        Ok(self.lock()?.routes.values().cloned().collect())
    }

    async fn find_route_by_code(&self, route_code: &str) -> StoreResult<Option<Route>> {
        Ok(self
            .lock()?
            .routes
            .values()
            .find(|r| r.route_code == route_code)
            .cloned())
    }

    async fn update_route(&self, route: &Route) -> StoreResult<Route> {
        let mut t = self.lock()?;
        if !t.routes.contains_key(&route.id) {
            return Err(StoreError::NotFound);
        }
        unique(
            t.routes.values(),
            Some(route.id),
            |r| r.id,
            |r| r.route_code == route.route_code,
            "route code",
        )?;
        t.routes.insert(route.id, route.clone());
        Ok(route.clone())
    }

    async fn delete_route(&self, id: Id) -> StoreResult<()> {
        let mut t = self.lock()?;
        if t.routes.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        t.stops.retain(|_, s| s.route_id != id);
        t.schedules.retain(|_, s| s.route_id != id);
        let trips: Vec<Id> = t
            .trips
            .values()
            .filter(|x| x.route_id == id)
            .map(|x| x.id)
            .collect();
        t.remove_trips(&trips);
        Ok(())
    }
}

#[async_trait]
impl StopRepository for MemoryStore {
    async fn create_stop(&self, stop: NewStop, now: DateTime<Utc>) -> StoreResult<Stop> {
        let mut t = self.lock()?;
        if !t.routes.contains_key(&stop.route_id) {
            return Err(missing("route", stop.route_id));
        }
        let id = t.next_id();
        let stop = Stop {
            id,
            route_id: stop.route_id,
            stop_name: stop.stop_name,
            stop_order: stop.stop_order,
            created_at: now,
            updated_at: now,
        };
        t.stops.insert(id, stop.clone());
        Ok(stop)
    }

    async fn get_stop(&self, id: Id) -> StoreResult<Option<Stop>> {
        Ok(self.lock()?.stops.get(&id).cloned())
    }

    async fn list_stops(&self) -> StoreResult<Vec<Stop>> {
        let mut stops: Vec<Stop> = self.lock()?.stops.values().cloned().collect();
        stops.sort_by_key(|s| (s.route_id, s.stop_order, s.id));
        Ok(stops)
    }

    async fn update_stop(&self, stop: &Stop) -> StoreResult<Stop> {
        let mut t = self.lock()?;
        if !t.stops.contains_key(&stop.id) {
            return Err(StoreError::NotFound);
        }
        if !t.routes.contains_key(&stop.route_id) {
            return Err(missing("route", stop.route_id));
        }
        t.stops.insert(stop.id, stop.clone());
        Ok(stop.clone())
    }

    async fn delete_stop(&self, id: Id) -> StoreResult<()> {
        self.lock()?
            .stops
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ScheduleRepository for MemoryStore {
    async fn create_schedule(
        &self,
        schedule: NewSchedule,
        now: DateTime<Utc>,
    ) -> StoreResult<Schedule> {
        let mut t = self.lock()?;
        if !t.routes.contains_key(&schedule.route_id) {
            return Err(missing("route", schedule.route_id));
        }
        if !t.buses.contains_key(&schedule.bus_id) {
            return Err(missing("bus", schedule.bus_id));
        }
        let id = t.next_id();
        let schedule = Schedule {
            id,
            route_id: schedule.route_id,
            bus_id: schedule.bus_id,
            departure_time: schedule.departure_time,
            arrival_time: schedule.arrival_time,
            price: schedule.price,
            status: schedule.status,
            created_at: now,
            updated_at: now,
        };
        t.schedules.insert(id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: Id) -> StoreResult<Option<Schedule>> {
        Ok(self.lock()?.schedules.get(&id).cloned())
    }

    async fn list_schedules(&self) -> StoreResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.lock()?.schedules.values().cloned().collect();
        schedules.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(schedules)
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<Schedule> {
        let mut t = self.lock()?;
        if !t.schedules.contains_key(&schedule.id) {
            return Err(StoreError::NotFound);
        }
        if !t.routes.contains_key(&schedule.route_id) {
            return Err(missing("route", schedule.route_id));
        }
        if !t.buses.contains_key(&schedule.bus_id) {
            return Err(missing("bus", schedule.bus_id));
        }
        t.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, id: Id) -> StoreResult<()> {
        self.lock()?
            .schedules
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn create_trip(&self, trip: NewTrip, now: DateTime<Utc>) -> StoreResult<Trip> {
        let mut t = self.lock()?;
        if !t.routes.contains_key(&trip.route_id) {
            return Err(missing("route", trip.route_id));
        }
        if !t.buses.contains_key(&trip.bus_id) {
            return Err(missing("bus", trip.bus_id));
        }
        unique(t.trips.values(), None, |x| x.id, |x| x.trip_code == trip.trip_code, "trip code")?;
        let id = t.next_id();
        let trip = Trip {
            id,
            route_id: trip.route_id,
            bus_id: trip.bus_id,
            created_by: trip.created_by,
            trip_code: trip.trip_code,
            departure_time: trip.departure_time,
            available_seats: trip.available_seats,
            created_at: now,
            updated_at: now,
        };
        t.trips.insert(id, trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, id: Id) -> StoreResult<Option<Trip>> {
        Ok(self.lock()?.trips.get(&id).cloned())
    }

    async fn page_trips(&self, page: PageRequest) -> StoreResult<(Vec<Trip>, u64)> {
        let mut trips: Vec<Trip> = self.lock()?.trips.values().cloned().collect();
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_of(&trips, page))
    }

    async fn trip_codes_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .trips
            .values()
            .filter(|x| x.trip_code.starts_with(prefix))
            .map(|x| x.trip_code.clone())
            .collect())
    }

    async fn bus_has_trip_between(
        &self,
        bus_id: Id,
        start: NaiveDateTime,
        end: NaiveDateTime,
        except: Option<Id>,
    ) -> StoreResult<bool> {
        Ok(self.lock()?.trips.values().any(|x| {
            x.bus_id == bus_id
                && Some(x.id) != except
                && start <= x.departure_time
                && x.departure_time <= end
        }))
    }

    async fn update_trip(&self, trip: &Trip) -> StoreResult<Trip> {
        let mut t = self.lock()?;
        if !t.trips.contains_key(&trip.id) {
            return Err(StoreError::NotFound);
        }
        if !t.routes.contains_key(&trip.route_id) {
            return Err(missing("route", trip.route_id));
        }
        if !t.buses.contains_key(&trip.bus_id) {
            return Err(missing("bus", trip.bus_id));
        }
        unique(
            t.trips.values(),
            Some(trip.id),
            |x| x.id,
            |x| x.trip_code == trip.trip_code,
            "trip code",
        )?;
        t.trips.insert(trip.id, trip.clone());
        Ok(trip.clone())
    }

    async fn delete_trip(&self, id: Id) -> StoreResult<()> {
        let mut t = self.lock()?;
        if !t.trips.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        t.remove_trips(&[id]);
        Ok(())
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn get_ticket(&self, id: Id) -> StoreResult<Option<Ticket>> {
        Ok(self.lock()?.tickets.get(&id).cloned())
    }

    async fn page_tickets(
        &self,
        user: Option<Id>,
        page: PageRequest,
    ) -> StoreResult<(Vec<Ticket>, u64)> {
        let mut tickets: Vec<Ticket> = self
            .lock()?
            .tickets
            .values()
            .filter(|x| user.is_none_or(|id| x.user_id == id))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_of(&tickets, page))
    }

    async fn ticket_code_exists(&self, ticket_code: &str) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .any(|x| x.ticket_code == ticket_code))
    }

    async fn taken_seats(&self, trip_id: Id) -> StoreResult<Vec<i32>> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .filter(|x| x.trip_id == trip_id)
            .map(|x| x.seat_number)
            .collect())
    }

    async fn issue_ticket(
        &self,
        ticket: NewTicket,
        payment_id: Id,
        now: DateTime<Utc>,
    ) -> StoreResult<(Ticket, Payment)> {
        let mut t = self.lock()?;
        match t.payments.get(&payment_id) {
            None => return Err(StoreError::NotFound),
            Some(Payment {
                ticket_id: Some(existing),
                ..
            }) => {
                return Err(StoreError::Conflict(format!(
                    "payment {payment_id} already linked to ticket {existing}"
                )));
            }
            Some(payment) if payment.status != PaymentStatus::Completed => {
                return Err(StoreError::Conflict(format!(
                    "payment {payment_id} is {}, not completed",
                    payment.status
                )));
            }
            Some(_) => {}
        }
        if !t.trips.contains_key(&ticket.trip_id) {
            return Err(missing("trip", ticket.trip_id));
        }
        if !t.users.contains_key(&ticket.user_id) {
            return Err(missing("user", ticket.user_id));
        }
        unique(
            t.tickets.values(),
            None,
            |x| x.id,
            |x| x.ticket_code == ticket.ticket_code,
            "ticket code",
        )?;
        unique(
            t.tickets.values(),
            None,
            |x| x.id,
            |x| x.trip_id == ticket.trip_id && x.seat_number == ticket.seat_number,
            "seat",
        )?;

        let id = t.next_id();
        let ticket = Ticket {
            id,
            trip_id: ticket.trip_id,
            user_id: ticket.user_id,
            ticket_code: ticket.ticket_code,
            seat_number: ticket.seat_number,
            status: ticket.status,
            created_at: now,
            updated_at: now,
        };
        t.tickets.insert(id, ticket.clone());

        let payment = t
            .payments
            .get_mut(&payment_id)
            .ok_or(StoreError::NotFound)?;
        payment.ticket_id = Some(id);
        payment.updated_at = now;
        let payment = payment.clone();

        Ok((ticket, payment))
    }

    async fn delete_ticket(&self, id: Id) -> StoreResult<()> {
        let mut t = self.lock()?;
        if !t.tickets.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        t.remove_tickets(&[id]);
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn create_payment(
        &self,
        payment: NewPayment,
        now: DateTime<Utc>,
    ) -> StoreResult<Payment> {
        let mut t = self.lock()?;
        if !t.trips.contains_key(&payment.trip_id) {
            return Err(missing("trip", payment.trip_id));
        }
        if !t.users.contains_key(&payment.user_id) {
            return Err(missing("user", payment.user_id));
        }
        if let Some(ticket_id) = payment.ticket_id {
            if !t.tickets.contains_key(&ticket_id) {
                return Err(missing("ticket", ticket_id));
            }
        }
        let id = t.next_id();
        let payment = Payment {
            id,
            ticket_id: payment.ticket_id,
            trip_id: payment.trip_id,
            user_id: payment.user_id,
            amount: payment.amount,
            method: payment.method,
            status: payment.status,
            transaction_id: payment.transaction_id,
            created_at: now,
            updated_at: now,
        };
        t.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: Id) -> StoreResult<Option<Payment>> {
        Ok(self.lock()?.payments.get(&id).cloned())
    }

    async fn list_payments(&self) -> StoreResult<Vec<Payment>> {
        Ok(self.lock()?.payments.values().cloned().collect())
    }

    async fn payment_for_ticket(&self, ticket_id: Id) -> StoreResult<Option<Payment>> {
        Ok(self
            .lock()?
            .payments
            .values()
            .find(|p| p.ticket_id == Some(ticket_id))
            .cloned())
    }

    async fn update_payment_status(
        &self,
        id: Id,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Payment> {
        let mut t = self.lock()?;
        let payment = t.payments.get_mut(&id).ok_or(StoreError::NotFound)?;
        payment.status = status;
        payment.updated_at = now;
        Ok(payment.clone())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}
