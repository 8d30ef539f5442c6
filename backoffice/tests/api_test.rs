//! HTTP API tests for the back office.
//!
//! Drives the full router against the in-memory store, a fixed clock, and a
//! recording mailer. Accounts are inserted straight into the store and handed
//! tokens minted with the same signing key the server uses.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::too_many_lines)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use busdesk_auth::{JwtCodec, Role};
use busdesk_backoffice::{
    auth::token_user,
    environment::FixedClock,
    mail::RecordingMailer,
    store::{BusRepository, MemoryStore, RouteRepository, UserRepository},
    types::{BusStatus, BusType, Gender, Id, NewBus, NewRoute, NewUser, User},
    AppState, Clock, Store, build_router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &[u8] = b"test-secret-key-for-api-tests";
const ISSUER: &str = "busdesk-test";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    clock: FixedClock,
    mailer: Arc<RecordingMailer>,
    jwt: JwtCodec,
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = FixedClock::new(start_time());
        let mailer = Arc::new(RecordingMailer::new());
        let state = AppState::new(
            store.clone(),
            JwtCodec::new(SECRET, ISSUER, 3600),
            mailer.clone(),
            Arc::new(clock.clone()),
            "http://localhost:3000/",
        );

        Self {
            router: build_router(state),
            store,
            clock,
            mailer,
            jwt: JwtCodec::new(SECRET, ISSUER, 3600),
        }
    }

    async fn add_user(&self, role: Role, staff_id: &str) -> User {
        let n = staff_id.to_lowercase();
        self.store
            .create_user(
                NewUser {
                    name: format!("Name {n}"),
                    surname: format!("Surname {n}"),
                    email: format!("{n}@example.com"),
                    address: None,
                    phone: None,
                    gender: Some(Gender::Female),
                    password_hash: "not-a-real-hash".to_string(),
                    staff_id: staff_id.to_string(),
                    role,
                },
                start_time(),
            )
            .await
            .unwrap()
    }

    fn token(&self, user: &User) -> String {
        self.jwt.issue(token_user(user), self.clock.now()).unwrap().token
    }

    async fn admin_token(&self) -> String {
        let admin = self.add_user(Role::Admin, "ADM100").await;
        self.token(&admin)
    }

    async fn add_route(&self, code: &str) -> Id {
        self.store
            .create_route(
                NewRoute {
                    route_code: code.to_string(),
                    origin: "Harare".to_string(),
                    destination: "Bulawayo".to_string(),
                    distance_km: 439.0,
                    estimated_time: "5h 30m".to_string(),
                },
                start_time(),
            )
            .await
            .unwrap()
            .id
    }

    async fn add_bus(&self, number: &str, capacity: i32, status: BusStatus) -> Id {
        self.store
            .create_bus(
                NewBus {
                    bus_number: number.to_string(),
                    bus_type: BusType::Ac,
                    capacity,
                    status,
                },
                start_time(),
            )
            .await
            .unwrap()
            .id
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    async fn create_trip(&self, token: &str, route_id: Id, bus_id: Id, departure: &str) -> (StatusCode, Value) {
        self.post(
            "/api/trips",
            token,
            json!({
                "route_id": route_id,
                "bus_id": bus_id,
                "departure_time": departure,
                "available_seats": 40,
            }),
        )
        .await
    }

    async fn create_schedule(
        &self,
        token: &str,
        route_id: Id,
        bus_id: Id,
        departure: &str,
        arrival: &str,
    ) -> (StatusCode, Value) {
        let (status, body) = self
            .post(
                "/api/schedules",
                token,
                json!({
                    "route_id": route_id,
                    "bus_id": bus_id,
                    "departure_time": departure,
                    "arrival_time": arrival,
                    "price": 30.0,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (status, body)
    }

    async fn staff_payment(&self, token: &str, trip_id: Id) -> (StatusCode, Value) {
        self.post(
            "/api/payments/staff-payment",
            token,
            json!({ "trip_id": trip_id, "amount": 25.0, "method": "usd" }),
        )
        .await
    }
}

fn id_of(value: &Value) -> Id {
    value["id"].as_i64().unwrap()
}

// ============================================================================
// Health and access control
// ============================================================================

#[tokio::test]
async fn test_health_and_readiness_are_public() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let app = TestApp::new();

    for uri in ["/api/buses", "/api/trips", "/api/admin/me", "/api/payments"] {
        let (status, _) = app.send(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let (status, _) = app.get("/api/buses", "garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_admins_are_forbidden_from_admin_routes() {
    let app = TestApp::new();
    let operator = app.add_user(Role::Operator, "OPR200").await;
    let token = app.token(&operator);

    // Reading the fleet is open to any account
    let (status, _) = app.get("/api/buses", &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/api/buses", &token, json!({ "type": "AC", "capacity": 40 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Forbidden. You do not have admin access.");

    let (status, _) = app.get("/api/admin/users", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Operators may not take payments either
    let (status, _) = app.staff_payment(&token, 1).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_register_login_logout_flow() {
    let app = TestApp::new();
    let registration = json!({
        "name": "Tariro",
        "surname": "Moyo",
        "email": "tariro@example.com",
        "password": "secret-pass",
        "password_confirmation": "secret-pass",
        "address": "12 Samora Machel Ave",
        "phone": "+263 77 000 0000",
    });

    let (status, body) = app
        .send(Method::POST, "/api/admin/register", None, Some(registration.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["staff_id"], "ADM100");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = app
        .send(Method::POST, "/api/admin/register", None, Some(registration))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "staff_id": "ADM100", "password": "wrong-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials.");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/login",
            None,
            Some(json!({ "staff_id": "ADM100", "password": "secret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 3600);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/admin/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "tariro@example.com");

    let (status, _) = app
        .send(Method::POST, "/api/admin/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/admin/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_tokens_are_rejected() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    app.clock.advance(chrono::Duration::hours(2));

    let (status, _) = app.get("/api/admin/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_create_users_assigns_staff_ids_and_emails_credentials() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let new_user = |email: &str, role: &str| {
        json!({
            "name": "Rudo",
            "surname": "Chikore",
            "email": email,
            "gender": "female",
            "password": "initial-pass",
            "password_confirmation": "initial-pass",
            "role": role,
        })
    };

    let (status, body) = app
        .post("/api/admin/users", &token, new_user("rudo@example.com", "staff"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["staff_id"], "PSC100");

    let (status, body) = app
        .post("/api/admin/users", &token, new_user("farai@example.com", "staff"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["staff_id"], "PSC101");

    let (status, body) = app
        .post("/api/admin/users", &token, new_user("tino@example.com", "operator"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["staff_id"], "OPR200");

    // Admins cannot be created through this endpoint
    let (status, body) = app
        .post("/api/admin/users", &token, new_user("boss@example.com", "admin"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["role"].is_array());

    // Duplicate email
    let (status, body) = app
        .post("/api/admin/users", &token, new_user("rudo@example.com", "staff"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["email"].is_array());

    // Credential emails are sent in the background
    for _ in 0..100 {
        if app.mailer.sent().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 3);
    let rudo = sent.iter().find(|m| m.to == "rudo@example.com").unwrap();
    assert_eq!(rudo.staff_id, "PSC100");
    assert_eq!(rudo.password, "initial-pass");
    assert_eq!(rudo.login_url, "http://localhost:3000/login");

    // Listing shows managed accounts only
    let (status, body) = app.get("/api/admin/users", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"]["total"], 3);
    assert_eq!(body["statistics"]["total_users"], 3);
    assert_eq!(body["statistics"]["role_counts"]["staff"], 2);
    assert_eq!(body["statistics"]["gender_counts"]["female"], 3);
}

#[tokio::test]
async fn test_admin_accounts_are_protected_and_referenced_users_kept() {
    let app = TestApp::new();
    let admin = app.add_user(Role::Admin, "ADM100").await;
    let token = app.token(&admin);
    let other_admin = app.add_user(Role::Admin, "ADM101").await;

    let (status, _) = app
        .put(
            &format!("/api/admin/users/{}", other_admin.id),
            &token,
            json!({ "name": "Renamed" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/users/{}", other_admin.id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A clerk who has taken a payment cannot be deleted
    let staff = app.add_user(Role::Staff, "PSC100").await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;
    let (_, trip) = app.create_trip(&token, route, bus, "2025-06-10 12:00:00").await;
    let (status, _) = app
        .staff_payment(&app.token(&staff), id_of(&trip["trip"]))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/users/{}", staff.id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .get(&format!("/api/admin/users/{}", staff.id), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Fleet and network
// ============================================================================

#[tokio::test]
async fn test_bus_numbers_are_generated_in_sequence() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, body) = app
        .post("/api/buses", &token, json!({ "type": "AC", "capacity": 60 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["bus_number"], "BUS-001");
    assert_eq!(body["status"], "active");

    let (_, body) = app
        .post("/api/buses", &token, json!({ "type": "Sleeper", "capacity": 30 }))
        .await;
    assert_eq!(body["bus_number"], "BUS-002");

    let (status, body) = app
        .post(
            "/api/buses",
            &token,
            json!({ "bus_number": "BUS-001", "type": "AC", "capacity": 60 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["bus_number"][0],
        "The bus number has already been taken."
    );

    let (status, body) = app.get("/api/buses", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"]["total_buses"], 2);
    assert_eq!(body["statistics"]["type_counts"]["Sleeper"], 1);
}

#[tokio::test]
async fn test_bus_number_at_numeric_limit_does_not_stall_the_sequence() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let largest = format!("BUS-{}", u64::MAX);
    let (status, _) = app
        .post(
            "/api/buses",
            &token,
            json!({ "bus_number": largest, "type": "AC", "capacity": 60 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post("/api/buses", &token, json!({ "type": "AC", "capacity": 40 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["bus_number"], "BUS-001");

    let (_, body) = app
        .post("/api/buses", &token, json!({ "type": "AC", "capacity": 40 }))
        .await;
    assert_eq!(body["bus_number"], "BUS-002");
}

#[tokio::test]
async fn test_deleting_bus_removes_its_schedules_and_trips() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;
    let other = app.add_bus("BUS-002", 40, BusStatus::Active).await;

    let (_, schedule) = app
        .create_schedule(&token, route, bus, "2025-06-10 12:00:00", "2025-06-10 17:30:00")
        .await;
    let schedule_id = id_of(&schedule["data"]);
    let (_, kept) = app
        .create_schedule(&token, route, other, "2025-06-10 12:00:00", "2025-06-10 17:30:00")
        .await;
    let kept_id = id_of(&kept["data"]);
    let (_, trip) = app.create_trip(&token, route, bus, "2025-06-10 12:00:00").await;
    let trip_id = id_of(&trip["trip"]);

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/buses/{bus}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Bus deleted successfully.");

    let (status, _) = app.get(&format!("/api/schedules/{schedule_id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/api/trips/{trip_id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/api/buses/{bus}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Another bus's timetable is untouched
    let (status, _) = app.get(&format!("/api/schedules/{kept_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_route_statistics_and_stops() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, body) = app.get("/api/routes", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["statistics"]["average_distance_km"].is_null());

    let (status, body) = app
        .post(
            "/api/routes",
            &token,
            json!({
                "route_code": "HRE-MUT",
                "origin": "Harare",
                "destination": "Mutare",
                "distance_km": 263.5,
                "estimated_time": "3h 30m",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let route_id = id_of(&body);

    for (name, order) in [("Marondera", 2), ("Ruwa", 1)] {
        let (status, _) = app
            .post(
                "/api/stops",
                &token,
                json!({ "route_id": route_id, "stop_name": name, "stop_order": order }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .post(
            "/api/stops",
            &token,
            json!({ "route_id": 9999, "stop_name": "Nowhere", "stop_order": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["route_id"].is_array());

    let (status, body) = app.get("/api/stops", &token).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stop_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Ruwa", "Marondera"]);
    assert_eq!(body[0]["route"]["route_code"], "HRE-MUT");
}

#[tokio::test]
async fn test_schedule_arrival_must_follow_departure() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;

    let (status, body) = app
        .post(
            "/api/schedules",
            &token,
            json!({
                "route_id": route,
                "bus_id": bus,
                "departure_time": "2025-06-10 12:00:00",
                "arrival_time": "2025-06-10 11:00:00",
                "price": 30.0,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["arrival_time"].is_array());

    let (status, _) = app
        .post(
            "/api/schedules",
            &token,
            json!({
                "route_id": route,
                "bus_id": bus,
                "departure_time": "2025-06-10 12:00:00",
                "arrival_time": "2025-06-10 17:30:00",
                "price": 30.0,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_schedule_update_checks_against_stored_times() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;
    let (_, created) = app
        .create_schedule(&token, route, bus, "2025-06-10 12:00:00", "2025-06-10 17:30:00")
        .await;
    let uri = format!("/api/schedules/{}", id_of(&created["data"]));

    // Departure alone, moved past the stored arrival
    let (status, body) = app
        .put(&uri, &token, json!({ "departure_time": "2025-06-10 18:00:00" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["arrival_time"][0],
        "The arrival time must be a date after departure time."
    );

    // Arrival alone, moved before the stored departure
    let (status, body) = app
        .put(&uri, &token, json!({ "arrival_time": "2025-06-10 11:00:00" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["arrival_time"].is_array());

    // Equal to the stored arrival is not after it either
    let (status, _) = app
        .put(&uri, &token, json!({ "departure_time": "2025-06-10 17:30:00" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .put(&uri, &token, json!({ "departure_time": "2025-06-10 13:00:00" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Nothing was stored by the rejected updates
    let (_, list) = app.get("/api/schedules", &token).await;
    assert_eq!(list["statistics"]["latest_departure"], "2025-06-10 13:00:00");
    assert_eq!(list["statistics"]["latest_arrival"], "2025-06-10 17:30:00");
}

#[tokio::test]
async fn test_schedule_list_is_newest_first_with_statistics() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;

    let (status, body) = app.get("/api/schedules", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedules"], json!([]));
    assert_eq!(body["statistics"]["total_schedules"], 0);
    assert_eq!(body["statistics"]["status_counts"], json!({}));
    assert!(body["statistics"]["latest_departure"].is_null());
    assert!(body["statistics"]["latest_arrival"].is_null());

    let (_, older) = app
        .create_schedule(&token, route, bus, "2025-06-20 06:00:00", "2025-06-20 11:30:00")
        .await;
    app.clock.advance(chrono::Duration::minutes(5));
    // Created later but departing earlier
    let (status, newer) = app
        .post(
            "/api/schedules",
            &token,
            json!({
                "route_id": route,
                "bus_id": bus,
                "departure_time": "2025-06-12 08:00:00",
                "arrival_time": "2025-06-12 13:00:00",
                "status": "cancelled",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.get("/api/schedules", &token).await;
    let schedules = body["schedules"].as_array().unwrap();
    assert_eq!(schedules.len(), 2);
    assert_eq!(id_of(&schedules[0]), id_of(&newer["data"]));
    assert_eq!(id_of(&schedules[1]), id_of(&older["data"]));
    assert_eq!(schedules[0]["route"]["route_code"], "HRE-BYO");
    assert_eq!(schedules[0]["bus"]["bus_number"], "BUS-001");

    let statistics = &body["statistics"];
    assert_eq!(statistics["total_schedules"], 2);
    assert_eq!(statistics["status_counts"], json!({ "cancelled": 1, "scheduled": 1 }));
    assert_eq!(statistics["latest_departure"], "2025-06-12 08:00:00");
    assert_eq!(statistics["latest_arrival"], "2025-06-12 13:00:00");
}

// ============================================================================
// Trips
// ============================================================================

#[tokio::test]
async fn test_trip_codes_follow_route_code() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;

    let (status, body) = app.create_trip(&token, route, bus, "2025-06-10 06:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["trip"]["trip_code"], "HRE-BYO-001");
    assert_eq!(body["trip"]["route"]["route_code"], "HRE-BYO");

    let (_, body) = app.create_trip(&token, route, bus, "2025-06-10 18:00:00").await;
    assert_eq!(body["trip"]["trip_code"], "HRE-BYO-002");
}

#[tokio::test]
async fn test_trip_scheduling_rules() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;
    let repair = app.add_bus("BUS-002", 40, BusStatus::Maintenance).await;

    let (status, body) = app.create_trip(&token, route, repair, "2025-06-10 12:00:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("maintenance"));

    let (status, _) = app.create_trip(&token, route, bus, "2025-05-31 12:00:00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.create_trip(&token, route, bus, "10/06/2025 12:00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Years beyond four digits are not wall-clock departures
    let (status, body) = app.create_trip(&token, route, bus, "+262142-12-31 23:00:00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["departure_time"][0],
        "The departure time does not match the format YYYY-MM-DD HH:MM:SS."
    );

    let (status, first) = app.create_trip(&token, route, bus, "2025-06-10 12:00:00").await;
    assert_eq!(status, StatusCode::CREATED);

    // Exactly three hours apart still clashes
    let (status, _) = app.create_trip(&token, route, bus, "2025-06-10 15:00:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.create_trip(&token, route, bus, "2025-06-10 15:00:01").await;
    assert_eq!(status, StatusCode::CREATED);

    // Moving a trip within its own window is not a clash with itself
    let first_id = id_of(&first["trip"]);
    let (status, body) = app
        .put(
            &format!("/api/trips/{first_id}"),
            &token,
            json!({ "departure_time": "2025-06-10 11:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip"]["trip_code"], "HRE-BYO-001");

    // But it cannot be moved onto the other trip
    let (status, _) = app
        .put(
            &format!("/api/trips/{first_id}"),
            &token,
            json!({ "departure_time": "2025-06-10 14:00:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trips_are_paginated() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;

    for day in 10..22 {
        let (status, _) = app
            .create_trip(&token, route, bus, &format!("2025-06-{day} 12:00:00"))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.get("/api/trips?page=2", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trips"]["total"], 12);
    assert_eq!(body["trips"]["last_page"], 2);
    assert_eq!(body["trips"]["data"].as_array().unwrap().len(), 2);

    // Unusable page numbers fall back to the first page
    for uri in ["/api/trips?page=abc", "/api/trips?page=-1"] {
        let (status, body) = app.get(uri, &token).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["trips"]["current_page"], 1, "{uri}");
        assert_eq!(body["trips"]["data"].as_array().unwrap().len(), 10, "{uri}");
    }
    let (status, body) = app.get("/api/admin/users?page=abc", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"]["current_page"], 1);
    let (status, body) = app.get("/api/tickets/admin-tickets?page=-1", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tickets"]["current_page"], 1);
}

// ============================================================================
// Payments and tickets
// ============================================================================

#[tokio::test]
async fn test_ticket_generation_from_counter_payment() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let staff = app.add_user(Role::Staff, "PSC100").await;
    let staff_token = app.token(&staff);
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;
    let (_, trip) = app.create_trip(&admin, route, bus, "2025-06-10 12:00:00").await;
    let trip_id = id_of(&trip["trip"]);

    let (status, body) = app.staff_payment(&staff_token, trip_id).await;
    assert_eq!(status, StatusCode::CREATED);
    let payment_id = body["payment_id"].as_i64().unwrap();

    // Only admins issue tickets
    let (status, _) = app
        .post("/api/tickets/generate", &staff_token, json!({ "payment_id": payment_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post("/api/tickets/generate", &admin, json!({ "payment_id": payment_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ticket"]["seat_number"], 1);
    assert_eq!(body["ticket"]["user_id"], staff.id);
    let code = body["ticket"]["ticket_code"].as_str().unwrap();
    assert!(code.starts_with("HRE-BYO-"));
    assert_eq!(code.len(), "HRE-BYO-".len() + 8);
    let ticket_id = id_of(&body["ticket"]);
    assert_eq!(body["payment"]["ticket_id"], ticket_id);

    let (status, body) = app
        .post("/api/tickets/generate", &admin, json!({ "payment_id": payment_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ticket_id"], ticket_id);

    // A second payment gets the next seat
    let (_, body) = app.staff_payment(&staff_token, trip_id).await;
    let (_, body) = app
        .post(
            "/api/tickets/generate",
            &admin,
            json!({ "payment_id": body["payment_id"] }),
        )
        .await;
    assert_eq!(body["ticket"]["seat_number"], 2);

    let (status, body) = app.get("/api/tickets/my", &staff_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tickets"]["total"], 2);

    let (status, body) = app.get(&format!("/api/tickets/{ticket_id}"), &staff_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount_paid"], 25.0);
}

#[tokio::test]
async fn test_ticket_generation_refusals() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 1, BusStatus::Active).await;
    let (_, trip) = app.create_trip(&admin, route, bus, "2025-06-10 12:00:00").await;
    let trip_id = id_of(&trip["trip"]);

    let (status, body) = app
        .post("/api/tickets/generate", &admin, json!({ "payment_id": 9999 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["payment_id"].is_array());

    let (_, first) = app.staff_payment(&admin, trip_id).await;
    let (_, second) = app.staff_payment(&admin, trip_id).await;
    let first = first["payment_id"].as_i64().unwrap();
    let second = second["payment_id"].as_i64().unwrap();

    // Pending payments cannot be ticketed
    let (status, _) = app
        .put(
            &format!("/api/payments/{first}/status"),
            &admin,
            json!({ "status": "pending" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post("/api/tickets/generate", &admin, json!({ "payment_id": first }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The single seat goes to the second payment
    let (status, _) = app
        .post("/api/tickets/generate", &admin, json!({ "payment_id": second }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    app.put(
        &format!("/api/payments/{first}/status"),
        &admin,
        json!({ "status": "completed" }),
    )
    .await;
    let (status, body) = app
        .post("/api/tickets/generate", &admin, json!({ "payment_id": first }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No available seats on this trip.");

    // A full trip takes no more counter payments
    let (status, _) = app.staff_payment(&admin, trip_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_online_payment_and_ticket_removal() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let route = app.add_route("HRE-BYO").await;
    let bus = app.add_bus("BUS-001", 40, BusStatus::Active).await;
    let (_, trip) = app.create_trip(&admin, route, bus, "2025-06-10 12:00:00").await;
    let (_, payment) = app.staff_payment(&admin, id_of(&trip["trip"])).await;
    let (_, issued) = app
        .post(
            "/api/tickets/generate",
            &admin,
            json!({ "payment_id": payment["payment_id"] }),
        )
        .await;
    let ticket_id = id_of(&issued["ticket"]);

    let (status, body) = app
        .post(
            "/api/payments/online",
            &admin,
            json!({ "ticket_id": ticket_id, "amount": 5.5, "method": "ecocash" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["payment"]["status"], "completed");
    assert!(body["payment"]["transaction_id"]
        .as_str()
        .unwrap()
        .starts_with("MOCK_"));

    let (status, body) = app
        .post(
            "/api/payments/online",
            &admin,
            json!({ "ticket_id": ticket_id, "amount": 5.5, "method": "bitcoin" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["method"].is_array());

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/tickets/{ticket_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/payments", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let payments = body["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments.iter().all(|p| p["ticket_id"].is_null()));
}
