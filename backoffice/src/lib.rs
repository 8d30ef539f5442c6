//! Busdesk back office: bus-ticketing administration over HTTP.
//!
//! Staff and admin accounts manage a fleet of buses, a network of routes with
//! stops and timetables, and the trips run on them. Payments are recorded
//! online or at the counter, and tickets are issued against completed
//! payments.
//!
//! # Architecture
//!
//! ```text
//! HTTP request
//!   → server::routes (correlation span, trace layer)
//!   → auth extractors (bearer JWT, denylist, role)
//!   → api handler (field validation, codes, scheduling checks)
//!   → store (PostgreSQL, or in memory for tests)
//! ```
//!
//! # Key Rules
//!
//! ## Sequential codes
//!
//! Staff ids (`ADM100`, `PSC101`, `OPR200`), trip codes (`HRE-BYO-001`), and
//! bus numbers (`BUS-001`) continue from the highest numeric suffix in use.
//! Ticket codes are the route code plus eight random characters.
//!
//! ## Scheduling
//!
//! A bus may not depart twice within three hours, and a bus under
//! maintenance cannot be put on a trip. Seats are handed out lowest first.
//!
//! # Usage
//!
//! See [`server::build_router`] and the `busdesk` binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod codes;
pub mod config;
pub mod environment;
pub mod mail;
pub mod metrics;
pub mod scheduling;
pub mod seed;
pub mod server;
pub mod store;
pub mod types;

pub use config::Config;
pub use environment::{Clock, SystemClock};
pub use server::{build_router, AppState};
pub use store::{Store, StoreError};
