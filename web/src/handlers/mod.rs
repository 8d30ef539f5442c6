//! HTTP request handlers shared by every Busdesk service.

pub mod health;

pub use health::{health_check, readiness_response};
