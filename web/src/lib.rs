//! Axum plumbing shared by the Busdesk back office.
//!
//! This crate holds everything HTTP-shaped that is not specific to buses,
//! trips, or tickets:
//!
//! - [`AppError`]: error type that renders as a JSON body with a stable code
//! - [`extractors`]: correlation id, bearer token, and a JSON body
//!   extractor whose rejections render as [`AppError`]
//! - [`middleware`]: correlation-id layer that opens a tracing span per request
//! - [`validation`]: field-error accumulator producing 422 responses
//! - [`pagination`]: page requests and page envelopes for list endpoints
//!
//! # Request Flow
//!
//! ```text
//! HTTP request
//!   → correlation_id_layer (span + X-Correlation-ID)
//!   → extractors (bearer token, JSON body)
//!   → handler validates into FieldErrors, talks to storage
//!   → Result<Json<_>, AppError>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use busdesk_web::{AppError, JsonBody, validation::FieldErrors};
//!
//! async fn create(JsonBody(req): JsonBody<CreateRequest>) -> Result<Json<Created>, AppError> {
//!     let mut errors = FieldErrors::new();
//!     let name = errors.required("name", req.name);
//!     errors.into_result()?;
//!     // ...
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod pagination;
pub mod validation;

pub use error::AppError;
pub use extractors::{BearerToken, CorrelationId, JsonBody};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};
pub use pagination::{Page, PageQuery, PageRequest};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
