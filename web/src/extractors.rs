//! Custom Axum extractors.
//!
//! - `CorrelationId`: extract or generate request correlation ids
//! - `BearerToken`: raw token from `Authorization: Bearer <token>`
//! - `JsonBody`: JSON request body whose rejections render as [`AppError`]
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     correlation_id: CorrelationId,
//!     BearerToken(token): BearerToken,
//!     JsonBody(req): JsonBody<CreateBusRequest>,
//! ) -> Result<Json<Bus>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, "Creating bus");
//!     // ...
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Reads the id stored by [`correlation_id_layer`](crate::middleware::correlation_id_layer),
/// then the `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        let correlation_id = parts
            .headers
            .get(crate::middleware::CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Bearer token extracted from `Authorization: Bearer <token>` header.
///
/// Rejects with 401 when the header is missing, uses another scheme, or
/// carries an empty token.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Unauthenticated."))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
            })?
            .trim();

        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token.to_string()))
    }
}

/// JSON request body.
///
/// Same as `axum::Json`, except that rejections are rendered through
/// [`AppError`] so every error response shares one body shape. Bodies that
/// parse but do not fit the target type answer 422.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection_to_error(&rejection)),
        }
    }
}

fn json_rejection_to_error(rejection: &JsonRejection) -> AppError {
    let code = match rejection {
        JsonRejection::JsonDataError(_) => "VALIDATION_ERROR",
        JsonRejection::MissingJsonContentType(_) => "UNSUPPORTED_MEDIA_TYPE",
        _ => "BAD_REQUEST",
    };
    AppError::new(rejection.status(), rejection.body_text(), code.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header, http::Request as HttpRequest, http::StatusCode};
    use serde::Deserialize;

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = HttpRequest::builder()
            .header("X-Correlation-ID", uuid.to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let stored = Uuid::new_v4();
        let req = HttpRequest::builder()
            .header("X-Correlation-ID", Uuid::new_v4().to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        parts.extensions.insert(stored);
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, stored);
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let req = HttpRequest::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let token = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(token.0, "abc.def.ghi");
    }

    #[tokio::test]
    async fn test_bearer_token_rejects_other_schemes() {
        for value in ["Basic dXNlcjpwYXNz", "Bearer   "] {
            let req = HttpRequest::builder()
                .header(header::AUTHORIZATION, value)
                .body(())
                .expect("Valid request");

            let (mut parts, ()) = req.into_parts();
            let err = BearerToken::from_request_parts(&mut parts, &())
                .await
                .expect_err("Should reject");
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_bearer_token_missing_header() {
        let req = HttpRequest::builder().body(()).expect("Valid request");
        let (mut parts, ()) = req.into_parts();
        let err = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect_err("Should reject");
        assert_eq!(err.message(), "Unauthenticated.");
    }

    #[derive(Debug, Deserialize)]
    struct Capacity {
        capacity: i32,
    }

    #[tokio::test]
    async fn test_json_body_type_mismatch_is_unprocessable() {
        let req = HttpRequest::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"capacity":"many"}"#))
            .expect("Valid request");

        let err = JsonBody::<Capacity>::from_request(req, &())
            .await
            .expect_err("Should reject");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_json_body_ok() {
        let req = HttpRequest::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"capacity":40}"#))
            .expect("Valid request");

        let JsonBody(body) = JsonBody::<Capacity>::from_request(req, &())
            .await
            .expect("Should extract");
        assert_eq!(body.capacity, 40);
    }
}
