//! Authentication for the back office.
//!
//! Token and password primitives come from `busdesk-auth`; this module binds
//! them to storage and the HTTP layer.

pub mod middleware;

pub use middleware::{AuthUser, RequireAdmin, RequireStaff};

use busdesk_auth::{AuthError, TokenUser};
use busdesk_web::AppError;

use crate::types::User;

/// Render an [`AuthError`] as an HTTP error.
///
/// Token problems are 401; hashing and encoding failures are 500.
#[must_use]
pub fn auth_error(err: AuthError) -> AppError {
    match err {
        AuthError::InvalidToken => AppError::unauthorized("Invalid token."),
        AuthError::TokenExpired => AppError::unauthorized("Token has expired."),
        other => AppError::internal("An internal error occurred")
            .with_source(anyhow::Error::new(other)),
    }
}

/// Snapshot of an account for the `user` token claim.
#[must_use]
pub fn token_user(user: &User) -> TokenUser {
    TokenUser {
        id: user.id,
        name: user.name.clone(),
        surname: user.surname.clone(),
        email: user.email.clone(),
        staff_id: user.staff_id.clone(),
        role: user.role,
    }
}
