//! Authentication extractors for the back office.
//!
//! - [`AuthUser`]: any signed-in account
//! - [`RequireAdmin`]: admins only
//! - [`RequireStaff`]: staff or admins (payment desk)
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn me(AuthUser { user, .. }: AuthUser) -> Json<User> {
//!     Json(user)
//! }
//!
//! async fn delete_bus(
//!     _admin: RequireAdmin,
//!     State(state): State<AppState>,
//!     Path(id): Path<i64>,
//! ) -> Result<Json<Message>, AppError> {
//!     // only reached by admins
//! }
//! ```

use super::auth_error;
use crate::server::state::AppState;
use crate::types::User;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use busdesk_auth::Claims;
use busdesk_web::{AppError, BearerToken};

/// Message for callers who are signed in but not an admin.
pub const ADMIN_ONLY: &str = "Forbidden. You do not have admin access.";

/// Message for callers who may not handle payments.
pub const STAFF_ONLY: &str = "Forbidden. Only staff or admins can manage payments.";

/// Authenticated account.
///
/// The bearer token must verify, must not be revoked, and must name an
/// account that still exists. Roles are read from the stored account, not
/// the token, so a role change applies to tokens already issued.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The account as currently stored
    pub user: User,
    /// Verified token claims
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let claims = state.jwt.verify(&token, state.now()).map_err(auth_error)?;

        if state.store.is_token_revoked(&claims.jti).await? {
            return Err(AppError::unauthorized("Token has been revoked."));
        }

        let user_id = claims.user_id().map_err(auth_error)?;
        let user = state
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("Unauthenticated."))?;

        Ok(Self { user, claims })
    }
}

/// Require admin role.
///
/// Returns 403 Forbidden if the user is not an admin.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        if !auth.user.role.is_admin() {
            return Err(AppError::forbidden(ADMIN_ONLY));
        }
        Ok(Self(auth))
    }
}

/// Require a role that handles payments (staff or admin).
#[derive(Debug, Clone)]
pub struct RequireStaff(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        if !auth.user.role.handles_payments() {
            return Err(AppError::forbidden(STAFF_ONLY));
        }
        Ok(Self(auth))
    }
}
