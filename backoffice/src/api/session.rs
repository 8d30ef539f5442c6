//! Session endpoints.
//!
//! - POST /api/admin/register - Create the first admin (public, once)
//! - POST /api/admin/login - Exchange staff id and password for a token
//! - POST /api/admin/logout - Revoke the presented token
//! - GET /api/admin/me - Current account

use super::MessageResponse;
use crate::auth::{auth_error, token_user, AuthUser};
use crate::codes::{next_staff_id, staff_id_prefix};
use crate::metrics;
use crate::server::state::AppState;
use crate::types::{Gender, NewUser, User};
use axum::{extract::State, http::StatusCode, Json};
use busdesk_auth::{hash_password, verify_password, Role};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to bootstrap the first admin.
#[derive(Debug, Deserialize)]
pub struct RegisterAdminRequest {
    /// Given name
    pub name: Option<String>,
    /// Family name
    pub surname: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Password (at least 8 characters)
    pub password: Option<String>,
    /// Must equal `password`
    pub password_confirmation: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Phone number
    pub phone: Option<String>,
}

/// Response after creating an account.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Success message
    pub message: &'static str,
    /// The account
    pub user: User,
}

/// Login credentials.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Staff id (`ADM100`, `PSC101`, ...)
    pub staff_id: Option<String>,
    /// Password
    pub password: Option<String>,
}

/// Response after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Success message
    pub message: &'static str,
    /// Signed bearer token
    pub token: String,
    /// Always `bearer`
    pub token_type: &'static str,
    /// Seconds until the token expires
    pub expires_in: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create the first admin account.
///
/// Only works while no admin exists; afterwards admins are seeded or created
/// out of band.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/admin/register \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Tendai", "surname": "Moyo", "email": "tendai@example.com",
///     "password": "password123", "password_confirmation": "password123",
///     "address": "12 Samora Machel Ave", "phone": "+263 77 123 4567"
///   }'
/// ```
///
/// # Errors
///
/// - 422 on field errors
/// - 409 once an admin exists
pub async fn register_admin(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterAdminRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    if state.store.admin_exists().await? {
        return Err(AppError::conflict("An admin account already exists."));
    }

    let mut errors = FieldErrors::new();

    let name = errors.required_str("name", req.name);
    let surname = errors.required_str("surname", req.surname);
    let email = errors.required_str("email", req.email);
    let password = errors.required("password", req.password);
    let address = errors.required_str("address", req.address);
    let phone = errors.required_str("phone", req.phone);

    for (field, value) in [("name", &name), ("surname", &surname), ("address", &address), ("phone", &phone)] {
        if let Some(value) = value {
            errors.max_len(field, value, 255);
        }
    }
    if let Some(email) = &email {
        if errors.email("email", email)
            && errors.max_len("email", email, 255)
            && state.store.find_user_by_email(email).await?.is_some()
        {
            errors.taken("email");
        }
    }
    if let Some(password) = &password {
        if errors.min_len("password", password, 8) {
            errors.confirmed("password", password, req.password_confirmation.as_deref());
        }
    }
    errors.into_result()?;

    let (Some(name), Some(surname), Some(email), Some(password)) = (name, surname, email, password)
    else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let password_hash = hash_password(password).await.map_err(auth_error)?;
    let existing = state.store.staff_ids_with_prefix(staff_id_prefix(Role::Admin)).await?;
    let staff_id = next_staff_id(Role::Admin, existing.iter().map(String::as_str));

    let user = state
        .store
        .create_user(
            NewUser {
                name,
                surname,
                email,
                address,
                phone,
                gender: Some(Gender::Male),
                password_hash,
                staff_id,
                role: Role::Admin,
            },
            state.now(),
        )
        .await?;

    metrics::record_account_created(Role::Admin);
    tracing::info!(user_id = user.id, staff_id = %user.staff_id, "Admin registered");

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "Admin created successfully.",
            user,
        }),
    ))
}

/// Log in with staff id and password.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/admin/login \
///   -H "Content-Type: application/json" \
///   -d '{"staff_id": "ADM100", "password": "password123"}'
/// ```
///
/// # Errors
///
/// - 422 when a field is missing
/// - 401 for an unknown staff id or wrong password
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let mut errors = FieldErrors::new();
    let staff_id = errors.required_str("staff_id", req.staff_id);
    let password = errors.required("password", req.password);
    errors.into_result()?;

    let (Some(staff_id), Some(password)) = (staff_id, password) else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let Some(user) = state.store.find_user_by_staff_id(&staff_id).await? else {
        metrics::record_login(false);
        tracing::info!(staff_id = %staff_id, "Login rejected: unknown staff id");
        return Err(AppError::unauthorized("Invalid credentials."));
    };

    let valid = verify_password(password, user.password_hash.clone())
        .await
        .map_err(auth_error)?;
    if !valid {
        metrics::record_login(false);
        tracing::info!(user_id = user.id, "Login rejected: wrong password");
        return Err(AppError::unauthorized("Invalid credentials."));
    }

    let issued = state
        .jwt
        .issue(token_user(&user), state.now())
        .map_err(auth_error)?;

    metrics::record_login(true);
    tracing::info!(user_id = user.id, role = %user.role, "Login successful");

    Ok(Json(LoginResponse {
        message: "Login successful",
        token: issued.token,
        token_type: "bearer",
        expires_in: state.jwt.ttl_secs(),
    }))
}

/// Revoke the presented token.
///
/// The token's id stays on the denylist until the token would have expired.
///
/// # Errors
///
/// Returns 401 without a valid token.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .store
        .revoke_token(&auth.claims.jti, auth.claims.expires_at(), state.now())
        .await?;

    tracing::info!(user_id = auth.user.id, "Logged out");
    Ok(Json(MessageResponse::new("Logout successful")))
}

/// The authenticated account.
#[allow(clippy::unused_async)]
pub async fn me(AuthUser { user, .. }: AuthUser) -> Json<User> {
    Json(user)
}
