//! Staff and operator management (admins only).
//!
//! - GET /api/admin/users - Paginated list with statistics
//! - POST /api/admin/users - Create an account and email its credentials
//! - GET /api/admin/users/:id - One account
//! - PUT /api/admin/users/:id - Update a staff or operator account
//! - DELETE /api/admin/users/:id - Delete a staff or operator account

use super::MessageResponse;
use crate::auth::{auth_error, RequireAdmin};
use crate::codes::{next_staff_id, staff_id_prefix};
use crate::mail::{spawn_credentials_email, CredentialsEmail};
use crate::metrics;
use crate::server::state::AppState;
use crate::types::{Gender, Id, NewUser, User};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use busdesk_auth::{hash_password, Role};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody, Page, PageQuery};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accounts managed here.
const MANAGED_ROLES: [Role; 2] = [Role::Staff, Role::Operator];

const USERS_PER_PAGE: u32 = 10;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Account fields for create and update.
///
/// On update `password` may be omitted to keep the current one.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    /// Given name
    pub name: Option<String>,
    /// Family name
    pub surname: Option<String>,
    /// Email address (unique)
    pub email: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Phone number (at most 20 characters)
    pub phone: Option<String>,
    /// `male` or `female`
    pub gender: Option<String>,
    /// Password (at least 8 characters)
    pub password: Option<String>,
    /// Must equal `password`
    pub password_confirmation: Option<String>,
    /// `staff` or `operator`
    pub role: Option<String>,
}

/// Counts over every staff and operator account.
#[derive(Debug, Serialize)]
pub struct UserStatistics {
    /// Accounts in total
    pub total_users: usize,
    /// Accounts per role
    pub role_counts: BTreeMap<&'static str, usize>,
    /// Accounts per gender (`unspecified` when not recorded)
    pub gender_counts: BTreeMap<&'static str, usize>,
}

impl UserStatistics {
    fn from_users(users: &[User]) -> Self {
        let mut role_counts = BTreeMap::new();
        let mut gender_counts = BTreeMap::new();
        for user in users {
            *role_counts.entry(user.role.as_str()).or_insert(0) += 1;
            let gender = user.gender.map_or("unspecified", Gender::as_str);
            *gender_counts.entry(gender).or_insert(0) += 1;
        }
        Self {
            total_users: users.len(),
            role_counts,
            gender_counts,
        }
    }
}

/// Response for listing accounts.
#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    /// One page of accounts
    pub users: Page<User>,
    /// Totals across all pages
    pub statistics: UserStatistics,
}

/// Response after creating or updating an account.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// Success message
    pub message: &'static str,
    /// The stored account
    pub user: User,
}

/// Fields that passed validation.
struct ValidUser {
    name: String,
    surname: String,
    email: String,
    address: Option<String>,
    phone: Option<String>,
    gender: Gender,
    password: Option<String>,
    role: Role,
}

/// Validate an account body.
///
/// `existing` is the account being updated: its own email does not count as
/// taken and the password becomes optional.
async fn validate_user(
    state: &AppState,
    req: UserRequest,
    existing: Option<&User>,
) -> Result<ValidUser, AppError> {
    let mut errors = FieldErrors::new();

    let name = errors.required_str("name", req.name);
    let surname = errors.required_str("surname", req.surname);
    let email = errors.required_str("email", req.email);
    let address = FieldErrors::optional_str(req.address);
    let phone = FieldErrors::optional_str(req.phone);

    for (field, value) in [("name", &name), ("surname", &surname), ("address", &address)] {
        if let Some(value) = value {
            errors.max_len(field, value, 255);
        }
    }
    if let Some(phone) = &phone {
        errors.max_len("phone", phone, 20);
    }

    if let Some(email) = &email {
        if errors.email("email", email) && errors.max_len("email", email, 255) {
            let holder = state.store.find_user_by_email(email).await?;
            if holder.is_some_and(|holder| existing.is_none_or(|user| user.id != holder.id)) {
                errors.taken("email");
            }
        }
    }

    let gender = errors
        .required_str("gender", req.gender)
        .and_then(|g| errors.one_of::<Gender>("gender", &g));

    let role = errors
        .required_str("role", req.role)
        .and_then(|r| errors.one_of::<Role>("role", &r));
    let role = match role {
        Some(role) if MANAGED_ROLES.contains(&role) => Some(role),
        Some(_) => {
            errors.invalid_selection("role");
            None
        }
        None => None,
    };

    let password = if existing.is_some() {
        req.password.filter(|p| !p.is_empty())
    } else {
        errors.required("password", req.password)
    };
    if let Some(password) = &password {
        if errors.min_len("password", password, 8) {
            errors.confirmed("password", password, req.password_confirmation.as_deref());
        }
    }

    errors.into_result()?;

    match (name, surname, email, gender, role) {
        (Some(name), Some(surname), Some(email), Some(gender), Some(role)) => Ok(ValidUser {
            name,
            surname,
            email,
            address,
            phone,
            gender,
            password,
            role,
        }),
        _ => Err(AppError::validation("The given data was invalid.")),
    }
}

async fn find_user(state: &AppState, id: Id) -> Result<User, AppError> {
    state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// List staff and operator accounts, 10 per page.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/admin/users?page=2 \
///   -H "Authorization: Bearer <token>"
/// ```
///
/// # Errors
///
/// Returns 401/403 for non-admins, 500 on storage failure.
pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListUsersResponse>, AppError> {
    let users = state.store.users_with_roles(&MANAGED_ROLES).await?;
    let statistics = UserStatistics::from_users(&users);
    let users = Page::from_vec(users, query.with_per_page(USERS_PER_PAGE));

    Ok(Json(ListUsersResponse { users, statistics }))
}

/// Create a staff or operator account.
///
/// A staff id is generated for the role and the credentials are emailed to
/// the new account in the background.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/admin/users \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Rudo", "surname": "Chikore", "email": "rudo@example.com",
///     "gender": "female", "role": "staff",
///     "password": "password123", "password_confirmation": "password123"
///   }'
/// ```
///
/// # Errors
///
/// Returns 422 on field errors.
pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let valid = validate_user(&state, req, None).await?;
    let Some(password) = valid.password else {
        return Err(AppError::validation("The password field is required."));
    };

    let password_hash = hash_password(password.clone()).await.map_err(auth_error)?;
    let existing = state
        .store
        .staff_ids_with_prefix(staff_id_prefix(valid.role))
        .await?;
    let staff_id = next_staff_id(valid.role, existing.iter().map(String::as_str));

    let user = state
        .store
        .create_user(
            NewUser {
                name: valid.name,
                surname: valid.surname,
                email: valid.email,
                address: valid.address,
                phone: valid.phone,
                gender: Some(valid.gender),
                password_hash,
                staff_id,
                role: valid.role,
            },
            state.now(),
        )
        .await?;

    metrics::record_account_created(user.role);
    tracing::info!(
        user_id = user.id,
        staff_id = %user.staff_id,
        role = %user.role,
        created_by = admin.user.id,
        "Account created"
    );

    spawn_credentials_email(
        state.mailer.clone(),
        CredentialsEmail {
            to: user.email.clone(),
            full_name: user.full_name(),
            staff_id: user.staff_id.clone(),
            role: user.role.as_str().to_string(),
            password,
            login_url: state.login_url(),
        },
    );

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully.",
            user,
        }),
    ))
}

/// One account.
///
/// # Errors
///
/// Returns 404 when the account does not exist.
pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<User>, AppError> {
    Ok(Json(find_user(&state, id).await?))
}

/// Update a staff or operator account.
///
/// # Errors
///
/// - 404 when the account does not exist
/// - 403 for admin accounts
/// - 422 on field errors
pub async fn update_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<UserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut user = find_user(&state, id).await?;
    if user.role.is_admin() {
        return Err(AppError::forbidden("Cannot update admin users here."));
    }

    let valid = validate_user(&state, req, Some(&user)).await?;

    if let Some(password) = valid.password {
        user.password_hash = hash_password(password).await.map_err(auth_error)?;
    }
    user.name = valid.name;
    user.surname = valid.surname;
    user.email = valid.email;
    user.address = valid.address;
    user.phone = valid.phone;
    user.gender = Some(valid.gender);
    user.role = valid.role;
    user.updated_at = state.now();

    let user = state.store.update_user(&user).await?;
    tracing::info!(user_id = user.id, role = %user.role, "Account updated");

    Ok(Json(UserResponse {
        message: "User updated successfully.",
        user,
    }))
}

/// Delete a staff or operator account.
///
/// # Errors
///
/// - 404 when the account does not exist
/// - 403 for admin accounts
/// - 409 while tickets or payments reference the account
pub async fn delete_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = find_user(&state, id).await?;
    if user.role.is_admin() {
        return Err(AppError::forbidden("Cannot delete admin users here."));
    }

    state.store.delete_user(id).await?;
    tracing::info!(user_id = id, "Account deleted");

    Ok(Json(MessageResponse::new("User deleted successfully.")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: Role, gender: Option<Gender>) -> User {
        let now = Utc::now();
        User {
            id: 1,
            name: "Rudo".into(),
            surname: "Chikore".into(),
            email: "rudo@example.com".into(),
            address: None,
            phone: None,
            gender,
            password_hash: String::new(),
            staff_id: "PSC100".into(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_statistics_count_roles_and_genders() {
        let users = [
            user(Role::Staff, Some(Gender::Female)),
            user(Role::Staff, Some(Gender::Male)),
            user(Role::Operator, None),
        ];
        let stats = UserStatistics::from_users(&users);

        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.role_counts["staff"], 2);
        assert_eq!(stats.role_counts["operator"], 1);
        assert_eq!(stats.gender_counts["female"], 1);
        assert_eq!(stats.gender_counts["unspecified"], 1);
    }
}
