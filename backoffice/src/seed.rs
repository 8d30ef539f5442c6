//! Demo data for fresh installs.
//!
//! Creates four admin accounts, `admin1@example.com` through
//! `admin4@example.com`, all with the password `password`. Accounts whose
//! email already exists are left alone, so seeding can run repeatedly.

use crate::codes::{next_staff_id, staff_id_prefix};
use crate::environment::Clock;
use crate::store::{Store, StoreError};
use crate::types::{Gender, NewUser, User};
use busdesk_auth::{hash_password, AuthError, Role};
use thiserror::Error;

/// Number of demo admins.
pub const DEMO_ADMIN_COUNT: u32 = 4;

/// Password shared by every demo admin.
pub const DEMO_PASSWORD: &str = "password";

/// Seeding failures.
#[derive(Error, Debug)]
pub enum SeedError {
    /// Storage rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The demo password could not be hashed.
    #[error(transparent)]
    Hashing(#[from] AuthError),
}

fn demo_admin(i: u32, password_hash: String, staff_id: String) -> NewUser {
    NewUser {
        name: format!("Admin {i}"),
        surname: format!("PSC {i}"),
        email: format!("admin{i}@example.com"),
        address: Some(format!("5772 6th Close Glen view{i}")),
        phone: Some(format!("+263 716 234 64{i}")),
        gender: Some(Gender::Male),
        password_hash,
        staff_id,
        role: Role::Admin,
    }
}

/// Create the demo admins that do not exist yet.
///
/// Returns the accounts created by this call.
///
/// # Errors
///
/// Returns [`SeedError`] if storage fails or the password cannot be hashed.
pub async fn seed_demo_admins(store: &dyn Store, clock: &dyn Clock) -> Result<Vec<User>, SeedError> {
    let mut password_hash: Option<String> = None;
    let mut created = Vec::new();

    for i in 1..=DEMO_ADMIN_COUNT {
        let email = format!("admin{i}@example.com");
        if store.find_user_by_email(&email).await?.is_some() {
            tracing::debug!(email = %email, "Demo admin already present");
            continue;
        }

        let hash = match &password_hash {
            Some(hash) => hash.clone(),
            None => {
                let hash = hash_password(DEMO_PASSWORD.to_string()).await?;
                password_hash = Some(hash.clone());
                hash
            }
        };

        let existing = store.staff_ids_with_prefix(staff_id_prefix(Role::Admin)).await?;
        let staff_id = next_staff_id(Role::Admin, existing.iter().map(String::as_str));

        let user = store.create_user(demo_admin(i, hash, staff_id), clock.now()).await?;
        tracing::info!(user_id = user.id, staff_id = %user.staff_id, email = %user.email, "Seeded demo admin");
        created.push(user);
    }

    Ok(created)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::environment::FixedClock;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_seeding_twice_creates_each_admin_once() {
        let store = MemoryStore::new();
        let clock = FixedClock::new(Utc::now());

        let first = seed_demo_admins(&store, &clock).await.unwrap();
        let staff_ids: Vec<_> = first.iter().map(|u| u.staff_id.as_str()).collect();
        assert_eq!(staff_ids, ["ADM100", "ADM101", "ADM102", "ADM103"]);
        assert_eq!(first[2].phone.as_deref(), Some("+263 716 234 643"));

        let second = seed_demo_admins(&store, &clock).await.unwrap();
        assert!(second.is_empty());
    }
}
