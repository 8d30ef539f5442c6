//! # Busdesk authentication
//!
//! Credentials and sessions for the back office:
//!
//! - [`Role`]: `admin`, `staff`, `operator`
//! - [`password`]: Argon2id hashing on the blocking pool
//! - [`jwt`]: HS256 bearer tokens carrying an account snapshot
//!
//! Storage of accounts and revoked token ids lives with the application.
//!
//! ```rust,ignore
//! use busdesk_auth::{JwtCodec, TokenUser};
//!
//! let codec = JwtCodec::new(secret, "busdesk", 3600);
//! let issued = codec.issue(token_user, clock.now())?;
//! let claims = codec.verify(&issued.token, clock.now())?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod error;
pub mod jwt;
pub mod password;
pub mod role;

pub use error::{AuthError, Result};
pub use jwt::{Claims, IssuedToken, JwtCodec, TokenUser};
pub use password::{hash_password, verify_password};
pub use role::{ParseRoleError, Role};
