//! Application state for the back-office HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Storage (accounts, catalogs, trips, tickets, payments, revoked tokens)
//! - Token codec
//! - Mailer
//! - Clock

use crate::environment::Clock;
use crate::mail::Mailer;
use crate::store::Store;
use busdesk_auth::JwtCodec;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// It's cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Storage backend
    pub store: Arc<dyn Store>,

    /// Signs and verifies bearer tokens
    pub jwt: Arc<JwtCodec>,

    /// Sends account emails
    pub mailer: Arc<dyn Mailer>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Front-end base URL, used for login links in emails
    pub frontend_url: Arc<str>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        jwt: JwtCodec,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        frontend_url: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            store,
            jwt: Arc::new(jwt),
            mailer,
            clock,
            frontend_url: frontend_url.into(),
        }
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Where credential emails send people to sign in.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/login", self.frontend_url.trim_end_matches('/'))
    }
}
