//! HS256 JSON Web Tokens.
//!
//! Tokens are compact JWS strings (`header.payload.signature`, base64url
//! without padding) signed with HMAC-SHA256. Besides the registered claims
//! (`sub`, `iat`, `exp`, `iss`, `jti`) every token carries a `user` claim so
//! clients can render the session without another round trip.
//!
//! Revocation is not handled here: callers keep a denylist keyed by `jti`.

use crate::error::{AuthError, Result};
use crate::role::Role;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Account snapshot embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUser {
    /// User id
    pub id: i64,
    /// Given name
    pub name: String,
    /// Family name
    pub surname: String,
    /// Email address
    pub email: String,
    /// Staff id used to log in
    pub staff_id: String,
    /// Role at issue time
    pub role: Role,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id as a string
    pub sub: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Unique token id, used for revocation
    pub jti: String,
    /// Account snapshot
    pub user: TokenUser,
}

impl Claims {
    /// Subject as a user id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if `sub` is not an integer.
    pub fn user_id(&self) -> Result<i64> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// A freshly signed token with its claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact token string
    pub token: String,
    /// Claims encoded in `token`
    pub claims: Claims,
}

/// Signs and verifies tokens with a shared secret.
#[derive(Clone)]
pub struct JwtCodec {
    secret: Vec<u8>,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCodec")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtCodec {
    /// Create a codec.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>, issuer: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            issuer: issuer.into(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Token lifetime in seconds.
    #[must_use]
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a token for `user` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if the claims cannot be serialized.
    pub fn issue(&self, user: TokenUser, now: DateTime<Utc>) -> Result<IssuedToken> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            iat,
            exp: iat + self.ttl.num_seconds(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            user,
        };

        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header = serde_json::to_vec(&header)
            .map_err(|e| AuthError::Encoding(format!("header: {e}")))?;
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| AuthError::Encoding(format!("claims: {e}")))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.sign(signing_input.as_bytes())?;

        Ok(IssuedToken {
            token: format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)),
            claims,
        })
    }

    /// Verify a token's signature, issuer, and expiry at `now`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] for malformed tokens, bad signatures,
    ///   unexpected algorithms, or a foreign issuer
    /// - [`AuthError::TokenExpired`] once `now >= exp`
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let header: Header = decode_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::InvalidToken);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let claims: Claims = decode_json(payload_b64)?;
        if claims.iss != self.issuer {
            return Err(AuthError::InvalidToken);
        }
        if now.timestamp() >= claims.exp {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Encoding(format!("HMAC key: {e}")))
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> TokenUser {
        TokenUser {
            id: 7,
            name: "Tariro".to_string(),
            surname: "Moyo".to_string(),
            email: "tariro@example.com".to_string(),
            staff_id: "ADM100".to_string(),
            role: Role::Admin,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = JwtCodec::new("secret", "busdesk", 3600);
        let issued = codec.issue(user(), now()).unwrap();

        let claims = codec.verify(&issued.token, now()).unwrap();
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.user_id().unwrap(), 7);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.user.staff_id, "ADM100");
    }

    #[test]
    fn test_each_token_has_its_own_jti() {
        let codec = JwtCodec::new("secret", "busdesk", 3600);
        let a = codec.issue(user(), now()).unwrap();
        let b = codec.issue(user(), now()).unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
    }

    #[test]
    fn test_expired_at_exp() {
        let codec = JwtCodec::new("secret", "busdesk", 60);
        let issued = codec.issue(user(), now()).unwrap();

        assert!(codec.verify(&issued.token, now() + Duration::seconds(59)).is_ok());
        assert_eq!(
            codec.verify(&issued.token, now() + Duration::seconds(60)),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn test_wrong_secret_or_issuer_rejected() {
        let issued = JwtCodec::new("secret", "busdesk", 60)
            .issue(user(), now())
            .unwrap();

        assert_eq!(
            JwtCodec::new("other", "busdesk", 60).verify(&issued.token, now()),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            JwtCodec::new("secret", "elsewhere", 60).verify(&issued.token, now()),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = JwtCodec::new("secret", "busdesk", 60);
        let issued = codec.issue(user(), now()).unwrap();

        let mut forged = issued.claims.clone();
        forged.user.role = Role::Admin;
        forged.sub = "1".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let parts: Vec<&str> = issued.token.split('.').collect();
        let token = format!("{}.{forged_payload}.{}", parts[0], parts[2]);

        assert_eq!(codec.verify(&token, now()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = JwtCodec::new("secret", "busdesk", 60);
        for token in ["", "abc", "a.b", "a.b.c", "a.b.c.d"] {
            assert_eq!(codec.verify(token, now()), Err(AuthError::InvalidToken));
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let codec = JwtCodec::new("hunter2", "busdesk", 60);
        assert!(!format!("{codec:?}").contains("hunter2"));
    }
}
