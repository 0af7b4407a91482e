//! Bearer-credential authentication.
//!
//! Credentials are self-contained, signed JSON Web Tokens (HS256); there is
//! no session state and no revocation list. Verification happens in two
//! places: the [`Authenticated`] axum extractor for HTTP commands, and
//! [`Authenticator::verify`] called directly by the subscription gateway
//! before a WebSocket upgrade completes.

use async_trait::async_trait;
use auctionhouse_eyre::eyre;
use axum::{
    extract::{
        FromRef,
        FromRequestParts,
    },
    http::request::Parts,
};
use jsonwebtoken::{
    decode,
    encode,
    DecodingKey,
    EncodingKey,
    Header,
    Validation,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::DomainError,
    ids::UserId,
};

/// The decoded form of a bearer credential. Never stored; held only for the
/// duration of request handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the authenticated user's id.
    pub sub: UserId,
    pub roles: Vec<String>,
    /// Expiry, as Unix seconds.
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Verifies and mints bearer credentials against a single shared signing
/// secret.
#[derive(Clone)]
pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    #[must_use]
    pub fn new(signing_secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_secret.as_bytes()),
            validation: Validation::new(jsonwebtoken::Algorithm::HS256),
        }
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, DomainError> {
        encode(&Header::new(jsonwebtoken::Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| DomainError::Internal(eyre::Report::new(e)))
    }

    /// Verifies a raw bearer token, returning its claims or
    /// [`DomainError::Unauthenticated`] on any failure (missing, malformed,
    /// badly signed, or expired).
    pub fn verify(&self, token: &str) -> Result<Claims, DomainError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| DomainError::Unauthenticated)
    }
}

/// An axum extractor that authenticates the request from its
/// `Authorization: Bearer <token>` header, populating handler arguments
/// with the caller's [`Claims`].
pub struct Authenticated(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    Authenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = Authenticator::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(DomainError::Unauthenticated)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(DomainError::Unauthenticated)?;
        let claims = authenticator.verify(token)?;
        Ok(Self(claims))
    }
}

/// Requires the caller to carry `role` in addition to being authenticated;
/// used as a guard inside command handlers rather than a separate
/// extractor, since the capability check is usually entity-scoped (e.g.
/// "host of this channel") rather than a static role.
pub fn require_role(claims: &Claims, role: &str) -> Result<(), DomainError> {
    if claims.has_role(role) {
        Ok(())
    } else {
        Err(DomainError::forbidden(format!("requires role {role}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token() {
        let auth = Authenticator::new("test-secret");
        let claims = Claims {
            sub: UserId(42),
            roles: vec!["seller".to_string()],
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = auth.issue(&claims).unwrap();
        let decoded = auth.verify(&token).unwrap();
        assert_eq!(decoded.sub, UserId(42));
        assert!(decoded.has_role("seller"));
    }

    #[test]
    fn rejects_expired_token() {
        let auth = Authenticator::new("test-secret");
        let claims = Claims {
            sub: UserId(1),
            roles: vec![],
            exp: (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp(),
        };
        let token = auth.issue(&claims).unwrap();
        assert!(matches!(auth.verify(&token), Err(DomainError::Unauthenticated)));
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let issuer = Authenticator::new("secret-a");
        let verifier = Authenticator::new("secret-b");
        let claims = Claims {
            sub: UserId(1),
            roles: vec![],
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = issuer.issue(&claims).unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(DomainError::Unauthenticated)
        ));
    }
}
