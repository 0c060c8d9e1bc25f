//! Bearer token issuance.
//!
//! Tokens are HS256 JWTs signed with a symmetric key injected at
//! construction. They are self-contained and never persisted; holding a
//! validly signed, unexpired token is the only proof of authentication the
//! service hands out.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Lifetime of an issued token.
pub const TOKEN_TTL_SECONDS: i64 = 15 * 60;

/// Claim set carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Admin flag of the account the token was issued for.
    pub authorized: bool,
    /// Account identity (email).
    pub sub: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds), always `iat + TOKEN_TTL_SECONDS`
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("token signing key must not be empty")]
    EmptyKey,
    #[error("failed to encode token: {0}")]
    Encode(String),
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// A signed token together with its expiry.
#[derive(Clone)]
pub struct SignedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Signs access tokens with a key supplied by the caller.
pub struct TokenIssuer {
    key: Zeroizing<Vec<u8>>,
    ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SigningError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(SigningError::EmptyKey);
        }
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            ttl: Duration::seconds(TOKEN_TTL_SECONDS),
        })
    }

    /// Issue a token for `identity` expiring fifteen minutes from now.
    pub fn issue(
        &self,
        identity: &str,
        is_admin: bool,
    ) -> Result<SignedToken, SigningError> {
        self.issue_at(identity, is_admin, Utc::now())
    }

    /// Issue a token as if the current time were `now`. Claims carry whole
    /// seconds, so the expiry is `now` truncated to the second plus the ttl.
    pub fn issue_at(
        &self,
        identity: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, SigningError> {
        if self.key.is_empty() {
            return Err(SigningError::EmptyKey);
        }

        let iat = now.timestamp();
        let exp = iat + self.ttl.num_seconds();
        let claims = AccessClaims {
            authorized: is_admin,
            sub: identity.to_string(),
            iat,
            exp,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.key),
        )
        .map_err(|err| SigningError::Encode(err.to_string()))?;

        let expires_at = DateTime::from_timestamp(exp, 0).ok_or_else(|| {
            SigningError::Encode(format!("expiry {exp} out of range"))
        })?;

        Ok(SignedToken { token, expires_at })
    }

    /// Decode and check a token issued with this key. Expiry is enforced
    /// with no leeway.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, SigningError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.key),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => SigningError::Expired,
            _ => SigningError::Invalid(err.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_tokens_with_identity_and_admin_claims() {
        let issuer = TokenIssuer::new("test-secret").unwrap();
        let token = issuer.issue("a@x.com", true).unwrap();
        assert!(!token.as_str().is_empty());
        assert!(token.bearer().starts_with("Bearer "));

        let claims = issuer.verify(token.as_str()).unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert!(claims.authorized);
    }

    #[test]
    fn expiry_is_exactly_fifteen_minutes_after_issue() {
        let issuer = TokenIssuer::new("test-secret").unwrap();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let token = issuer.issue_at("a@x.com", false, now).unwrap();

        assert_eq!(token.expires_at(), now + Duration::minutes(15));

        // Decode without the exp check; the fixed instant is long past.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let claims = decode::<AccessClaims>(
            token.as_str(),
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap()
        .claims;
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.exp, 1_700_000_000 + 900);
        assert!(!claims.authorized);
    }

    #[test]
    fn rejects_tokens_after_expiry() {
        let issuer = TokenIssuer::new("test-secret").unwrap();
        let issued = Utc::now() - Duration::minutes(16);
        let token = issuer.issue_at("a@x.com", true, issued).unwrap();
        assert!(matches!(
            issuer.verify(token.as_str()),
            Err(SigningError::Expired)
        ));
    }

    #[test]
    fn accepts_tokens_just_before_expiry() {
        let issuer = TokenIssuer::new("test-secret").unwrap();
        let issued = Utc::now() - Duration::minutes(14);
        let token = issuer.issue_at("a@x.com", true, issued).unwrap();
        assert!(issuer.verify(token.as_str()).is_ok());
    }

    #[test]
    fn rejects_tokens_signed_with_another_key() {
        let issuer = TokenIssuer::new("test-secret").unwrap();
        let other = TokenIssuer::new("other-secret").unwrap();
        let token = other.issue("a@x.com", true).unwrap();
        assert!(matches!(
            issuer.verify(token.as_str()),
            Err(SigningError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(TokenIssuer::new(""), Err(SigningError::EmptyKey)));
    }

    #[test]
    fn debug_output_redacts_material() {
        let issuer = TokenIssuer::new("test-secret").unwrap();
        let token = issuer.issue("a@x.com", true).unwrap();
        assert!(!format!("{issuer:?}").contains("test-secret"));
        assert!(!format!("{token:?}").contains(token.as_str()));
    }
}
