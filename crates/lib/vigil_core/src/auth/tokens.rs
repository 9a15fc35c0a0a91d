//! Access and refresh token issuance.
//!
//! Stateless HS256 JWTs. The two token families are signed with distinct
//! secrets so compromise of one cannot forge the other, and every token
//! carries a `kind` claim so a refresh token cannot be replayed as an
//! access token even when both secrets happen to match.
//!
//! The issuer is pure: it never touches the credential store. The refresh
//! *flow* (re-reading the account before minting a new pair) belongs to
//! the service layer.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;
use crate::rbac::Role;

/// Which of the two token families a claim set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — account ID (standard JWT `sub` claim).
    pub sub: Uuid,
    /// Account email at issuance time.
    pub email: String,
    /// Account role at issuance time.
    pub role: Role,
    /// Token family.
    pub kind: TokenKind,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// A freshly minted access + refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies token pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access_secret: access_secret.as_bytes().to_vec(),
            refresh_secret: refresh_secret.as_bytes().to_vec(),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    /// Mint a new access + refresh pair for an account.
    ///
    /// No account state is mutated by issuance.
    pub fn issue_pair(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(TokenKind::Access, account_id, email, role)?,
            refresh_token: self.issue(TokenKind::Refresh, account_id, email, role)?,
        })
    }

    /// Seconds until a freshly issued access token expires.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Verify an access token against the access secret.
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        verify(token, &self.access_secret, TokenKind::Access)
    }

    /// Verify a refresh token against the refresh secret.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        verify(token, &self.refresh_secret, TokenKind::Refresh)
    }

    fn issue(
        &self,
        kind: TokenKind,
        account_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        let (secret, ttl) = match kind {
            TokenKind::Access => (&self.access_secret, self.access_ttl),
            TokenKind::Refresh => (&self.refresh_secret, self.refresh_ttl),
        };
        let now = Utc::now();
        let claims = TokenClaims {
            sub: account_id,
            email: email.to_string(),
            role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }
}

/// Decode and validate a token, returning [`AuthError::TokenExpired`] past
/// expiry and [`AuthError::TokenMalformed`] for every structural,
/// signature, or kind failure.
fn verify(token: &str, secret: &[u8], expected: TokenKind) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // No leeway: a token is expired the second past `exp`.
    validation.leeway = 0;

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenMalformed,
        })?;

    if data.claims.kind != expected {
        return Err(AuthError::TokenMalformed);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("access-secret", "refresh-secret", 3600, 604_800)
    }

    #[test]
    fn pair_round_trips_claims() {
        let id = Uuid::new_v4();
        let pair = issuer().issue_pair(id, "a@x.com", Role::Analyst).unwrap();

        let claims = issuer().verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, Role::Analyst);
        assert_eq!(claims.kind, TokenKind::Access);

        let claims = issuer().verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn secrets_are_isolated() {
        let pair = issuer()
            .issue_pair(Uuid::new_v4(), "a@x.com", Role::User)
            .unwrap();

        // An access token never verifies as a refresh token and vice versa.
        assert!(matches!(
            issuer().verify_refresh(&pair.access_token),
            Err(AuthError::TokenMalformed)
        ));
        assert!(matches!(
            issuer().verify_access(&pair.refresh_token),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn kind_claim_guards_identical_secrets() {
        // Even a deployment that misconfigures the two secrets to the same
        // value cannot spend a refresh token as an access token.
        let issuer = TokenIssuer::new("same", "same", 3600, 604_800);
        let pair = issuer
            .issue_pair(Uuid::new_v4(), "a@x.com", Role::User)
            .unwrap();
        assert!(matches!(
            issuer.verify_access(&pair.refresh_token),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new("access-secret", "refresh-secret", -10, -10);
        let pair = issuer
            .issue_pair(Uuid::new_v4(), "a@x.com", Role::User)
            .unwrap();
        assert!(matches!(
            issuer.verify_access(&pair.access_token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            issuer().verify_access("not-a-jwt"),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn wrong_secret_is_malformed_not_expired() {
        let other = TokenIssuer::new("other-access", "other-refresh", 3600, 604_800);
        let pair = issuer()
            .issue_pair(Uuid::new_v4(), "a@x.com", Role::User)
            .unwrap();
        assert!(matches!(
            other.verify_access(&pair.access_token),
            Err(AuthError::TokenMalformed)
        ));
    }
}
