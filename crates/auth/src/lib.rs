use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use http::header;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use mediq_contracts::{AccountId, RoleSet, Session};
use serde::{Deserialize, Serialize};

pub mod password;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingHeader,
    MalformedHeader,
    InvalidToken,
    SessionExpired,
    SigningFailed,
}

impl AuthError {
    pub fn message(self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing Authorization header",
            AuthError::MalformedHeader => "Authorization must be a Bearer token",
            AuthError::InvalidToken => "invalid session token",
            AuthError::SessionExpired => "session expired",
            AuthError::SigningFailed => "failed to sign session token",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AuthError {}

/// Wire shape of the signed claim set. Role tags travel as strings so a
/// token issued before a vocabulary change still parses; unknown tags are
/// dropped on verification rather than rejected.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: AccountId,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Issues and verifies self-contained bearer tokens (JWT, HS256). Any
/// verifier holding the shared secret can validate a token without a
/// database round trip. Expiry uses wall-clock time at verification with
/// zero leeway; clock skew is not compensated.
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    validation: Validation,
}

impl SessionCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand against the caller-visible clock so the
        // expired case maps to its own error instead of a generic failure.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
            validation,
        }
    }

    pub fn issue(&self, subject_id: AccountId, roles: RoleSet) -> Result<String, AuthError> {
        self.issue_at(subject_id, roles, unix_epoch_secs_now())
    }

    pub fn verify(&self, token: &str) -> Result<Session, AuthError> {
        self.verify_at(token, unix_epoch_secs_now())
    }

    fn issue_at(
        &self,
        subject_id: AccountId,
        roles: RoleSet,
        issued_at: i64,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject_id,
            roles: roles.tags().into_iter().map(str::to_string).collect(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.ttl.as_secs().min(i64::MAX as u64) as i64),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::SigningFailed)
    }

    fn verify_at(&self, token: &str, now: i64) -> Result<Session, AuthError> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;

        let claims = decoded.claims;
        if now > claims.exp {
            return Err(AuthError::SessionExpired);
        }

        Ok(Session {
            subject_id: claims.sub,
            roles: RoleSet::from_tags(&claims.roles),
        })
    }
}

fn unix_epoch_secs_now() -> i64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    duration.as_secs().min(i64::MAX as u64) as i64
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader)?;

    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .ok_or(AuthError::MalformedHeader)?;

    if token.trim().is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediq_contracts::Role;

    fn codec(ttl_secs: u64) -> SessionCodec {
        SessionCodec::new(
            b"unit-test-secret-at-least-32-bytes!!",
            Duration::from_secs(ttl_secs),
        )
    }

    #[test]
    fn round_trip_preserves_subject_and_role_set() {
        let codec = codec(3600);
        let roles = RoleSet::from_roles(&[Role::Doctor, Role::Patient]);

        let token = codec.issue(42, roles).expect("issue should succeed");
        let session = codec.verify(&token).expect("verify should succeed");

        assert_eq!(session.subject_id, 42);
        assert_eq!(session.roles, roles);
    }

    #[test]
    fn verify_succeeds_just_before_expiry_and_fails_just_after() {
        let codec = codec(600);
        let issued_at = 1_700_000_000;
        let token = codec
            .issue_at(7, RoleSet::from_roles(&[Role::Patient]), issued_at)
            .expect("issue should succeed");

        codec
            .verify_at(&token, issued_at + 600 - 1)
            .expect("token should still verify one second before expiry");

        let err = codec
            .verify_at(&token, issued_at + 600 + 1)
            .expect_err("token must be rejected after expiry");
        assert_eq!(err, AuthError::SessionExpired);
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let codec = codec(3600);
        let token = codec
            .issue(1, RoleSet::from_roles(&[Role::Patient]))
            .expect("issue should succeed");

        let other = SessionCodec::new(
            b"a-completely-different-signing-key!!",
            Duration::from_secs(3600),
        );
        let err = other.verify(&token).expect_err("wrong key must fail");
        assert_eq!(err, AuthError::InvalidToken);

        let err = codec
            .verify("not.a.token")
            .expect_err("garbage must fail");
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[test]
    fn verify_drops_unknown_role_tags() {
        let codec = codec(3600);
        let claims = Claims {
            sub: 9,
            roles: vec!["PATIENT".to_string(), "SUPERUSER".to_string()],
            iat: unix_epoch_secs_now(),
            exp: unix_epoch_secs_now() + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &codec.encoding_key,
        )
        .expect("encode should succeed");

        let session = codec.verify(&token).expect("verify should succeed");
        assert_eq!(session.roles, RoleSet::from_roles(&[Role::Patient]));
    }

    #[test]
    fn bearer_token_rejects_missing_and_malformed_headers() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap_err(), AuthError::MissingHeader);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Basic dXNlcjpwYXNz".parse().expect("header must parse"),
        );
        assert_eq!(
            bearer_token(&headers).unwrap_err(),
            AuthError::MalformedHeader
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Bearer abc.def.ghi".parse().expect("header must parse"),
        );
        assert_eq!(bearer_token(&headers).expect("token"), "abc.def.ghi");
    }
}
