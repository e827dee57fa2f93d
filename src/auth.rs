//! Caller authentication and session identity
//!
//! HS256 bearer tokens carry the principal (`sub`) every turn acts for.
//! Session ids come from a pluggable resolver keyed on that principal.

use crate::error::AssistantError;
use crate::Result;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const MAX_SESSION_ID_LEN: usize = 128;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Authenticated principal (ledger user name)
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for `subject` valid for `ttl` (development and tests).
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as usize;
        self.issue_claims(&Claims {
            sub: subject.to_string(),
            exp: now + ttl.as_secs() as usize,
            iat: now,
            jti: Some(Uuid::new_v4().to_string()),
        })
    }

    pub fn issue_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AssistantError::AuthenticationError(format!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AssistantError::AuthenticationError(format!("Invalid or expired token: {}", e)))?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AssistantError::AuthenticationError(
                "Token has an empty subject".to_string(),
            ));
        }

        Ok(token_data.claims)
    }
}

/// Verified identity of the party sending a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub principal: String,
}

impl Caller {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}

impl From<Claims> for Caller {
    fn from(claims: Claims) -> Self {
        Self::new(claims.sub)
    }
}

pub fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

fn validate_session_id(raw: &str) -> Result<String> {
    let id = raw.trim();
    let well_formed = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));

    if well_formed {
        Ok(id.to_string())
    } else {
        Err(AssistantError::ValidationError(format!(
            "Malformed session id (expected 1-{} characters of [A-Za-z0-9-_.:])",
            MAX_SESSION_ID_LEN
        )))
    }
}

/// Maps a caller plus an optional requested id to the session the turn runs in
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, caller: &Caller, requested: Option<&str>) -> Result<String>;
}

/// Requested id when given, otherwise one stable session per principal
pub struct CallerScopedResolver;

impl SessionResolver for CallerScopedResolver {
    fn resolve(&self, caller: &Caller, requested: Option<&str>) -> Result<String> {
        match requested {
            Some(id) => validate_session_id(id),
            None => Ok(stable_uuid_from_string(&format!("session:{}", caller.principal)).to_string()),
        }
    }
}

/// Requested id when given, otherwise a brand-new session
pub struct FreshSessionResolver;

impl SessionResolver for FreshSessionResolver {
    fn resolve(&self, _caller: &Caller, requested: Option<&str>) -> Result<String> {
        match requested {
            Some(id) => validate_session_id(id),
            None => Ok(Uuid::new_v4().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new(SECRET);
        let token = service.issue("Alice", Duration::from_secs(600)).unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, "Alice");
        assert!(claims.jti.is_some());
        assert_eq!(Caller::from(claims), Caller::new("Alice"));
    }

    #[test]
    fn test_rejects_expired_and_foreign_tokens() {
        let service = TokenService::new(SECRET);
        let now = Utc::now().timestamp() as usize;

        let expired = service
            .issue_claims(&Claims {
                sub: "Alice".to_string(),
                exp: now - 3_600,
                iat: now - 7_200,
                jti: None,
            })
            .unwrap();
        assert!(matches!(
            service.verify(&expired),
            Err(AssistantError::AuthenticationError(_))
        ));

        let foreign = TokenService::new("other-secret")
            .issue("Alice", Duration::from_secs(600))
            .unwrap();
        assert_err!(service.verify(&foreign));
        assert_err!(service.verify("not-a-jwt"));
    }

    #[test]
    fn test_rejects_empty_subject() {
        let service = TokenService::new(SECRET);
        let token = service.issue("  ", Duration::from_secs(600)).unwrap();
        assert!(service.verify(&token).is_err());
    }

    #[test]
    fn test_caller_scoped_resolver() {
        let alice = Caller::new("Alice");
        let bob = Caller::new("Bob");

        let a1 = CallerScopedResolver.resolve(&alice, None).unwrap();
        let a2 = CallerScopedResolver.resolve(&alice, None).unwrap();
        let b = CallerScopedResolver.resolve(&bob, None).unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);

        assert_eq!(
            CallerScopedResolver.resolve(&alice, Some(" abc-123 ")).unwrap(),
            "abc-123"
        );
        assert_err!(CallerScopedResolver.resolve(&alice, Some("")));
        assert_err!(CallerScopedResolver.resolve(&alice, Some("a b")));
        assert_ok!(CallerScopedResolver.resolve(&alice, Some("tenant:42_a.b")));
    }

    #[test]
    fn test_fresh_resolver_mints_new_ids() {
        let alice = Caller::new("Alice");
        let first = FreshSessionResolver.resolve(&alice, None).unwrap();
        let second = FreshSessionResolver.resolve(&alice, None).unwrap();
        assert_ne!(first, second);
        assert_ok!(Uuid::parse_str(&first));
    }

    #[test]
    fn test_stable_uuid_is_deterministic() {
        assert_eq!(stable_uuid_from_string("x"), stable_uuid_from_string("x"));
        assert_eq!(stable_uuid_from_string("x").get_version_num(), 4);
    }
}
