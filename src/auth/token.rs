use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ServerConfig;
use crate::constants::TOKEN_LIFETIME_SECS;
use crate::error::{AgendaError, Result};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (as UTC timestamp)
    pub iat: u64,
    /// Expiration time (as UTC timestamp)
    pub exp: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Claims {
    /// Creates claims for a user, valid for three days from now
    pub fn new(user_id: u64) -> Self {
        Self::issued_at(user_id, now_secs())
    }

    /// Creates claims as if issued at `iat`
    pub fn issued_at(user_id: u64, iat: u64) -> Self {
        Self {
            sub: user_id.to_string(),
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        now_secs() >= self.exp
    }

    /// Numeric subject carried by the token
    pub fn user_id(&self) -> Result<u64> {
        self.sub
            .parse()
            .map_err(|_| AgendaError::InvalidToken(format!("non-numeric subject '{}'", self.sub)))
    }
}

/// Signs and verifies bearer tokens with the process-wide secret
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a secret
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.jwt_secret)
    }

    /// Issues a token for the given user, valid for three days
    pub fn issue(&self, user_id: u64) -> Result<String> {
        self.generate_token(&Claims::new(user_id))
    }

    /// Generates a JWT token for the given claims
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AgendaError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Validates and decodes a JWT token
    pub fn get_claims(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AgendaError::InvalidToken(e.to_string()))
    }

    /// Verifies a token and returns the user ID it was issued for
    pub fn verify(&self, token: &str) -> Result<u64> {
        let claims = self.get_claims(token)?;

        if claims.is_expired() {
            return Err(AgendaError::InvalidToken("Token expired".to_string()));
        }

        claims.user_id()
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "token-tests-signing-key-0123456789abcdef";

    #[test]
    fn test_issue_then_verify() {
        let manager = TokenManager::new(SECRET);
        let token = manager.issue(42).unwrap();
        assert_eq!(manager.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_lifetime_is_three_days() {
        let claims = Claims::issued_at(7, 1_000);
        assert_eq!(claims.exp - claims.iat, 259_200);
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = TokenManager::new(SECRET);
        let issued = now_secs() - TOKEN_LIFETIME_SECS - 5;
        let token = manager.generate_token(&Claims::issued_at(7, issued)).unwrap();

        let err = manager.verify(&token).unwrap_err();
        assert!(matches!(err, AgendaError::InvalidToken(_)));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let issuer = TokenManager::new("another-signing-key-0123456789abcdefgh");
        let verifier = TokenManager::new(SECRET);
        let token = issuer.issue(42).unwrap();

        assert!(matches!(
            verifier.verify(&token),
            Err(AgendaError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let manager = TokenManager::new(SECRET);
        assert!(matches!(
            manager.verify("invalid.token.here"),
            Err(AgendaError::InvalidToken(_))
        ));
        assert!(manager.verify("").is_err());
    }

    #[test]
    fn test_non_numeric_subject_rejected() {
        let manager = TokenManager::new(SECRET);
        let mut claims = Claims::new(1);
        claims.sub = "alice".to_string();
        let token = manager.generate_token(&claims).unwrap();
        assert!(matches!(
            manager.verify(&token),
            Err(AgendaError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic dXNlcjpwdw=="), None);
        assert_eq!(extract_bearer_token("bearer abc"), None);
    }
}
