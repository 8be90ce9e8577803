use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Errors verifying session tokens
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("No session token key configured: set `auth_secret` or `auth_public_key`")]
    MissingKey,
}

/// Claims of a session token issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The user ID
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verifies the signed session tokens of the identity provider
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Verify HS256 tokens signed with a shared secret
    pub fn from_secret(secret: &str, issuer: Option<&str>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: build_validation(Algorithm::HS256, issuer),
        }
    }

    /// Verify RS256 tokens with the identity provider's public key
    pub fn from_rsa_pem(public_key: &str, issuer: Option<&str>) -> Result<Self, AuthError> {
        Ok(Self {
            decoding: DecodingKey::from_rsa_pem(public_key.as_bytes())?,
            validation: build_validation(Algorithm::RS256, issuer),
        })
    }

    /// Build the verifier from the server configuration. The public key takes
    /// precedence over the secret.
    pub fn from_config(config: &AppConfig) -> Result<Self, AuthError> {
        let issuer = config.auth_issuer.as_deref();
        match (&config.auth_public_key, &config.auth_secret) {
            (Some(public_key), _) => Self::from_rsa_pem(public_key, issuer),
            (None, Some(secret)) => Ok(Self::from_secret(secret, issuer)),
            (None, None) => Err(AuthError::MissingKey),
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

fn build_validation(algorithm: Algorithm, issuer: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    validation
}
