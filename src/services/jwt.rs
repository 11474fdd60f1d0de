//! JWT service for access/refresh token generation and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{User, UserRole};

use super::ServiceError;

/// Claims carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, ServiceError> {
        self.sub.parse().map_err(|_| ServiceError::InvalidToken)
    }
}

/// Token pair returned to the caller after successful authentication.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Signs short-lived access tokens and long-lived refresh tokens with
/// distinct secrets. Refresh tokens are single-use in effect because each
/// refresh rotates the session's stored token value.
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.access_secret.is_empty() || config.refresh_secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secrets must not be empty"));
        }
        if config.access_secret == config.refresh_secret {
            return Err(anyhow::anyhow!(
                "Access and refresh tokens must use distinct secrets"
            ));
        }

        Ok(Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        })
    }

    fn claims(&self, user: &User, lifetime: Duration) -> Claims {
        let now = Utc::now();
        Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Issue an access/refresh pair for a user.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, ServiceError> {
        let header = Header::new(Algorithm::HS256);

        let access_claims = self.claims(user, Duration::minutes(self.access_token_expiry_minutes));
        let access_token = encode(&header, &access_claims, &self.access_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode access token: {}", e)))?;

        let refresh_claims = self.claims(user, Duration::days(self.refresh_token_expiry_days));
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode refresh token: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_minutes * 60,
        })
    }

    fn verify(&self, token: &str, key: &DecodingKey) -> Result<Claims, ServiceError> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                Err(ServiceError::TokenExpired)
            }
            Err(_) => Err(ServiceError::InvalidToken),
        }
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, ServiceError> {
        self.verify(token, &self.access_decoding)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, ServiceError> {
        self.verify(token, &self.refresh_decoding)
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }
}
