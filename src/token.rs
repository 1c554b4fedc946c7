//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

const DEFAULT_AUDIENCE: &str = "activo";
pub const ACCESS_LIFETIME: u64 = 60 * 5; // 5 minutes.
pub const REFRESH_LIFETIME: u64 = 60 * 60 * 24; // 1 day.
const JTI_LENGTH: usize = 32;

/// Kind of token, written in the `token_type` claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// Unique token ID.
    pub jti: String,
    pub token_type: TokenType,
}

/// Access token and the refresh token it was derived from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    name: String,
    audience: String,
    access_lifetime: u64,
    refresh_lifetime: u64,
}

fn now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|err| ServerError::Internal {
            details: "system clock is before unix epoch".into(),
            source: Some(Box::new(err)),
        })
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with HMAC-SHA256.
    pub fn new(name: &str, secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_lifetime: ACCESS_LIFETIME,
            refresh_lifetime: REFRESH_LIFETIME,
        }
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Change tokens lifetimes, in seconds.
    pub fn lifetimes(&mut self, access: Option<u64>, refresh: Option<u64>) {
        self.access_lifetime = access.unwrap_or(ACCESS_LIFETIME);
        self.refresh_lifetime = refresh.unwrap_or(REFRESH_LIFETIME);
    }

    fn claims(&self, user_id: &str, token_type: TokenType) -> Result<Claims> {
        let time = now()?;
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };

        Ok(Claims {
            aud: self.audience.clone(),
            exp: time + lifetime,
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_owned(),
            jti: Alphanumeric.sample_string(&mut OsRng, JTI_LENGTH),
            token_type,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(encode(&Header::new(self.algorithm), claims, &self.encoding_key)?)
    }

    /// Issue a refresh token, then the access token derived from it.
    pub fn pair(&self, user_id: &str) -> Result<TokenPair> {
        let refresh = self.claims(user_id, TokenType::Refresh)?;
        let access_token = self.derive_access(&refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Create an access token for the subject of a refresh token.
    pub fn derive_access(&self, refresh: &Claims) -> Result<String> {
        let access = self.claims(&refresh.sub, TokenType::Access)?;
        self.sign(&access)
    }

    /// Decode and check a token of the expected type.
    ///
    /// Any failure is reported as [`ServerError::InvalidToken`].
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| ServerError::InvalidToken)?
            .claims;
        if claims.token_type != expected {
            return Err(ServerError::InvalidToken);
        }

        Ok(claims)
    }
}
