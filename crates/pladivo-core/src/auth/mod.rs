//! Bearer token issuance and validation for API callers.
//!
//! Tokens are HMAC-SHA256 based, scoped to a (role, subject) pair.
//! Format: `pladivo_st_<role>_<subject>_<hmac_hex>`

pub mod guard;

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token prefix used to identify pladivo API tokens.
const TOKEN_PREFIX: &str = "pladivo_st_";

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid role in token: {0}")]
    InvalidRole(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing token secret")]
    MissingSecret,
}

/// Who a token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Staff,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Staff => "staff",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            "customer" => Ok(Self::Customer),
            other => Err(TokenError::InvalidRole(other.to_string())),
        }
    }
}

/// Configuration for token generation and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// The HMAC secret key bytes.
    pub secret: Vec<u8>,
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Create a TokenConfig from the `PLADIVO_TOKEN_SECRET` environment
    /// variable (hex-encoded, as written by `pladivo init`).
    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex =
            std::env::var("PLADIVO_TOKEN_SECRET").map_err(|_| TokenError::MissingSecret)?;
        let secret = hex::decode(&secret_hex).map_err(|e| {
            TokenError::InvalidFormat(format!("PLADIVO_TOKEN_SECRET is not valid hex: {e}"))
        })?;
        Ok(Self::new(secret))
    }
}

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    pub role: Role,
    /// Staff, manager or customer identifier. May contain underscores.
    pub subject: String,
}

/// Issue a token for `subject` acting as `role`.
///
/// The HMAC is computed over `<role>:<subject>`.
pub fn generate_token(config: &TokenConfig, role: Role, subject: &str) -> String {
    let message = format!("{role}:{subject}");
    let mac = compute_hmac(&config.secret, message.as_bytes());
    let hmac_hex = hex::encode(mac);
    format!("{TOKEN_PREFIX}{role}_{subject}_{hmac_hex}")
}

/// Validate a token and extract its claims.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<TokenClaims, TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        TokenError::InvalidFormat("token must start with 'pladivo_st_'".to_string())
    })?;

    let (role_str, rest) = rest
        .split_once('_')
        .ok_or_else(|| TokenError::InvalidFormat("expected underscore after role".to_string()))?;
    let role: Role = role_str.parse()?;

    // The subject may itself contain underscores; the HMAC never does.
    let (subject, hmac_hex) = rest.rsplit_once('_').ok_or_else(|| {
        TokenError::InvalidFormat("expected underscore between subject and hmac".to_string())
    })?;
    if subject.is_empty() {
        return Err(TokenError::InvalidFormat("empty subject".to_string()));
    }

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    let message = format!("{role}:{subject}");
    verify_hmac_constant_time(&config.secret, message.as_bytes(), &provided_mac)?;

    Ok(TokenClaims {
        role,
        subject: subject.to_string(),
    })
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size")
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Verify HMAC using the `hmac` crate's constant-time `verify_slice`.
fn verify_hmac_constant_time(
    key: &[u8],
    message: &[u8],
    expected_mac: &[u8],
) -> Result<(), TokenError> {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.verify_slice(expected_mac)
        .map_err(|_| TokenError::HmacMismatch)
}

/// Compare two secrets without leaking their common prefix length.
///
/// Both sides are MACed under a fixed key and the digests compared with
/// `verify_slice`, so the comparison time does not depend on where the
/// inputs first differ.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    const KEY: &[u8] = b"pladivo-secret-compare";
    let expected_mac = compute_hmac(KEY, expected.as_bytes());
    verify_hmac_constant_time(KEY, provided.as_bytes(), &expected_mac).is_ok()
}
