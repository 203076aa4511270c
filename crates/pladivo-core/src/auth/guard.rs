//! Request guards: bearer tokens for the API, an API key for the gateway.

use super::{Role, TokenClaims, TokenConfig, TokenError, secrets_match, validate_token};

/// Errors from guard checks.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("missing credentials")]
    Missing,

    #[error("unsupported authorization scheme")]
    WrongScheme,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("role {actual} may not perform this action")]
    Forbidden { actual: Role },

    #[error("API key mismatch")]
    KeyMismatch,
}

/// Split `<scheme> <credentials>` and check the scheme case-insensitively.
fn credentials<'a>(header: Option<&'a str>, scheme: &str) -> Result<&'a str, GuardError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty());
    let header = header.ok_or(GuardError::Missing)?;
    let (got, value) = header.split_once(' ').ok_or(GuardError::WrongScheme)?;
    if !got.eq_ignore_ascii_case(scheme) {
        return Err(GuardError::WrongScheme);
    }
    Ok(value.trim())
}

/// Validate an `Authorization: Bearer <token>` header value.
pub fn require_bearer(config: &TokenConfig, header: Option<&str>) -> Result<TokenClaims, GuardError> {
    let token = credentials(header, "Bearer")?;
    Ok(validate_token(config, token)?)
}

/// Require one of `allowed` roles.
pub fn require_role(claims: &TokenClaims, allowed: &[Role]) -> Result<(), GuardError> {
    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            actual: claims.role,
        })
    }
}

/// Check a gateway `Authorization: Apikey <key>` header value against the
/// configured key.
pub fn require_api_key(expected: &str, header: Option<&str>) -> Result<(), GuardError> {
    let provided = credentials(header, "Apikey")?;
    if secrets_match(expected, provided) {
        Ok(())
    } else {
        Err(GuardError::KeyMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::super::generate_token;
    use super::*;

    fn config() -> TokenConfig {
        TokenConfig::new(b"guard-test-secret".to_vec())
    }

    #[test]
    fn bearer_accepts_valid_token() {
        let token = generate_token(&config(), Role::Manager, "mgr-1");
        let claims = require_bearer(&config(), Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.subject, "mgr-1");

        let lower = require_bearer(&config(), Some(&format!("bearer {token}"))).unwrap();
        assert_eq!(lower, claims);
    }

    #[test]
    fn bearer_rejects_missing_and_wrong_scheme() {
        assert!(matches!(require_bearer(&config(), None), Err(GuardError::Missing)));
        assert!(matches!(require_bearer(&config(), Some("  ")), Err(GuardError::Missing)));
        assert!(matches!(
            require_bearer(&config(), Some("Basic abc")),
            Err(GuardError::WrongScheme)
        ));
        assert!(matches!(
            require_bearer(&config(), Some("Bearer pladivo_st_staff_x_00")),
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[test]
    fn role_guard() {
        let staff = TokenClaims {
            role: Role::Staff,
            subject: "s".into(),
        };
        assert!(require_role(&staff, &[Role::Staff, Role::Manager]).is_ok());
        assert!(matches!(
            require_role(&staff, &[Role::Manager]),
            Err(GuardError::Forbidden { actual: Role::Staff })
        ));
    }

    #[test]
    fn api_key_header() {
        assert!(require_api_key("k-123", Some("Apikey k-123")).is_ok());
        assert!(require_api_key("k-123", Some("APIKEY k-123")).is_ok());
        assert!(matches!(
            require_api_key("k-123", Some("Apikey k-124")),
            Err(GuardError::KeyMismatch)
        ));
        assert!(matches!(
            require_api_key("k-123", Some("Bearer k-123")),
            Err(GuardError::WrongScheme)
        ));
        assert!(matches!(require_api_key("k-123", None), Err(GuardError::Missing)));
    }
}
