//! `pladivo token` commands: issue bearer tokens for API callers.

use anyhow::Result;

use pladivo_core::auth::{Role, TokenConfig, generate_token};

/// Print a token for `subject` acting as `role`.
pub fn run_issue(config: &TokenConfig, role: Role, subject: &str) -> Result<()> {
    let subject = subject.trim();
    if subject.is_empty() {
        anyhow::bail!("subject must not be empty");
    }

    let token = generate_token(config, role, subject);
    tracing::info!(%role, subject, "token issued");
    println!("{token}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use pladivo_core::auth::validate_token;

    use super::*;

    #[test]
    fn empty_subject_is_rejected() {
        let config = TokenConfig::new(b"cli-secret".to_vec());
        assert!(run_issue(&config, Role::Staff, "  ").is_err());
    }

    #[test]
    fn issued_token_validates() {
        let config = TokenConfig::new(b"cli-secret".to_vec());
        run_issue(&config, Role::Manager, "mgr-7").unwrap();
        let token = generate_token(&config, Role::Manager, "mgr-7");
        assert_eq!(validate_token(&config, &token).unwrap().subject, "mgr-7");
    }
}
