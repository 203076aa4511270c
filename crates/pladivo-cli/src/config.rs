//! Configuration file management for pladivo.
//!
//! Provides a TOML-based config file at `~/.config/pladivo/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use pladivo_core::auth::TokenConfig;
use pladivo_core::contract::ContractSettings;
use pladivo_core::notify::{DEFAULT_MAX_ATTEMPTS, OutboxConfig};
use pladivo_core::payment::BankAccount;
use pladivo_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub sepay: SepaySection,
    #[serde(default)]
    pub bank: BankAccount,
    #[serde(default)]
    pub email: EmailSection,
    #[serde(default)]
    pub outbox: OutboxSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    DbConfig::DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout_secs() -> u64 {
    DbConfig::DEFAULT_ACQUIRE_TIMEOUT.as_secs()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token secret (64 hex chars = 32 bytes).
    pub token_secret: String,
}

/// The key Sepay sends as `Authorization: Apikey <key>`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SepaySection {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSection {
    /// JSON send endpoint. Emails are only logged when unset.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub max_attempts: i32,
}

impl Default for EmailSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from: "Pladivo <no-reply@pladivo.vn>".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSection {
    pub poll_interval_secs: u64,
    pub batch_size: i64,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub lease_secs: u64,
}

impl Default for OutboxSection {
    fn default() -> Self {
        let defaults = OutboxConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            batch_size: defaults.batch_size,
            base_backoff_secs: defaults.base_backoff.as_secs(),
            max_backoff_secs: defaults.max_backoff.as_secs(),
            lease_secs: defaults.lease.as_secs(),
        }
    }
}

impl From<&OutboxSection> for OutboxConfig {
    fn from(section: &OutboxSection) -> Self {
        Self {
            poll_interval: Duration::from_secs(section.poll_interval_secs.max(1)),
            batch_size: section.batch_size.max(1),
            base_backoff: Duration::from_secs(section.base_backoff_secs),
            max_backoff: Duration::from_secs(section.max_backoff_secs),
            lease: Duration::from_secs(section.lease_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the pladivo config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/pladivo` or `~/.config/pladivo`.
/// The platform-specific `dirs::config_dir()` is ignored (it returns
/// `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pladivo");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("pladivo")
}

/// Return the path to the pladivo config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Secret generation
// -----------------------------------------------------------------------

fn random_hex(len_bytes: usize) -> String {
    use rand::Rng;
    let mut bytes = vec![0u8; len_bytes];
    rand::rng().fill(bytes.as_mut_slice());
    hex::encode(bytes)
}

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    random_hex(32)
}

/// Generate a webhook API key to paste into the Sepay dashboard.
pub fn generate_api_key() -> String {
    random_hex(24)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PladivoConfig {
    pub db_config: DbConfig,
    pub token_config: TokenConfig,
    /// `None` when neither env nor file provides a key.
    pub sepay_api_key: Option<String>,
    pub contract: ContractSettings,
    pub email: EmailSection,
    pub outbox: OutboxConfig,
    pub server: ServerSection,
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl PladivoConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `PLADIVO_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Token secret: `PLADIVO_TOKEN_SECRET` > `auth.token_secret` (hex-decoded) > error
    /// - Sepay key: `PLADIVO_SEPAY_API_KEY` > `sepay.api_key`
    /// - Email key: `PLADIVO_EMAIL_API_KEY` > `email.api_key`
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Some(url) = env_non_empty("PLADIVO_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let (max_connections, acquire_timeout) = file_config.as_ref().map_or(
            (DbConfig::DEFAULT_MAX_CONNECTIONS, DbConfig::DEFAULT_ACQUIRE_TIMEOUT),
            |c| {
                (
                    c.database.max_connections,
                    Duration::from_secs(c.database.acquire_timeout_secs),
                )
            },
        );
        let db_config = DbConfig::new(db_url)
            .with_max_connections(max_connections)
            .with_acquire_timeout(acquire_timeout);

        let token_config = if let Some(secret_hex) = env_non_empty("PLADIVO_TOKEN_SECRET") {
            let bytes = hex::decode(&secret_hex)
                .context("PLADIVO_TOKEN_SECRET env var is not valid hex")?;
            TokenConfig::new(bytes)
        } else if let Some(ref cfg) = file_config {
            let bytes = hex::decode(&cfg.auth.token_secret)
                .context("invalid hex in config file token_secret")?;
            TokenConfig::new(bytes)
        } else {
            bail!(
                "token secret not found; set PLADIVO_TOKEN_SECRET or run `pladivo init` to create a config file"
            );
        };

        let sepay_api_key = env_non_empty("PLADIVO_SEPAY_API_KEY").or_else(|| {
            file_config
                .as_ref()
                .map(|c| c.sepay.api_key.clone())
                .filter(|k| !k.trim().is_empty())
        });

        let (bank, mut email, outbox, server) = match file_config {
            Some(cfg) => (cfg.bank, cfg.email, OutboxConfig::from(&cfg.outbox), cfg.server),
            None => (
                BankAccount::default(),
                EmailSection::default(),
                OutboxConfig::default(),
                ServerSection::default(),
            ),
        };
        if let Some(key) = env_non_empty("PLADIVO_EMAIL_API_KEY") {
            email.api_key = Some(key);
        }

        Ok(Self {
            db_config,
            token_config,
            sepay_api_key,
            contract: ContractSettings {
                bank,
                email_max_attempts: email.max_attempts.max(1),
            },
            email,
            outbox,
            server,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55";

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Point config lookup at an empty temp dir for the guard's lifetime.
    struct IsolatedConfigDir {
        _tmp: tempfile::TempDir,
        orig_xdg: Option<String>,
    }

    impl IsolatedConfigDir {
        fn new() -> Self {
            let tmp = tempfile::TempDir::new().unwrap();
            let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
            unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
            Self {
                _tmp: tmp,
                orig_xdg,
            }
        }
    }

    impl Drop for IsolatedConfigDir {
        fn drop(&mut self) {
            match self.orig_xdg.take() {
                Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
                None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
            }
        }
    }

    fn clear_env() {
        for var in [
            "PLADIVO_DATABASE_URL",
            "PLADIVO_TOKEN_SECRET",
            "PLADIVO_SEPAY_API_KEY",
            "PLADIVO_EMAIL_API_KEY",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    fn sample_config() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://filehost:5432/filedb".to_string(),
                max_connections: 4,
                acquire_timeout_secs: 3,
            },
            auth: AuthSection {
                token_secret: "bb".repeat(32),
            },
            sepay: SepaySection {
                api_key: "file-sepay-key".to_string(),
            },
            bank: BankAccount {
                account_number: "0123456789".to_string(),
                account_name: "CONG TY PLADIVO".to_string(),
                ..Default::default()
            },
            email: EmailSection::default(),
            outbox: OutboxSection::default(),
            server: ServerSection::default(),
        }
    }

    #[test]
    fn generate_token_secret_is_64_hex_chars() {
        let secret = generate_token_secret();
        assert_eq!(secret.len(), 64);
        assert!(
            secret.chars().all(|c| c.is_ascii_hexdigit()),
            "expected all hex digits, got: {secret}"
        );
        assert_ne!(secret, generate_token_secret());
    }

    #[test]
    fn generate_api_key_is_48_hex_chars() {
        assert_eq!(generate_api_key().len(), 48);
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            [database]
            url = "postgresql://h:5432/db"

            [auth]
            token_secret = "00"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.database.max_connections, DbConfig::DEFAULT_MAX_CONNECTIONS);
        assert_eq!(cfg.database.acquire_timeout_secs, 10);
        assert_eq!(cfg.bank.bank_id, "MB");
        assert_eq!(cfg.email.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(cfg.outbox.base_backoff_secs, 30);
        assert_eq!(cfg.server.port, 3000);
        assert!(cfg.sepay.api_key.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_0600_and_roundtrips() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let _dir = IsolatedConfigDir::new();

        save_config(&sample_config()).unwrap();

        let meta = std::fs::metadata(config_path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        let loaded = load_config().unwrap();
        assert_eq!(loaded.database.url, "postgresql://filehost:5432/filedb");
        assert_eq!(loaded.bank.account_number, "0123456789");
        assert_eq!(loaded.sepay.api_key, "file-sepay-key");
    }

    #[test]
    fn resolve_reads_config_file() {
        let _lock = lock_env();
        let _dir = IsolatedConfigDir::new();
        clear_env();
        save_config(&sample_config()).unwrap();

        let config = PladivoConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://filehost:5432/filedb");
        assert_eq!(config.db_config.max_connections, 4);
        assert_eq!(config.db_config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(config.token_config.secret, vec![0xbb; 32]);
        assert_eq!(config.sepay_api_key.as_deref(), Some("file-sepay-key"));
        assert_eq!(config.contract.bank.account_name, "CONG TY PLADIVO");
        assert!(config.email.api_key.is_none());
    }

    #[test]
    fn resolve_env_overrides_file_and_cli_overrides_env() {
        let _lock = lock_env();
        let _dir = IsolatedConfigDir::new();
        clear_env();
        save_config(&sample_config()).unwrap();

        unsafe { std::env::set_var("PLADIVO_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var("PLADIVO_TOKEN_SECRET", SECRET) };
        unsafe { std::env::set_var("PLADIVO_SEPAY_API_KEY", "env-sepay-key") };
        unsafe { std::env::set_var("PLADIVO_EMAIL_API_KEY", "env-email-key") };

        let config = PladivoConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.token_config.secret, hex::decode(SECRET).unwrap());
        assert_eq!(config.sepay_api_key.as_deref(), Some("env-sepay-key"));
        assert_eq!(config.email.api_key.as_deref(), Some("env-email-key"));

        let config = PladivoConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        clear_env();
    }

    #[test]
    fn resolve_defaults_when_only_secret_is_set() {
        let _lock = lock_env();
        let _dir = IsolatedConfigDir::new();
        clear_env();
        unsafe { std::env::set_var("PLADIVO_TOKEN_SECRET", SECRET) };

        let config = PladivoConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert!(config.sepay_api_key.is_none());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.outbox.batch_size, OutboxConfig::default().batch_size);

        clear_env();
    }

    #[test]
    fn resolve_errors_when_no_token_secret() {
        let _lock = lock_env();
        let _dir = IsolatedConfigDir::new();
        clear_env();

        let result = PladivoConfig::resolve(Some("postgresql://localhost:5432/pladivo"));
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("token secret not found"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _lock = lock_env();
        let _dir = IsolatedConfigDir::new();
        assert!(config_path().ends_with("pladivo/config.toml"));
    }
}
