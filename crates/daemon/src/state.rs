use std::time::Duration;
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use common::crypto::{KdfError, KdfParams};
use common::store::{ReplacementPolicy, StoreConfig};

pub const APP_NAME: &str = "q2q";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port the daemon accepts q2q connections on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub kdf: KdfConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub certificates: CertificatesConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_listen_port() -> u16 {
    8788
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            kdf: KdfConfig::default(),
            session: SessionConfig::default(),
            certificates: CertificatesConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Password key derivation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    pub iterations: u32,
    pub memory_kib: u32,
    pub salt_length: usize,
}

impl Default for KdfConfig {
    fn default() -> Self {
        let params = KdfParams::default();
        Self {
            iterations: params.iterations,
            memory_kib: params.memory_kib,
            salt_length: params.salt_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: DAY_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificatesConfig {
    /// What storing a second self-signed certificate for a domain does
    pub replacement_policy: ReplacementPolicy,
    /// Lifetime of certificates the daemon issues or generates
    pub validity_days: u64,
    pub handshake_timeout_secs: u64,
}

impl Default for CertificatesConfig {
    fn default() -> Self {
        Self {
            replacement_policy: ReplacementPolicy::default(),
            validity_days: 365,
            handshake_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing level for the daemon; `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// The store knobs this configuration describes
    pub fn store_config(&self) -> Result<StoreConfig, StateError> {
        Ok(StoreConfig {
            kdf: KdfParams::new(
                self.kdf.iterations,
                self.kdf.memory_kib,
                self.kdf.salt_length,
            )?,
            session_ttl: Duration::from_secs(self.session.ttl_secs),
            replacement_policy: self.certificates.replacement_policy,
            certificate_validity: self.certificate_validity()?,
        })
    }

    pub fn certificate_validity(&self) -> Result<Duration, StateError> {
        self.certificates
            .validity_days
            .checked_mul(DAY_SECS)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                StateError::OutOfRange(format!(
                    "certificates.validity_days = {}",
                    self.certificates.validity_days
                ))
            })
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        self.log
            .level
            .parse()
            .map_err(|_| StateError::OutOfRange(format!("log.level = {:?}", self.log.level)))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.certificates.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the q2q directory (~/.q2q)
    pub q2q_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the q2q directory path (custom or default ~/.q2q)
    pub fn q2q_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new q2q state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let q2q_dir = Self::q2q_dir(custom_path)?;

        if q2q_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        // refuse to write a config that could never load
        config.store_config()?;
        config.log_level()?;

        fs::create_dir_all(&q2q_dir)?;

        let config_path = q2q_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // Create empty database (migrations run on first connect)
        let db_path = q2q_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            q2q_dir,
            db_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the q2q directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let q2q_dir = Self::q2q_dir(custom_path)?;

        if !q2q_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = q2q_dir.join(DB_FILE_NAME);
        let config_path = q2q_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;
        config.store_config()?;
        config.log_level()?;

        Ok(Self {
            q2q_dir,
            db_path,
            config_path,
            config,
        })
    }

    /// sqlite url of the state database
    pub fn database_url(&self) -> Result<url::Url, StateError> {
        url::Url::parse(&format!("sqlite://{}", self.db_path.display()))
            .map_err(|e| StateError::InvalidDatabaseUrl(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("q2q directory not initialized. Run 'q2q init' first")]
    NotInitialized,

    #[error("q2q directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] KdfError),

    #[error("configuration value out of range: {0}")]
    OutOfRange(String),

    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q2q");

        let state = AppState::init(Some(path.clone()), None).unwrap();
        assert!(state.db_path.exists());
        assert!(state.config_path.exists());

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
        assert_eq!(loaded.config.listen_port, 8788);

        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            listen_port = 9000

            [certificates]
            replacement_policy = "replace"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.certificates.replacement_policy, ReplacementPolicy::Replace);
        assert_eq!(config.certificates.validity_days, 365);
        assert_eq!(config.session.ttl_secs, DAY_SECS);

        let store = config.store_config().unwrap();
        assert_eq!(store.kdf, KdfParams::default());
        assert_eq!(store.replacement_policy, ReplacementPolicy::Replace);
    }

    #[test]
    fn test_huge_validity_rejected() {
        let mut config = AppConfig::default();
        config.certificates.validity_days = u64::MAX;
        assert!(matches!(config.store_config(), Err(StateError::OutOfRange(_))));

        config.certificates.validity_days = 365;
        config.session.ttl_secs = u64::MAX;
        let store = config.store_config().unwrap();
        assert_eq!(store.session_ttl, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_log_level() {
        assert_eq!(AppConfig::default().log_level().unwrap(), tracing::Level::INFO);

        let config: AppConfig = toml::from_str(
            r#"
            [log]
            level = "trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level().unwrap(), tracing::Level::TRACE);

        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.log.level = "chatty".to_string();
        assert!(matches!(config.log_level(), Err(StateError::OutOfRange(_))));
        assert!(matches!(
            AppState::init(Some(dir.path().join("q2q")), Some(config)),
            Err(StateError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_invalid_salt_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.kdf.salt_length = 4;
        assert!(matches!(
            AppState::init(Some(dir.path().join("q2q")), Some(config)),
            Err(StateError::InvalidConfig(_))
        ));
    }
}
