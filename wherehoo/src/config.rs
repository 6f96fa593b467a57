//! INI configuration file.
//!
//! Lives at `<config dir>/wherehoo/config.ini` by default:
//!
//! ```ini
//! [server]
//! listen = 0.0.0.0:5650
//! idle_timeout = 200
//! data_timeout = 30
//!
//! [limits]
//! max_identity = 10
//! max_meta = 1024
//! max_data = 65535
//! record_min_life = 12
//! max_ttl = 99999999
//!
//! [logging]
//! level = info
//! directory = /var/log/wherehoo
//!
//! [identities]
//! alice = secret
//!
//! [protocols]
//! names = HTTP, FTP
//! ```
//!
//! Durations are whole seconds. Missing keys take their defaults.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::protocol::SessionLimits;
use crate::server::ServerConfig;
use crate::store::MemoryStore;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PROTOCOLS: &[&str] = &["HTTP"];

/// Errors from reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wherehoo")
        .join("config.ini")
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `wherehoo=debug`.
    pub level: String,
    /// Directory for daily log files; stdout only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub logging: LoggingSettings,
    /// Identity -> signing secret.
    pub identities: BTreeMap<String, String>,
    pub protocols: Vec<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingSettings::default(),
            identities: BTreeMap::new(),
            protocols: DEFAULT_PROTOCOLS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ConfigFile {
    /// Loads the default file, or defaults when it does not exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            other => ConfigError::Parse {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;
        Self::from_ini(&ini)
    }

    /// Writes to the default location, creating its directory.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_file_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut limits = defaults.server.limits.clone();

        let server = Section::new(ini, "server");
        let listen = server.parse("listen", defaults.server.listen)?;
        limits.idle_timeout = server.seconds("idle_timeout", limits.idle_timeout)?;
        limits.data_timeout = server.seconds("data_timeout", limits.data_timeout)?;

        let section = Section::new(ini, "limits");
        limits.max_identity_len = section.parse("max_identity", limits.max_identity_len)?;
        limits.max_meta_len = section.parse("max_meta", limits.max_meta_len)?;
        limits.max_data_len = section.parse("max_data", limits.max_data_len)?;
        limits.record_min_life = section.seconds("record_min_life", limits.record_min_life)?;
        limits.max_ttl = section.parse("max_ttl", limits.max_ttl)?;

        let logging = Section::new(ini, "logging");
        let logging = LoggingSettings {
            level: logging
                .get("level")
                .map(str::to_string)
                .unwrap_or(defaults.logging.level),
            directory: logging.get("directory").map(PathBuf::from),
        };

        let identities = ini
            .section(Some("identities"))
            .map(|props| {
                props
                    .iter()
                    .map(|(id, secret)| (id.to_lowercase(), secret.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let protocols = match Section::new(ini, "protocols").get("names") {
            Some(names) => names
                .split(',')
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
            None => defaults.protocols,
        };

        Ok(Self {
            server: ServerConfig::default()
                .with_listen(listen)
                .with_limits(limits),
            logging,
            identities,
            protocols,
        })
    }

    pub fn to_ini(&self) -> Ini {
        let limits = &self.server.limits;
        let mut ini = Ini::new();
        ini.with_section(Some("server"))
            .set("listen", self.server.listen.to_string())
            .set("idle_timeout", limits.idle_timeout.as_secs().to_string())
            .set("data_timeout", limits.data_timeout.as_secs().to_string());
        ini.with_section(Some("limits"))
            .set("max_identity", limits.max_identity_len.to_string())
            .set("max_meta", limits.max_meta_len.to_string())
            .set("max_data", limits.max_data_len.to_string())
            .set("record_min_life", limits.record_min_life.as_secs().to_string())
            .set("max_ttl", limits.max_ttl.to_string());

        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str());
        if let Some(dir) = &self.logging.directory {
            ini.with_section(Some("logging"))
                .set("directory", dir.display().to_string());
        }

        for (id, secret) in &self.identities {
            ini.with_section(Some("identities"))
                .set(id.as_str(), secret.as_str());
        }
        ini.with_section(Some("protocols"))
            .set("names", self.protocols.join(", "));
        ini
    }

    /// Session limits with the configured values.
    pub fn limits(&self) -> &SessionLimits {
        &self.server.limits
    }

    /// In-memory store seeded with the configured identities and protocols.
    pub fn build_store(&self) -> MemoryStore {
        let store = MemoryStore::new();
        for (id, secret) in &self.identities {
            store.add_identity(id, secret.as_bytes());
        }
        for protocol in &self.protocols {
            store.add_protocol(protocol);
        }
        store
    }
}

/// Typed lookups within one INI section.
struct Section<'a> {
    name: &'static str,
    props: Option<&'a ini::Properties>,
}

impl<'a> Section<'a> {
    fn new(ini: &'a Ini, name: &'static str) -> Self {
        Self {
            name,
            props: ini.section(Some(name)),
        }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.props
            .and_then(|p| p.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                section: self.name,
                key,
                value: raw.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn seconds(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_secs()).map(Duration::from_secs)
    }
}
