//! Configuration types.
//!
//! The CLI normally assembles a [`Config`] straight from its flags, but the
//! same structure can be loaded from a YAML file for embedding callers.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgresql,
    Mysql,
    Mariadb,
}

impl Backend {
    /// Default server port for this backend.
    #[must_use]
    pub fn default_port(&self) -> u16 {
        match self {
            Backend::Postgresql => 5432,
            Backend::Mysql | Backend::Mariadb => 3306,
        }
    }

    /// Backend name as reported in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgresql => "postgresql",
            Backend::Mysql => "mysql",
            Backend::Mariadb => "mariadb",
        }
    }
}

impl FromStr for Backend {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Backend::Postgresql),
            "mysql" => Ok(Backend::Mysql),
            "mariadb" => Ok(Backend::Mariadb),
            other => Err(MigrateError::Config(format!(
                "Unsupported database backend: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Backend type.
    pub backend: Backend,

    /// Database host (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port; backend default when unset.
    #[serde(default)]
    pub port: Option<u16>,

    /// Username (default: "candlepin").
    #[serde(default = "default_user")]
    pub user: String,

    /// Password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Database name (default: "candlepin").
    #[serde(default = "default_database")]
    pub database: String,
}

impl DbConfig {
    /// The port to connect to, falling back to the backend default.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.backend.default_port())
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings.
    pub database: DbConfig,

    /// Archive file to export to or import from (default: "export.zip").
    #[serde(default = "default_archive")]
    pub archive: PathBuf,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_user() -> String {
    "candlepin".to_string()
}

fn default_database() -> String {
    "candlepin".to_string()
}

fn default_archive() -> PathBuf {
    PathBuf::from("export.zip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("postgresql".parse::<Backend>().unwrap(), Backend::Postgresql);
        assert_eq!("postgres".parse::<Backend>().unwrap(), Backend::Postgresql);
        assert_eq!("MariaDB".parse::<Backend>().unwrap(), Backend::Mariadb);
        assert!("oracle".parse::<Backend>().is_err());
    }

    #[test]
    fn test_yaml_defaults() {
        let config: Config = serde_yaml::from_str(
            "database:\n  backend: postgresql\n  password: sekrit\n",
        )
        .unwrap();

        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port(), 5432);
        assert_eq!(config.database.user, "candlepin");
        assert_eq!(config.database.database, "candlepin");
        assert_eq!(config.archive, PathBuf::from("export.zip"));
    }

    #[test]
    fn test_password_not_serialized() {
        let config = DbConfig {
            backend: Backend::Mysql,
            host: "db.example.com".into(),
            port: None,
            user: "candlepin".into(),
            password: "super_secret".into(),
            database: "candlepin".into(),
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("super_secret"), "password was serialized: {}", yaml);
    }
}
