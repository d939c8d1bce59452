//! Runtime configuration.
//!
//! Every value has a compiled-in default; environment variables prefixed with
//! `PACSDB_` override them, with `__` separating nested sections
//! (e.g. `PACSDB_POSTGRES__PORT=5433`, `PACSDB_ARCHIVE__URL=http://pacs:8042`).

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "PACSDB_";

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: failed to load configuration"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loglevel: String,
    pub postgres: PostgresConfig,
    pub provisioning: ProvisioningConfig,
    pub archive: ArchiveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            postgres: PostgresConfig::default(),
            provisioning: ProvisioningConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub version: String,
    /// Root of the binary distribution; executables live in `<binary_dir>/bin`.
    pub binary_dir: PathBuf,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Default credential, used for fresh instances and as the first guess.
    pub password: String,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub max_connections: u32,
    pub shared_buffers: String,
    /// Download the distribution from `binary_url` when binaries are missing.
    pub fetch_binaries: bool,
    pub binary_url: Url,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            version: "15.5".to_string(),
            binary_dir: PathBuf::from("./postgres_files"),
            data_dir: PathBuf::from("./postgres_data"),
            host: "localhost".to_string(),
            port: 8060,
            user: "postgres".to_string(),
            password: "password".to_string(),
            database: "radiumtest".to_string(),
            schema: "radiumtest".to_string(),
            table: "pacs".to_string(),
            max_connections: 100,
            shared_buffers: "128MB".to_string(),
            fetch_binaries: false,
            binary_url: Url::parse(
                "https://get.enterprisedb.com/postgresql/postgresql-15.5-1-windows-x64-binaries.zip",
            )
            .expect("default binary url is valid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Attempts per readiness phase, one per second.
    pub readiness_attempts: usize,
    /// Total schema provisioning attempts.
    pub attempts: usize,
    pub retry_delay_secs: u64,
    /// Pause after `CREATE DATABASE` before reconnecting.
    pub settle_delay_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            readiness_attempts: 10,
            attempts: 3,
            retry_delay_secs: 2,
            settle_delay_secs: 5,
        }
    }
}

impl ProvisioningConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub url: Url,
    pub username: String,
    pub password: String,
    pub study_instance_uid: String,
    pub output: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:8042").expect("default archive url is valid"),
            username: "admin".to_string(),
            password: "password".to_string(),
            study_instance_uid: "1.3.12.2.1107.5.1.7.107889.30000024081417115758500000006"
                .to_string(),
            output: PathBuf::from("study.zip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_compiled_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.postgres.port, 8060);
        assert_eq!(cfg.postgres.user, "postgres");
        assert_eq!(cfg.postgres.database, "radiumtest");
        assert_eq!(cfg.postgres.data_dir, PathBuf::from("./postgres_data"));
        assert!(!cfg.postgres.fetch_binaries);
        assert_eq!(cfg.provisioning.attempts, 3);
        assert_eq!(cfg.archive.url.as_str(), "http://localhost:8042/");
    }

    #[test]
    fn env_overrides_nested_sections() {
        Jail::expect_with(|jail| {
            jail.set_env("PACSDB_LOGLEVEL", "debug");
            jail.set_env("PACSDB_POSTGRES__PORT", "5433");
            jail.set_env("PACSDB_POSTGRES__DATA_DIR", "/var/lib/pacs");
            jail.set_env("PACSDB_ARCHIVE__URL", "http://pacs.internal:8042/orthanc");

            let cfg = Config::load()?;
            assert_eq!(cfg.loglevel, "debug");
            assert_eq!(cfg.postgres.port, 5433);
            assert_eq!(cfg.postgres.data_dir, PathBuf::from("/var/lib/pacs"));
            assert_eq!(cfg.postgres.user, "postgres");
            assert_eq!(cfg.archive.url.path(), "/orthanc");
            Ok(())
        });
    }
}
