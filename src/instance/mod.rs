//! Local PostgreSQL instance management.
//!
//! Layout:
//! - `binaries.rs`: executable discovery and the opt-in distribution fetch
//! - `datadir.rs`: data directory marker check, `initdb`, config files
//! - `probe.rs`: TCP and driver-level reachability checks
//! - `lifecycle.rs`: `pg_ctl` start/stop and readiness polling

pub mod binaries;
pub mod datadir;
pub mod lifecycle;
pub mod probe;

use crate::config::PostgresConfig;
use crate::db::provision::{self, ProvisionReport};
use crate::error::SetupError;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Database every PostgreSQL cluster ships with; used for administrative work.
pub const ADMIN_DATABASE: &str = "postgres";

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub bin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub max_connections: u32,
    pub shared_buffers: String,
}

impl From<&PostgresConfig> for InstanceConfig {
    fn from(cfg: &PostgresConfig) -> Self {
        Self {
            bin_dir: cfg.binary_dir.join("bin"),
            data_dir: cfg.data_dir.clone(),
            host: cfg.host.clone(),
            port: cfg.port,
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            database: cfg.database.to_lowercase(),
            schema: cfg.schema.to_lowercase(),
            table: cfg.table.to_lowercase(),
            max_connections: cfg.max_connections,
            shared_buffers: cfg.shared_buffers.clone(),
        }
    }
}

impl InstanceConfig {
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
            .ssl_mode(PgSslMode::Disable)
    }

    pub fn admin_connect_options(&self) -> PgConnectOptions {
        self.connect_options(ADMIN_DATABASE)
    }

    pub fn target_connect_options(&self) -> PgConnectOptions {
        self.connect_options(&self.database)
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("log.txt")
    }
}

/// Outcome of [`InstanceManager::is_running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotRunning,
    /// Something answers on the port but rejected the current password.
    AuthFailed,
    Reachable,
}

impl RunState {
    pub fn is_running(self) -> bool {
        !matches!(self, RunState::NotRunning)
    }

    pub fn needs_password(self) -> bool {
        matches!(self, RunState::AuthFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPhase {
    Tcp,
    Ping,
}

impl fmt::Display for ReadinessPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessPhase::Tcp => f.write_str("port never accepted connections"),
            ReadinessPhase::Ping => f.write_str("database never answered ping"),
        }
    }
}

/// Filesystem half of the provisioning state, recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalState {
    pub binaries_present: bool,
    pub data_dir_initialized: bool,
}

pub struct InstanceManager {
    config: InstanceConfig,
    readiness_attempts: usize,
    binary_source: Option<(Url, PathBuf)>,
}

impl InstanceManager {
    pub fn new(config: InstanceConfig, readiness_attempts: usize) -> Self {
        Self {
            config,
            readiness_attempts: readiness_attempts.max(1),
            binary_source: None,
        }
    }

    /// Allow `initialize` to download the distribution into `binary_root`
    /// when executables are missing.
    pub fn with_binary_fetch(mut self, url: Url, binary_root: PathBuf) -> Self {
        self.binary_source = Some((url, binary_root));
        self
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.config.password = password.into();
    }

    pub fn local_state(&self) -> LocalState {
        LocalState {
            binaries_present: binaries::missing_binaries(&self.config.bin_dir).is_empty(),
            data_dir_initialized: datadir::is_initialized(&self.config.data_dir),
        }
    }

    /// Verify binaries and make sure the data directory holds a cluster.
    pub async fn initialize(&self) -> Result<(), SetupError> {
        info!("Starting setup process");

        if let Some((url, root)) = &self.binary_source
            && !binaries::missing_binaries(&self.config.bin_dir).is_empty()
        {
            binaries::fetch_binaries(url, root).await?;
        }
        binaries::check_binaries(&self.config.bin_dir)?;
        info!(bin_dir = %self.config.bin_dir.display(), "Found required files");

        if datadir::is_initialized(&self.config.data_dir) {
            info!(data_dir = %self.config.data_dir.display(), "Using existing database directory");
            return Ok(());
        }

        info!(data_dir = %self.config.data_dir.display(), "Initializing new database");
        std::fs::create_dir_all(&self.config.data_dir).map_err(|e| {
            SetupError::DirectoryInitFailed {
                reason: format!("failed to create data directory: {e}"),
                output: String::new(),
            }
        })?;
        datadir::init_data_directory(&self.config).await?;
        info!("Database initialization complete");
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SetupError> {
        lifecycle::start(&self.config, self.readiness_attempts).await
    }

    pub async fn stop(&self) -> Result<(), SetupError> {
        lifecycle::stop(&self.config).await
    }

    pub async fn is_running(&self) -> Result<RunState, SetupError> {
        probe::is_running(&self.config).await
    }

    pub async fn provision_schema(
        &self,
        settle_delay: Duration,
    ) -> Result<ProvisionReport, SetupError> {
        provision::provision_schema(&self.config, settle_delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_config_derives_paths_and_lowercases_names() {
        let mut pg = PostgresConfig::default();
        pg.database = "RadiumTest".to_string();
        let cfg = InstanceConfig::from(&pg);

        assert_eq!(cfg.bin_dir, PathBuf::from("./postgres_files/bin"));
        assert_eq!(cfg.log_file(), PathBuf::from("./postgres_data/log.txt"));
        assert_eq!(cfg.database, "radiumtest");
        assert_eq!(cfg.target_connect_options().get_database(), Some("radiumtest"));
        assert_eq!(cfg.admin_connect_options().get_database(), Some(ADMIN_DATABASE));
        assert_eq!(cfg.admin_connect_options().get_port(), 8060);
    }

    #[test]
    fn set_password_is_threaded_into_connections() {
        let mut manager = InstanceManager::new(InstanceConfig::from(&PostgresConfig::default()), 3);
        manager.set_password("s3cret");
        assert_eq!(manager.config().password, "s3cret");
    }

    #[test]
    fn run_state_flags() {
        assert!(!RunState::NotRunning.is_running());
        assert!(RunState::AuthFailed.is_running());
        assert!(RunState::AuthFailed.needs_password());
        assert!(!RunState::Reachable.needs_password());
    }

    #[test]
    fn local_state_reports_missing_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pg = PostgresConfig::default();
        pg.binary_dir = dir.path().join("dist");
        pg.data_dir = dir.path().join("data");
        let manager = InstanceManager::new(InstanceConfig::from(&pg), 1);

        assert_eq!(
            manager.local_state(),
            LocalState {
                binaries_present: false,
                data_dir_initialized: false,
            }
        );
    }

    #[tokio::test]
    async fn initialize_without_binaries_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pg = PostgresConfig::default();
        pg.binary_dir = dir.path().join("dist");
        pg.data_dir = dir.path().join("data");
        let manager = InstanceManager::new(InstanceConfig::from(&pg), 1);

        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, SetupError::MissingBinaries { ref missing, .. } if missing.len() == 2));
        assert!(!pg.data_dir.exists());
    }
}
