use super::InstanceConfig;
use super::binaries::executable;
use crate::error::SetupError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Written by `initdb`; its presence alone means "already initialized".
pub const MARKER_FILE: &str = "PG_VERSION";

pub const HBA_CONF: &str = "\
# TYPE  DATABASE        USER            ADDRESS                 METHOD
local   all             all                                     md5
host    all             all             127.0.0.1/32            md5
host    all             all             ::1/128                 md5
";

pub fn is_initialized(data_dir: &Path) -> bool {
    data_dir.join(MARKER_FILE).is_file()
}

pub fn postgresql_conf(config: &InstanceConfig) -> String {
    format!(
        "port = {}\nlisten_addresses = '*'\nmax_connections = {}\nshared_buffers = {}\n",
        config.port, config.max_connections, config.shared_buffers
    )
}

/// Write `contents` readable only by the owner.
pub fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

pub fn write_postgresql_conf(config: &InstanceConfig) -> io::Result<PathBuf> {
    let path = config.data_dir.join("postgresql.conf");
    write_private(&path, postgresql_conf(config).as_bytes())?;
    Ok(path)
}

pub fn write_hba_conf(data_dir: &Path) -> io::Result<PathBuf> {
    let path = data_dir.join("pg_hba.conf");
    write_private(&path, HBA_CONF.as_bytes())?;
    Ok(path)
}

/// Run `initdb` against the (empty) data directory and install md5 auth rules.
pub async fn init_data_directory(config: &InstanceConfig) -> Result<(), SetupError> {
    debug!("Creating temporary password file");
    // Removed when dropped, on every return path.
    let mut pwfile = tempfile::Builder::new()
        .prefix("pgpass")
        .suffix(".txt")
        .tempfile()?;
    pwfile.write_all(config.password.as_bytes())?;
    pwfile.flush()?;

    info!("Running initdb");
    let output = Command::new(executable(&config.bin_dir, "initdb"))
        .arg("-D")
        .arg(&config.data_dir)
        .arg(format!("--username={}", config.user))
        .arg("--auth=md5")
        .arg(format!("--pwfile={}", pwfile.path().display()))
        .arg("--encoding=UTF8")
        .arg("--locale=C")
        .output()
        .await
        .map_err(|e| SetupError::DirectoryInitFailed {
            reason: format!("failed to run initdb: {e}"),
            output: String::new(),
        })?;

    if !output.status.success() {
        let combined = combined_output(&output);
        error!(status = %output.status, "initdb failed");
        return Err(SetupError::DirectoryInitFailed {
            reason: format!("initdb exited with {}", output.status),
            output: combined,
        });
    }
    info!("Database files created");

    write_hba_conf(&config.data_dir).map_err(|e| SetupError::DirectoryInitFailed {
        reason: format!("failed to update pg_hba.conf: {e}"),
        output: String::new(),
    })?;
    info!("Authentication configured");
    Ok(())
}

pub(crate) fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim_end().to_string()
}
