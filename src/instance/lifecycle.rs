use super::binaries::executable;
use super::datadir::{combined_output, write_postgresql_conf};
use super::probe::{check_port, ping};
use super::{InstanceConfig, ReadinessPhase};
use crate::error::SetupError;
use backon::{ConstantBuilder, Retryable};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// `attempts` tries in total, one second apart.
pub fn poll_policy(attempts: usize) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(POLL_INTERVAL)
        .with_max_times(attempts.saturating_sub(1))
}

async fn read_log(config: &InstanceConfig) -> Option<String> {
    tokio::fs::read_to_string(config.log_file()).await.ok()
}

/// Write the server config, launch `pg_ctl start` without waiting, then poll
/// the port and a driver ping until both answer.
pub async fn start(config: &InstanceConfig, attempts: usize) -> Result<(), SetupError> {
    info!(port = config.port, "Starting PostgreSQL server");
    let conf = write_postgresql_conf(config)?;
    debug!(path = %conf.display(), "postgresql.conf written");

    let output = Command::new(executable(&config.bin_dir, "pg_ctl"))
        .arg("-D")
        .arg(&config.data_dir)
        .arg("-l")
        .arg(config.log_file())
        .arg("-o")
        .arg(format!("-p {}", config.port))
        .arg("-W")
        .arg("start")
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let log = read_log(config).await;
        error!(status = %output.status, "pg_ctl start failed");
        return Err(SetupError::LaunchFailed {
            output: combined_output(&output),
            log,
        });
    }

    let tcp = (|| async { check_port(&config.host, config.port).await })
        .retry(poll_policy(attempts))
        .notify(|err, dur: Duration| {
            debug!(error = %err, "port not ready, retrying in {:?}", dur);
        })
        .await;
    if tcp.is_err() {
        return Err(SetupError::StartupTimeout {
            phase: ReadinessPhase::Tcp,
            log: read_log(config).await,
        });
    }
    info!("Server is running and accepting connections");

    let opts = config.admin_connect_options();
    let pinged = (|| async { ping(&opts).await })
        .retry(poll_policy(attempts))
        .notify(|err, dur: Duration| {
            debug!(error = %err, "database not ready, retrying in {:?}", dur);
        })
        .await;
    if let Err(e) = pinged {
        error!(error = %e, "database never answered ping");
        return Err(SetupError::StartupTimeout {
            phase: ReadinessPhase::Ping,
            log: read_log(config).await,
        });
    }
    info!("Database connection verified");
    Ok(())
}

pub async fn stop(config: &InstanceConfig) -> Result<(), SetupError> {
    info!("Stopping PostgreSQL");
    let output = Command::new(executable(&config.bin_dir, "pg_ctl"))
        .arg("-D")
        .arg(&config.data_dir)
        .arg("stop")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| SetupError::StopFailed {
            output: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(SetupError::StopFailed {
            output: combined_output(&output),
        });
    }
    info!("PostgreSQL stopped successfully");
    Ok(())
}
