use super::{InstanceConfig, RunState};
use crate::error::{ConnectionFailure, SetupError, classify_sqlx};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Dial `host:port` once, giving up after [`DIAL_TIMEOUT`].
pub async fn check_port(host: &str, port: u16) -> io::Result<()> {
    match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("dial {host}:{port} timed out"),
        )),
    }
}

pub async fn port_open(host: &str, port: u16) -> bool {
    check_port(host, port).await.is_ok()
}

/// Open a single driver connection and ping it.
pub async fn ping(opts: &PgConnectOptions) -> Result<(), sqlx::Error> {
    let mut conn = PgConnection::connect_with(opts).await?;
    conn.ping().await?;
    conn.close().await
}

pub async fn is_running(config: &InstanceConfig) -> Result<RunState, SetupError> {
    debug!(port = config.port, "Checking port");
    if !port_open(&config.host, config.port).await {
        info!(port = config.port, "Port is not in use");
        return Ok(RunState::NotRunning);
    }
    info!(port = config.port, "Port is in use");

    match ping(&config.admin_connect_options()).await {
        Ok(()) => {
            info!(port = config.port, "Successfully connected to PostgreSQL");
            Ok(RunState::Reachable)
        }
        Err(e) if classify_sqlx(&e) == ConnectionFailure::Authentication => {
            info!(user = %config.user, "Password authentication failed");
            Ok(RunState::AuthFailed)
        }
        Err(e) => Err(SetupError::Database(e)),
    }
}
