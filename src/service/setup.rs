//! Top-level provisioning flow: reach or start an instance, provision the
//! schema with bounded retries, then hold the instance until a signal.

use crate::config::Config;
use crate::db::ProvisionReport;
use crate::error::{IsRetryable, SetupError};
use crate::instance::{InstanceConfig, InstanceManager, RunState};
use crate::service::prompt::CredentialPrompt;
use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Run `op` up to `attempts` times, retrying only transient connection
/// errors with a fixed `delay` in between.
pub async fn retry_transient<F, Fut, T>(
    attempts: usize,
    delay: Duration,
    op: F,
) -> Result<T, SetupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SetupError>>,
{
    let policy = ConstantBuilder::default()
        .with_delay(delay)
        .with_max_times(attempts.max(1) - 1);

    op.retry(policy)
        .when(|e: &SetupError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(error = %err, "Database setup failed; retrying in {:?}", dur);
        })
        .await
}

/// Make sure an instance is reachable with working credentials.
///
/// A running instance is tried with `default_password`, then with one
/// password read from `prompt`. If nothing is running, a fresh instance is
/// initialized and started with `default_password`. Returns whether this
/// call started the instance.
pub async fn connect_or_start<P>(
    manager: &mut InstanceManager,
    default_password: &str,
    prompt: &P,
) -> Result<bool, SetupError>
where
    P: CredentialPrompt + Clone + 'static,
{
    let port = manager.config().port;
    info!(port, "Checking if PostgreSQL is already running");
    let mut state = manager.is_running().await?;

    if state == RunState::NotRunning {
        info!(port, "No PostgreSQL instance found; starting new instance");
        debug!(state = ?manager.local_state(), "Local instance state");
        manager.set_password(default_password);
        manager.initialize().await?;
        manager.start().await?;
        info!(port, "PostgreSQL started successfully");
        return Ok(true);
    }

    info!(port, "Existing PostgreSQL instance found");
    if state.needs_password() && manager.config().password != default_password {
        info!("Attempting to connect with default password");
        manager.set_password(default_password);
        state = manager.is_running().await?;
    }

    if state.needs_password() {
        warn!("Default password failed");
        let user = manager.config().user.clone();
        let password = {
            let (prompt, user) = (prompt.clone(), user.clone());
            tokio::task::spawn_blocking(move || prompt.read_password(&user))
                .await
                .map_err(std::io::Error::other)??
        };
        manager.set_password(password);
        if manager.is_running().await?.needs_password() {
            return Err(SetupError::AuthenticationFailed { user });
        }
    }

    info!(port, "Successfully connected to existing PostgreSQL instance");
    Ok(false)
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Received SIGINT (Ctrl-C)");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C");
    }
    Ok(())
}

fn print_connection_details(config: &InstanceConfig) {
    println!("\nConnection Details:");
    println!("------------------");
    println!("Host: {}", config.host);
    println!("Port: {}", config.port);
    println!("Database: {}", config.database);
    println!("Schema: {}", config.schema);
    println!("Table: {}", config.table);
    println!("\nPress Ctrl+C to stop the server...");
}

/// Reach or start the instance and provision it. Returns the manager, whether
/// this process started the instance, and the provisioning report.
pub async fn provision<P>(
    config: &Config,
    prompt: &P,
) -> Result<(InstanceManager, bool, ProvisionReport), SetupError>
where
    P: CredentialPrompt + Clone + 'static,
{
    let pg = &config.postgres;
    let provisioning = &config.provisioning;

    let mut manager = InstanceManager::new(
        InstanceConfig::from(pg),
        provisioning.readiness_attempts,
    );
    if pg.fetch_binaries {
        manager = manager.with_binary_fetch(pg.binary_url.clone(), pg.binary_dir.clone());
    }

    let started_here = connect_or_start(&mut manager, &pg.password, prompt).await?;

    info!("Attempting database setup");
    let settle_delay = provisioning.settle_delay();
    let mgr = &manager;
    let report = retry_transient(provisioning.attempts, provisioning.retry_delay(), move || {
        mgr.provision_schema(settle_delay)
    })
    .await?;

    Ok((manager, started_here, report))
}

/// Full interactive lifecycle used by the `pacs-provision` binary.
pub async fn run<P>(config: &Config, prompt: &P) -> Result<(), SetupError>
where
    P: CredentialPrompt + Clone + 'static,
{
    let (manager, started_here, report) = provision(config, prompt).await?;
    info!(
        database_existed = report.database_existed,
        rows = report.rows_after,
        "Setup completed successfully"
    );
    print_connection_details(manager.config());

    wait_for_shutdown().await?;

    if started_here {
        if let Err(e) = manager.stop().await {
            error!(error = %e, "Error stopping PostgreSQL");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn refused() -> SetupError {
        SetupError::TransientConnection {
            step: "connect to postgres database".to_string(),
            source: sqlx::Error::Io(IoError::new(ErrorKind::ConnectionRefused, "refused")),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = retry_transient(3, Duration::from_millis(5), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(refused()) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_failure_stops_after_one_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Result<(), _> = retry_transient(3, Duration::from_millis(5), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SetupError::SchemaStepFailed {
                    step: "create table".to_string(),
                    source: sqlx::Error::RowNotFound,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(SetupError::SchemaStepFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Result<(), _> = retry_transient(3, Duration::from_millis(5), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(refused())
            }
        })
        .await;

        assert!(matches!(result, Err(SetupError::TransientConnection { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
