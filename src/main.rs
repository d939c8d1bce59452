use mimalloc::MiMalloc;
use pacs_provision::service::prompt::{CredentialPrompt, StdinPrompt};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = &pacs_provision::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        version = %cfg.postgres.version,
        port = cfg.postgres.port,
        binary_dir = %cfg.postgres.binary_dir.display(),
        data_dir = %cfg.postgres.data_dir.display(),
        "PostgreSQL setup"
    );

    let prompt = StdinPrompt;
    if let Err(e) = pacs_provision::service::setup::run(cfg, &prompt).await {
        error!(error = %e, "setup failed");
        if let Some(log) = e.server_log() {
            eprintln!("\nServer log:\n{log}");
        }
        eprintln!("\nError: {e}");
        let _ = tokio::task::spawn_blocking(move || prompt.pause()).await;
        std::process::exit(1);
    }
}
