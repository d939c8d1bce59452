//! Download one study from the PACS archive as a zip.
//!
//! Usage: `download-study [STUDY_INSTANCE_UID]`. Without an argument the
//! configured `PACSDB_ARCHIVE__STUDY_INSTANCE_UID` is used.

use mimalloc::MiMalloc;
use pacs_provision::api::ArchiveApi;
use pacs_provision::service::download::download_study;
use pacs_provision::types::archive::ArchiveAuth;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = pacs_provision::config::Config::load()?;

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

    let archive = &cfg.archive;
    let study_instance_uid = std::env::args()
        .nth(1)
        .unwrap_or_else(|| archive.study_instance_uid.clone());
    info!(url = %archive.url, %study_instance_uid, "Querying archive");

    let api = ArchiveApi::new(
        archive.url.clone(),
        &ArchiveAuth::new(&archive.username, &archive.password),
    )?;
    let report = download_study(&api, &study_instance_uid, &archive.output).await?;
    info!(
        study_id = %report.study_id,
        bytes = report.bytes,
        path = %report.output.display(),
        "Done"
    );
    Ok(())
}
