use crate::api::ArchiveApi;
use crate::error::SetupError;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub study_id: String,
    pub bytes: usize,
    pub output: PathBuf,
}

/// Look up `study_instance_uid`, download the first matching study and write
/// the archive to `output` unchanged.
pub async fn download_study(
    api: &ArchiveApi,
    study_instance_uid: &str,
    output: &Path,
) -> Result<DownloadReport, SetupError> {
    let started = Instant::now();
    let ids = api.find_study_ids(study_instance_uid).await?;
    info!(
        study_ids = ?ids,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Retrieved study IDs"
    );

    let study_id = ids
        .into_iter()
        .next()
        .ok_or_else(|| SetupError::EmptyResultSet {
            key: study_instance_uid.to_string(),
        })?;

    let started = Instant::now();
    let archive = api.download_archive(&study_id).await?;
    info!(
        study_id = %study_id,
        size = archive.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Downloaded study archive"
    );

    tokio::fs::write(output, &archive).await?;
    info!(path = %output.display(), "Study archive saved");

    Ok(DownloadReport {
        study_id,
        bytes: archive.len(),
        output: output.to_path_buf(),
    })
}
