use crate::error::SetupError;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use url::Url;

/// Executables that must exist before anything else is attempted.
pub const REQUIRED_BINARIES: [&str; 2] = ["pg_ctl", "postgres"];

/// Top-level folder of the upstream binary zip.
const DISTRIBUTION_ROOT: &str = "pgsql";

/// Platform-specific path of a PostgreSQL executable.
pub fn executable(bin_dir: &Path, name: &str) -> PathBuf {
    bin_dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

pub fn missing_binaries(bin_dir: &Path) -> Vec<String> {
    REQUIRED_BINARIES
        .iter()
        .filter(|name| !executable(bin_dir, name).is_file())
        .map(|name| format!("{name}{}", std::env::consts::EXE_SUFFIX))
        .collect()
}

pub fn check_binaries(bin_dir: &Path) -> Result<(), SetupError> {
    let missing = missing_binaries(bin_dir);
    if missing.is_empty() {
        return Ok(());
    }
    warn!(
        bin_dir = %bin_dir.display(),
        missing = ?missing,
        "Required files not found; place the PostgreSQL binaries under <binary_dir>/bin"
    );
    Err(SetupError::MissingBinaries {
        dir: bin_dir.to_path_buf(),
        missing,
    })
}

/// Download the distribution zip and unpack it into `binary_root`.
pub async fn fetch_binaries(url: &Url, binary_root: &Path) -> Result<(), SetupError> {
    info!(%url, "Downloading PostgreSQL binaries");
    let bytes = reqwest::get(url.clone())
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    info!(size = bytes.len(), dest = %binary_root.display(), "Extracting binaries");
    let dest = binary_root.to_path_buf();
    let written = tokio::task::spawn_blocking(move || extract_distribution(&bytes, &dest))
        .await
        .map_err(io::Error::other)??;
    info!(files = written, "Binaries extracted");
    Ok(())
}

/// Unpack a zip archive into `dest`, dropping the `pgsql/` prefix when present.
/// Returns the number of files written.
pub fn extract_distribution(bytes: &[u8], dest: &Path) -> Result<usize, SetupError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(name) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping zip entry with unsafe path");
            continue;
        };
        let relative = strip_distribution_root(&name);
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
        written += 1;
    }
    Ok(written)
}

fn strip_distribution_root(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == DISTRIBUTION_ROOT => {
            components.as_path().to_path_buf()
        }
        _ => path.to_path_buf(),
    }
}
