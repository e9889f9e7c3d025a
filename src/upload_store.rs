use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;

const MAX_NAME_CHARS: usize = 100;

pub async fn ensure_upload_root(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create upload directory at {}", path.display()))
}

/// On-disk name for an upload: `<unix-millis>-<sanitized original name>`.
///
/// Only the final path component of the client-supplied name is kept and
/// anything outside `[A-Za-z0-9._-]` becomes `_`, so the result can never
/// escape the upload directory.
pub fn stored_file_name(original: &str, unix_millis: i64) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let mut cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.chars().count() > MAX_NAME_CHARS {
        cleaned = cleaned
            .chars()
            .rev()
            .take(MAX_NAME_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
    }
    if cleaned.is_empty() {
        cleaned = "file".to_string();
    }
    format!("{unix_millis}-{cleaned}")
}

/// Path of a stored upload, or `None` if the name could leave the directory.
pub fn stored_path(upload_root: &Path, file_name: &str) -> Option<PathBuf> {
    let valid = !file_name.is_empty()
        && !file_name.contains(['/', '\\'])
        && file_name != "."
        && file_name != "..";
    valid.then(|| upload_root.join(file_name))
}

/// Writes `bytes` to a file that must not exist yet.
pub async fn write_new_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

pub async fn delete_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

/// Best-effort removal of stored uploads; failures are logged, not returned.
pub async fn delete_stored_files(upload_root: &Path, file_names: &[String]) {
    for name in file_names {
        let Some(path) = stored_path(upload_root, name) else {
            warn!(file = %name, "Refusing to delete upload with unsafe name");
            continue;
        };
        if let Err(err) = delete_file_if_exists(&path).await {
            warn!("Failed removing upload {}: {err:#}", path.display());
        }
    }
}
