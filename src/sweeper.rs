use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::{fs, time};
use tracing::{info, warn};

use crate::{store::attachments, upload_store::delete_file_if_exists, AppState};

/// Files younger than this are left alone; an upload is written to disk just
/// before its attachment row is inserted.
const ORPHAN_GRACE: Duration = Duration::from_secs(10 * 60);

pub fn spawn_upload_sweeper(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            match sweep_orphaned_uploads(&state, ORPHAN_GRACE).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Removed orphaned uploads"),
                Err(err) => warn!("Upload sweeper error: {err:#}"),
            }
        }
    });
}

/// Deletes files in the upload directory that no attachment row references.
/// Cascading deletes of notes and users drop the rows but not the files.
pub async fn sweep_orphaned_uploads(state: &AppState, grace: Duration) -> Result<usize> {
    let referenced = state
        .db
        .call(|conn| attachments::all_filenames(conn))
        .await
        .context("Failed listing attachment files")?;

    let root = &state.config.upload_dir;
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed reading {}", root.display()))
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Skipping upload entry {}: {err}", entry.path().display());
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if referenced.contains(&name) {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < grace {
            continue;
        }

        if let Err(err) = delete_file_if_exists(&entry.path()).await {
            warn!("Failed removing orphaned upload: {err:#}");
            continue;
        }
        removed += 1;
    }

    Ok(removed)
}
