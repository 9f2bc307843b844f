//! File naming, temp-upload cleanup and preview retention

use crate::config::{RenderConfig, StorageConfig};
use chrono::Utc;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `<purpose>-<epoch-ms>-<random>.<ext>`
pub fn unique_file_name(purpose: &str, ext: &str) -> String {
    format!("{}.{ext}", unique_id(purpose))
}

/// `<prefix>-<epoch-ms>-<random>`
pub fn unique_id(prefix: &str) -> String {
    let random: u32 = rand::rng().random_range(0..1_000_000_000);
    format!("{prefix}-{}-{random}", Utc::now().timestamp_millis())
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Move a file, falling back to copy + delete across filesystems.
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    remove_if_exists(from).await?;
    Ok(())
}

/// Delete the files behind public URLs.
///
/// URLs outside the uploads root are skipped; missing files are ignored.
/// Returns the number of files removed.
pub async fn delete_public_files<'a, I>(storage: &StorageConfig, urls: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let mut removed = 0;
    for url in urls {
        let Some(path) = storage.path_for_url(url) else {
            debug!(url, "not a local upload, skipped");
            continue;
        };
        match remove_if_exists(&path).await {
            Ok(true) => removed += 1,
            Ok(false) => debug!(path = %path.display(), "already removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
        }
    }
    removed
}

/// Uploaded temp files owned by one request, deleted when dropped.
#[derive(Debug, Default)]
pub struct TempUploads {
    paths: Vec<PathBuf>,
}

impl TempUploads {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Hand the files over to the caller instead of deleting them.
    pub fn keep(mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }
}

impl Drop for TempUploads {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "temp upload removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp upload"),
            }
        }
    }
}

/// Remove regular files in `dir` last modified more than `retention` ago.
///
/// A missing directory counts as empty.
pub async fn sweep_expired(dir: &Path, retention: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age > retention && remove_if_exists(&entry.path()).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Periodically sweep the temporary preview and image directories.
pub fn spawn_preview_sweeper(storage: StorageConfig, render: RenderConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(render.sweep_interval);
        loop {
            interval.tick().await;
            for dir in [&storage.temp_previews_dir, &storage.temp_images_dir] {
                match sweep_expired(dir, render.preview_retention).await {
                    Ok(0) => {}
                    Ok(removed) => info!(dir = %dir.display(), removed, "expired files swept"),
                    Err(e) => warn!(dir = %dir.display(), error = %e, "sweep failed"),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_unique_file_name_shape() {
        let name = unique_file_name("preview", "png");
        let re = Regex::new(r"^preview-\d{13,}-\d+\.png$").unwrap();
        assert!(re.is_match(&name), "{name}");
        assert_eq!(crate::resolver::extract_base_filename(&name), "preview.png");
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        tokio::fs::write(&path, b"x").await.unwrap();

        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from.png");
        let to = dir.path().join("to.png");
        tokio::fs::write(&from, b"data").await.unwrap();

        move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"data");
    }

    #[test]
    fn test_temp_uploads_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.png");
        let temp = dir.path().join("temp.png");
        std::fs::write(&kept, b"k").unwrap();
        std::fs::write(&temp, b"t").unwrap();

        {
            let guard = TempUploads::new([temp.clone(), dir.path().join("gone.png")]);
            assert_eq!(guard.paths().len(), 2);
        }

        assert!(!temp.exists());
        assert!(kept.exists());
    }

    #[test]
    fn test_temp_uploads_keep() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("images_avatar-1-1.png");
        std::fs::write(&staged, b"t").unwrap();

        let mut guard = TempUploads::default();
        guard.push(staged.clone());
        assert_eq!(guard.keep(), vec![staged.clone()]);

        assert!(staged.exists());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("old.png"), b"x").await.unwrap();

        assert_eq!(sweep_expired(dir.path(), Duration::from_secs(3600)).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sweep_expired(dir.path(), Duration::from_millis(1)).await.unwrap(), 1);
        assert_eq!(sweep_expired(&dir.path().join("missing"), Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_public_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig::under(dir.path());
        storage.ensure_dirs().await.unwrap();
        let pdf = storage.pdfs_dir.join("story-1-2.pdf");
        tokio::fs::write(&pdf, b"%PDF").await.unwrap();

        let removed = delete_public_files(
            &storage,
            [
                "/uploads/pdfs/story-1-2.pdf",
                "/uploads/previews/never-existed.png",
                "https://elsewhere.example/x.png",
            ],
        )
        .await;

        assert_eq!(removed, 1);
        assert!(!pdf.exists());
    }
}
