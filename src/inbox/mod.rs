//! Inbox - directory of sample images waiting for grouping
//!
//! ## Responsibilities
//!
//! - Store samples from the local sampler and from `/upload`
//! - Submit them to the group dispatcher (`InboxSink`)
//! - Pick up files dropped in by other writers (`InboxWatcher`)
//! - Purge the directory when it grows past the configured limit

mod sink;
mod watcher;

pub use sink::InboxSink;
pub use watcher::InboxWatcher;

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct Inbox {
    dir: PathBuf,
}

impl Inbox {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a sample under its own file name, path components stripped
    pub async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = sanitize_file_name(file_name)?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Image files currently in the inbox, oldest name first
    pub async fn list_images(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_image(&path) && entry.file_type().await?.is_file() {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }

    /// Delete every image; returns how many were removed
    pub async fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.list_images().await? {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Inbox file not removed"),
            }
        }
        tracing::info!(dir = %self.dir.display(), removed, "Inbox purged");
        Ok(removed)
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sanitize_file_name(raw: &str) -> Result<&str> {
    let name = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.'))
        .ok_or_else(|| Error::Validation(format!("invalid file name: {raw}")))?;
    if !is_image(Path::new(name)) {
        return Err(Error::Validation(format!("not an image file: {name}")));
    }
    Ok(name)
}
