use super::traits::{validate_tag, StagingError, StagingStore};
use crate::service::EventPage;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One JSON document per page: `<root>/<tag>/<sequence>.json`.
#[derive(Debug, Clone)]
pub struct FileStagingStore {
    root: PathBuf,
}

fn io_error(path: &Path, source: std::io::Error) -> StagingError {
    StagingError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn page_file_name(sequence: u32) -> String {
    format!("{:06}.json", sequence)
}

fn parse_page_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".json")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

impl FileStagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tag_dir(&self, tag: &str) -> Result<PathBuf, StagingError> {
        validate_tag(tag)?;
        Ok(self.root.join(tag))
    }

    /// `(sequence, path)` of every staged page of `tag`, ascending.
    async fn page_files(&self, tag: &str) -> Result<Vec<(u32, PathBuf)>, StagingError> {
        let dir = self.tag_dir(tag)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let name = entry.file_name();
            if let Some(sequence) = name.to_str().and_then(parse_page_file_name) {
                pages.push((sequence, entry.path()));
            }
        }
        pages.sort_by_key(|(sequence, _)| *sequence);
        Ok(pages)
    }
}

#[async_trait]
impl StagingStore for FileStagingStore {
    async fn reset(&self) -> Result<(), StagingError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&self.root, e)),
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))
    }

    async fn put(&self, tag: &str, sequence: u32, page: &EventPage) -> Result<(), StagingError> {
        let dir = self.tag_dir(tag)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let body = serde_json::to_vec(page)?;
        let path = dir.join(page_file_name(sequence));
        let tmp_path = dir.join(format!("{}.tmp", page_file_name(sequence)));

        // Rename so readers never observe a half-written page.
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::trace!(tag = %tag, sequence, bytes = body.len(), "page staged");
        Ok(())
    }

    async fn get_all(&self, tag: &str) -> Result<Vec<EventPage>, StagingError> {
        let files = self.page_files(tag).await?;
        if files.is_empty() {
            return Err(StagingError::NotFound(tag.to_string()));
        }

        let mut pages = Vec::with_capacity(files.len());
        for (_, path) in files {
            let body = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
            pages.push(serde_json::from_slice(&body)?);
        }
        Ok(pages)
    }

    async fn sequences(&self, tag: &str) -> Result<Vec<u32>, StagingError> {
        Ok(self
            .page_files(tag)
            .await?
            .into_iter()
            .map(|(sequence, _)| sequence)
            .collect())
    }
}
