use crate::config::OutputConfig;
use crate::service::Event;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Column header written once at the top of the manifest.
pub const MANIFEST_HEADER: [&str; 5] = ["UUID", "AppVersion", "OsType", "OsVersion", "Model"];

/// Dropped into every working directory this tool creates. Only a directory
/// carrying it may be wiped.
pub const WORK_DIR_MARKER: &str = ".logharvest";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("output for tag '{tag}' would overwrite the manifest {path}")]
    ManifestCollision { tag: String, path: String },

    #[error("refusing to clear {path}: not empty and not a logharvest working directory")]
    ForeignWorkDir { path: String },
}

fn artifact_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Keep a field on one line and inside one column.
fn clean_field(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

/// One tab-separated, newline-terminated record.
pub fn format_record(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|field| clean_field(field))
        .collect::<Vec<_>>()
        .join("\t");
    line.push('\n');
    line
}

pub fn manifest_record(tag: &str, event: &Event) -> String {
    format_record(&[
        tag,
        event.app_version(),
        event.os_type(),
        event.os_version(),
        event.model(),
    ])
}

pub fn event_record(event: &Event) -> String {
    format_record(&[event.display_timestamp().as_str(), event.message()])
}

/// Remove and recreate the working directory. Nothing from a previous run survives.
///
/// A directory is only removed when it is empty or carries [`WORK_DIR_MARKER`].
pub async fn reset_work_dir(path: &Path) -> Result<(), ArtifactError> {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => {
            let marked = tokio::fs::try_exists(path.join(WORK_DIR_MARKER))
                .await
                .map_err(|e| artifact_error(path, e))?;
            let empty = entries
                .next_entry()
                .await
                .map_err(|e| artifact_error(path, e))?
                .is_none();
            if !marked && !empty {
                return Err(ArtifactError::ForeignWorkDir {
                    path: path.display().to_string(),
                });
            }
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| artifact_error(path, e))?;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(artifact_error(path, e)),
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| artifact_error(path, e))?;

    let marker = path.join(WORK_DIR_MARKER);
    tokio::fs::write(&marker, b"")
        .await
        .map_err(|e| artifact_error(&marker, e))
}

/// Per-tag output files and the shared manifest inside the working directory.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    dir: PathBuf,
    manifest_path: PathBuf,
}

impl ArtifactSink {
    pub fn new(output: &OutputConfig) -> Self {
        Self {
            dir: output.work_dir.clone(),
            manifest_path: output.manifest_path(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn tag_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", tag))
    }

    /// Fails when the tag's output file would be the manifest itself.
    /// File names are compared ignoring ASCII case.
    pub fn check_tag(&self, tag: &str) -> Result<(), ArtifactError> {
        let tag_file = format!("{}.txt", tag);
        let collides = self
            .manifest_path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.eq_ignore_ascii_case(&tag_file));
        if collides {
            return Err(ArtifactError::ManifestCollision {
                tag: tag.to_string(),
                path: self.manifest_path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Start a fresh manifest containing only the header line.
    pub async fn init_manifest(&self) -> Result<(), ArtifactError> {
        tokio::fs::write(&self.manifest_path, format_record(&MANIFEST_HEADER))
            .await
            .map_err(|e| artifact_error(&self.manifest_path, e))
    }

    pub async fn append_manifest(&self, record: &str) -> Result<(), ArtifactError> {
        let mut file = open_append(&self.manifest_path).await?;
        file.write_all(record.as_bytes())
            .await
            .map_err(|e| artifact_error(&self.manifest_path, e))?;
        file.flush()
            .await
            .map_err(|e| artifact_error(&self.manifest_path, e))
    }

    /// Open (creating if needed) the tag's output file for appending.
    pub async fn tag_writer(&self, tag: &str) -> Result<TagWriter, ArtifactError> {
        self.check_tag(tag)?;
        let path = self.tag_path(tag);
        let file = open_append(&path).await?;
        Ok(TagWriter {
            path,
            writer: BufWriter::new(file),
        })
    }
}

async fn open_append(path: &Path) -> Result<File, ArtifactError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| artifact_error(path, e))
}

/// Buffered appender for one tag's output file. Call [`TagWriter::finish`].
pub struct TagWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TagWriter {
    pub async fn append(&mut self, record: &str) -> Result<(), ArtifactError> {
        self.writer
            .write_all(record.as_bytes())
            .await
            .map_err(|e| artifact_error(&self.path, e))
    }

    pub async fn finish(mut self) -> Result<(), ArtifactError> {
        self.writer
            .flush()
            .await
            .map_err(|e| artifact_error(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn event(value: serde_json::Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_event_record_shape() {
        let e = event(json!({"timestamp": 100, "event": {"json": {"message": "boot"}}}));
        assert_eq!(event_record(&e), "100\tboot\n");
    }

    #[test]
    fn test_fields_cannot_break_lines() {
        let e = event(json!({"timestamp": 1, "event": {"json": {"message": "a\tb\nc\r\nd"}}}));
        assert_eq!(event_record(&e), "1\ta b c  d\n");
    }

    #[test]
    fn test_manifest_record_shape() {
        let e = event(json!({"event": {"json": {
            "app_version": "2.0", "os_type": "android", "os_version": "8.1", "model": "Pixel 2"
        }}}));
        assert_eq!(manifest_record("abc", &e), "abc\t2.0\tandroid\t8.1\tPixel 2\n");

        let bare = event(json!({}));
        assert_eq!(manifest_record("abc", &bare), "abc\t\t\t\t\n");
    }

    #[tokio::test]
    async fn test_reset_work_dir_discards_previous_run() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        reset_work_dir(&work).await.unwrap();
        std::fs::create_dir_all(work.join("staging/abc")).unwrap();
        std::fs::write(work.join("abc.txt"), "stale\n").unwrap();

        reset_work_dir(&work).await.unwrap();
        let left: Vec<_> = std::fs::read_dir(&work)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from(WORK_DIR_MARKER)]);
    }

    #[tokio::test]
    async fn test_reset_work_dir_accepts_empty_directory() {
        let dir = TempDir::new().unwrap();
        reset_work_dir(dir.path()).await.unwrap();
        assert!(dir.path().join(WORK_DIR_MARKER).exists());
    }

    #[tokio::test]
    async fn test_reset_work_dir_refuses_unmarked_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.md"), "keep me").unwrap();

        let err = reset_work_dir(dir.path()).await.unwrap_err();
        assert!(matches!(err, ArtifactError::ForeignWorkDir { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.md")).unwrap(),
            "keep me"
        );
    }

    #[tokio::test]
    async fn test_tag_named_like_manifest_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = ArtifactSink::new(&OutputConfig {
            work_dir: dir.path().to_path_buf(),
            manifest_name: "info.txt".to_string(),
        });
        sink.init_manifest().await.unwrap();

        for tag in ["info", "INFO"] {
            let err = sink.tag_writer(tag).await.err().unwrap();
            assert!(matches!(err, ArtifactError::ManifestCollision { .. }));
        }
        assert!(sink.check_tag("info2").is_ok());
        let content = std::fs::read_to_string(sink.manifest_path()).unwrap();
        assert_eq!(content, "UUID\tAppVersion\tOsType\tOsVersion\tModel\n");
    }

    #[tokio::test]
    async fn test_manifest_header_then_appends() {
        let dir = TempDir::new().unwrap();
        let sink = ArtifactSink::new(&OutputConfig {
            work_dir: dir.path().to_path_buf(),
            manifest_name: "info.txt".to_string(),
        });
        sink.init_manifest().await.unwrap();
        sink.append_manifest("abc\t1\t2\t3\t4\n").await.unwrap();

        let content = std::fs::read_to_string(sink.manifest_path()).unwrap();
        assert_eq!(content, "UUID\tAppVersion\tOsType\tOsVersion\tModel\nabc\t1\t2\t3\t4\n");
    }

    #[tokio::test]
    async fn test_tag_writer_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let sink = ArtifactSink::new(&OutputConfig {
            work_dir: dir.path().to_path_buf(),
            manifest_name: "info.txt".to_string(),
        });

        let mut writer = sink.tag_writer("abc").await.unwrap();
        writer.append("1\ta\n").await.unwrap();
        writer.finish().await.unwrap();

        let mut writer = sink.tag_writer("abc").await.unwrap();
        writer.append("2\tb\n").await.unwrap();
        writer.finish().await.unwrap();

        let content = std::fs::read_to_string(sink.tag_path("abc")).unwrap();
        assert_eq!(content, "1\ta\n2\tb\n");
    }

    #[tokio::test]
    async fn test_unwritable_location_reports_path() {
        let dir = TempDir::new().unwrap();
        let sink = ArtifactSink::new(&OutputConfig {
            work_dir: dir.path().join("does-not-exist"),
            manifest_name: "info.txt".to_string(),
        });
        let err = sink.init_manifest().await.unwrap_err();
        assert!(matches!(err, ArtifactError::Io { ref path, .. } if path.ends_with("info.txt")));
    }
}
