use super::artifacts::{event_record, manifest_record, ArtifactError, ArtifactSink};
use crate::staging::{StagingError, StagingStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("staging error while reducing: {0}")]
    Staging(#[from] StagingError),

    #[error("output error while reducing: {0}")]
    Io(#[from] ArtifactError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceStats {
    pub pages: usize,
    pub events: usize,
    pub header_written: bool,
}

/// Flattens a tag's staged pages into its output file and the shared manifest.
pub struct Reducer {
    store: Arc<dyn StagingStore>,
    sink: ArtifactSink,
    // Tags that already own a manifest line in this run.
    described: Mutex<HashSet<String>>,
}

impl Reducer {
    pub fn new(store: Arc<dyn StagingStore>, sink: ArtifactSink) -> Self {
        Self {
            store,
            sink,
            described: Mutex::new(HashSet::new()),
        }
    }

    pub fn sink(&self) -> &ArtifactSink {
        &self.sink
    }

    fn claim_manifest_line(&self, tag: &str) -> bool {
        match self.described.lock() {
            Ok(mut described) => described.insert(tag.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(tag.to_string()),
        }
    }

    /// Append one output line per staged event, pages in sequence order and
    /// events in page order. The first event seen also yields the tag's
    /// manifest line. Events are not deduplicated.
    ///
    /// Nothing is written when the tag has no staged pages.
    pub async fn reduce(&self, tag: &str) -> Result<ReduceStats, ReduceError> {
        let pages = self.store.get_all(tag).await?;

        let mut stats = ReduceStats {
            pages: pages.len(),
            ..Default::default()
        };
        let mut writer = self.sink.tag_writer(tag).await?;

        for page in &pages {
            for event in &page.events {
                if stats.events == 0 && self.claim_manifest_line(tag) {
                    self.sink
                        .append_manifest(&manifest_record(tag, event))
                        .await?;
                    stats.header_written = true;
                }
                writer.append(&event_record(event)).await?;
                stats.events += 1;
            }
        }
        writer.finish().await?;

        debug!(
            tag = %tag,
            pages = stats.pages,
            events = stats.events,
            "Reduced staged pages"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::service::{Event, EventPage};
    use crate::staging::FileStagingStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn event(ts: i64, message: &str, model: &str) -> Event {
        serde_json::from_value(json!({
            "id": format!("{}-{}", ts, message),
            "timestamp": ts,
            "event": {"json": {
                "message": message,
                "app_version": "1.0",
                "os_type": "iOS",
                "os_version": "11.2",
                "model": model
            }}
        }))
        .unwrap()
    }

    async fn setup() -> (TempDir, Arc<FileStagingStore>, Reducer) {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig {
            work_dir: dir.path().to_path_buf(),
            manifest_name: "info.txt".to_string(),
        };
        let store = Arc::new(FileStagingStore::new(output.staging_dir()));
        store.reset().await.unwrap();
        let sink = ArtifactSink::new(&output);
        sink.init_manifest().await.unwrap();
        let reducer = Reducer::new(store.clone(), sink);
        (dir, store, reducer)
    }

    fn read(path: &std::path::Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_single_manifest_line_from_first_event() {
        let (_dir, store, reducer) = setup().await;
        let pages = [
            vec![event(1, "a", "first"), event(2, "b", "x"), event(3, "c", "x")],
            vec![event(4, "d", "y"), event(5, "e", "y")],
            vec![event(6, "f", "z"), event(7, "g", "z")],
        ];
        for (i, events) in pages.into_iter().enumerate() {
            let next = (i < 2).then(|| format!("c{}", i + 1));
            store
                .put("abc", i as u32 + 1, &EventPage { events, next })
                .await
                .unwrap();
        }

        let stats = reducer.reduce("abc").await.unwrap();
        assert_eq!(stats, ReduceStats { pages: 3, events: 7, header_written: true });

        let manifest = read(reducer.sink().manifest_path());
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "abc\t1.0\tiOS\t11.2\tfirst");
    }

    #[tokio::test]
    async fn test_output_keeps_page_then_event_order() {
        let (_dir, store, reducer) = setup().await;
        store
            .put("abc", 2, &EventPage { events: vec![event(50, "third", "m")], next: None })
            .await
            .unwrap();
        store
            .put(
                "abc",
                1,
                &EventPage {
                    events: vec![event(300, "first", "m"), event(100, "second", "m")],
                    next: Some("c1".to_string()),
                },
            )
            .await
            .unwrap();

        reducer.reduce("abc").await.unwrap();
        assert_eq!(
            read(&reducer.sink().tag_path("abc")),
            "300\tfirst\n100\tsecond\n50\tthird\n"
        );
    }

    #[tokio::test]
    async fn test_duplicate_events_are_kept() {
        let (_dir, store, reducer) = setup().await;
        let dup = event(10, "same", "m");
        store
            .put("abc", 1, &EventPage { events: vec![dup.clone()], next: Some("c1".into()) })
            .await
            .unwrap();
        store
            .put("abc", 2, &EventPage { events: vec![dup], next: None })
            .await
            .unwrap();

        reducer.reduce("abc").await.unwrap();
        assert_eq!(read(&reducer.sink().tag_path("abc")), "10\tsame\n10\tsame\n");
    }

    #[tokio::test]
    async fn test_missing_tag_writes_nothing() {
        let (_dir, _store, reducer) = setup().await;
        let err = reducer.reduce("ghost").await.unwrap_err();
        assert!(matches!(err, ReduceError::Staging(StagingError::NotFound(_))));
        assert!(!reducer.sink().tag_path("ghost").exists());
        assert_eq!(read(reducer.sink().manifest_path()).lines().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_stream_creates_empty_file_without_manifest_line() {
        let (_dir, store, reducer) = setup().await;
        store.put("quiet", 1, &EventPage::default()).await.unwrap();

        let stats = reducer.reduce("quiet").await.unwrap();
        assert!(!stats.header_written);
        assert_eq!(read(&reducer.sink().tag_path("quiet")), "");
        assert_eq!(read(reducer.sink().manifest_path()).lines().count(), 1);
    }

    #[tokio::test]
    async fn test_manifest_line_never_repeats_for_a_tag() {
        let (_dir, store, reducer) = setup().await;
        store
            .put("abc", 1, &EventPage { events: vec![event(1, "a", "m")], next: None })
            .await
            .unwrap();

        reducer.reduce("abc").await.unwrap();
        let second = reducer.reduce("abc").await.unwrap();
        assert!(!second.header_written);
        assert_eq!(read(reducer.sink().manifest_path()).lines().count(), 2);
    }
}
