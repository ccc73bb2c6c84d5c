use super::traits::{validate_tag, StagingError, StagingStore};
use crate::service::EventPage;
use async_trait::async_trait;
use chrono::Utc;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS staged_pages (
    tag VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    page_json VARCHAR NOT NULL,
    staged_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (tag, seq)
)";

/// Staging backed by a single DuckDB table.
pub struct DuckDbStagingStore {
    conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StagingError> {
    conn.lock()
        .map_err(|_| StagingError::Database("connection mutex poisoned".to_string()))
}

fn join_error(e: tokio::task::JoinError) -> StagingError {
    StagingError::Database(format!("Task join error: {}", e))
}

impl DuckDbStagingStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StagingError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self, StagingError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn query_rows(conn: &Connection, sql: &str, tag: &str) -> Result<Vec<(i64, String)>, StagingError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(duckdb::params![tag], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[async_trait]
impl StagingStore for DuckDbStagingStore {
    async fn reset(&self) -> Result<(), StagingError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute("DROP TABLE IF EXISTS staged_pages", [])?;
            conn.execute(CREATE_TABLE, [])?;
            Ok::<(), StagingError>(())
        })
        .await
        .map_err(join_error)?
    }

    async fn put(&self, tag: &str, sequence: u32, page: &EventPage) -> Result<(), StagingError> {
        validate_tag(tag)?;
        let conn = self.conn.clone();
        let tag = tag.to_string();
        let page_json = serde_json::to_string(page)?;

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO staged_pages (tag, seq, page_json, staged_at)
                 VALUES (?, ?, ?, to_timestamp(? / 1000000.0))",
                duckdb::params![tag, i64::from(sequence), page_json, Utc::now().timestamp_micros()],
            )?;
            Ok::<(), StagingError>(())
        })
        .await
        .map_err(join_error)?
    }

    async fn get_all(&self, tag: &str) -> Result<Vec<EventPage>, StagingError> {
        validate_tag(tag)?;
        let conn = self.conn.clone();
        let tag = tag.to_string();

        tokio::task::spawn_blocking(move || {
            let rows = {
                let conn = lock(&conn)?;
                Self::query_rows(
                    &conn,
                    "SELECT seq, page_json FROM staged_pages WHERE tag = ? ORDER BY seq",
                    &tag,
                )?
            };
            if rows.is_empty() {
                return Err(StagingError::NotFound(tag));
            }
            let pages: Result<Vec<EventPage>, StagingError> = rows
                .into_iter()
                .map(|(_, json)| serde_json::from_str(&json).map_err(StagingError::from))
                .collect();
            pages
        })
        .await
        .map_err(join_error)?
    }

    async fn sequences(&self, tag: &str) -> Result<Vec<u32>, StagingError> {
        validate_tag(tag)?;
        let conn = self.conn.clone();
        let tag = tag.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let rows = Self::query_rows(
                &conn,
                "SELECT seq, '' FROM staged_pages WHERE tag = ? ORDER BY seq",
                &tag,
            )?;
            let sequences: Result<Vec<u32>, StagingError> = rows
                .into_iter()
                .map(|(seq, _)| {
                    u32::try_from(seq)
                        .map_err(|_| StagingError::Database(format!("sequence {} out of range", seq)))
                })
                .collect();
            sequences
        })
        .await
        .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Event;
    use tempfile::TempDir;

    fn page(ids: &[&str], next: Option<&str>) -> EventPage {
        EventPage {
            events: ids
                .iter()
                .map(|id| Event {
                    id: id.to_string(),
                    timestamp: 100,
                    ..Default::default()
                })
                .collect(),
            next: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_put_get_all_ordered() {
        let store = DuckDbStagingStore::in_memory().unwrap();
        store.put("abc", 3, &page(&["c"], None)).await.unwrap();
        store.put("abc", 1, &page(&["a"], Some("n1"))).await.unwrap();
        store.put("abc", 2, &page(&["b"], Some("n2"))).await.unwrap();

        let pages = store.get_all("abc").await.unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.events[0].id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(pages[0].next_cursor(), Some("n1"));
        assert_eq!(store.sequences("abc").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = DuckDbStagingStore::in_memory().unwrap();
        store.put("abc", 1, &page(&["old"], None)).await.unwrap();
        store.put("abc", 1, &page(&["new"], None)).await.unwrap();
        let pages = store.get_all("abc").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].events[0].id, "new");
    }

    #[tokio::test]
    async fn test_missing_tag_not_found() {
        let store = DuckDbStagingStore::in_memory().unwrap();
        assert!(matches!(
            store.get_all("nope").await,
            Err(StagingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_file_backed_store() {
        let dir = TempDir::new().unwrap();
        let store = DuckDbStagingStore::new(dir.path().join("staging.duckdb")).unwrap();
        store.put("abc", 1, &page(&["a"], None)).await.unwrap();
        store.reset().await.unwrap();
        assert!(store.sequences("abc").await.unwrap().is_empty());
    }
}
