use crate::service::EventPage;
use async_trait::async_trait;

/// Write-once page store keyed by `(tag, sequence)`.
///
/// Pages are numbered from 1 in fetch order. `put` on an existing key replaces
/// the page; `get_all` returns pages in ascending sequence order.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Drop everything staged so far and recreate an empty store.
    async fn reset(&self) -> Result<(), StagingError>;

    async fn put(&self, tag: &str, sequence: u32, page: &EventPage) -> Result<(), StagingError>;

    /// All staged pages of `tag`. Fails with [`StagingError::NotFound`] when none exist.
    async fn get_all(&self, tag: &str) -> Result<Vec<EventPage>, StagingError>;

    /// Sequence numbers currently staged for `tag`, ascending.
    async fn sequences(&self, tag: &str) -> Result<Vec<u32>, StagingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("no staged pages for tag '{0}'")]
    NotFound(String),

    #[error("tag '{0}' cannot be used as a storage key")]
    InvalidKey(String),

    #[error("staging I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("staged page encoding error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),
}

impl From<duckdb::Error> for StagingError {
    fn from(e: duckdb::Error) -> Self {
        StagingError::Database(e.to_string())
    }
}

/// Reject tags that would escape the working directory when used as a file name.
pub fn validate_tag(tag: &str) -> Result<(), StagingError> {
    let bad = tag.is_empty()
        || tag == "."
        || tag == ".."
        || tag.contains(['/', '\\', '\0']);
    if bad {
        return Err(StagingError::InvalidKey(tag.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("8c1f4f3e-7f1b-4a57-9e3a-1d2c3b4a5f6e").is_ok());
        assert!(validate_tag("abc").is_ok());
        assert!(validate_tag("..hidden").is_ok());

        for bad in ["", ".", "..", "a/b", "..\\x", "nul\0"] {
            assert!(
                matches!(validate_tag(bad), Err(StagingError::InvalidKey(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
