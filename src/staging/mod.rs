pub mod duckdb;
pub mod files;
pub mod traits;

pub use self::duckdb::DuckDbStagingStore;
pub use files::FileStagingStore;
pub use traits::{validate_tag, StagingError, StagingStore};

use crate::config::{OutputConfig, StagingBackend};
use std::sync::Arc;

/// Open the configured backend inside the (already reset) working directory.
pub fn open_store(
    backend: StagingBackend,
    output: &OutputConfig,
) -> Result<Arc<dyn StagingStore>, StagingError> {
    let store: Arc<dyn StagingStore> = match backend {
        StagingBackend::Files => Arc::new(FileStagingStore::new(output.staging_dir())),
        StagingBackend::Duckdb => {
            Arc::new(DuckDbStagingStore::new(output.work_dir.join("staging.duckdb"))?)
        }
    };
    Ok(store)
}
