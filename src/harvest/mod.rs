pub mod artifacts;
pub mod harvester;
pub mod reducer;

pub use artifacts::{reset_work_dir, ArtifactError, ArtifactSink, WORK_DIR_MARKER};
pub use harvester::{HarvestError, HarvestStats, Harvester};
pub use reducer::{ReduceError, ReduceStats, Reducer};
