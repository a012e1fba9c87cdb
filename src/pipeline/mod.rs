//! Pipeline entry points for harvester runs.
//!
//! - `harvest`: run a full harvest on an acquired session and release it
//! - `ReviewStats` / `RunSummary`: figures derived from a finished run

pub mod harvest;
pub mod stats;

pub use harvest::{Harvester, StopSignal, harvest};
pub use stats::{Bucket, ReviewStats, RunSummary, YearSummary};
