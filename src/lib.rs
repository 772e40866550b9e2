//! forestwatch: two-date vegetation-loss detection
//!
//! Compares NDVI and SAVI computed from red/NIR bands at an "old" and a
//! "new" time point. Each time point is corrected for haze (dark-object
//! subtraction), masked for cloud/shadow, and converted to index rasters;
//! the two dates are then differenced and classified against thresholds.

pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod report;
pub mod types;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use pipeline::{run_from_config_file, CancellationToken, Orchestrator, RunOutcome};
pub use report::RunReport;
pub use types::{
    Band, BandPair, ChangeRaster, ClassificationResult, GeoTransform, IndexKind, IndexRaster,
    JobRequest, PipelineStage, TimePoint, VegError, VegResult,
};
