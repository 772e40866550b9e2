//! Run configuration loaded from a JSON record

use crate::types::{VegError, VegResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_red_band_file() -> String {
    "band4.TIF".to_string()
}

fn default_nir_band_file() -> String {
    "band5.TIF".to_string()
}

fn default_dark_object_percentile() -> f64 {
    1.0
}

fn default_job_timeout_secs() -> u64 {
    600
}

/// Immutable pipeline configuration, shared read-only across jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// SAVI soil-adjustment factor
    #[serde(rename = "L")]
    pub soil_adjustment: f32,
    /// A pixel counts as declining when its NDVI change is below this
    pub ndvi_threshold: f32,
    /// A pixel counts as declining when its SAVI change is below this
    pub savi_threshold: f32,
    /// Percentage of deforested pixels above which a run raises an alert
    pub deforestation_alert_threshold: f64,
    /// Mean red/NIR brightness above which a pixel is treated as cloud or shadow
    pub cloud_shadow_threshold: f32,
    /// Accepted for compatibility with existing config files; masking uses
    /// `cloud_shadow_threshold`
    pub brightness_threshold: f32,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,

    #[serde(default = "default_red_band_file")]
    pub red_band_file: String,
    #[serde(default = "default_nir_band_file")]
    pub nir_band_file: String,
    #[serde(default = "default_dark_object_percentile")]
    pub dark_object_percentile: f64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub artifact_ttl_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            soil_adjustment: 0.5,
            ndvi_threshold: -0.2,
            savi_threshold: -0.2,
            deforestation_alert_threshold: 5.0,
            cloud_shadow_threshold: 0.3,
            brightness_threshold: 0.3,
            input_folder: PathBuf::from("input"),
            output_folder: PathBuf::from("output"),
            red_band_file: default_red_band_file(),
            nir_band_file: default_nir_band_file(),
            dark_object_percentile: default_dark_object_percentile(),
            job_timeout_secs: default_job_timeout_secs(),
            max_workers: None,
            artifact_ttl_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(json: &str) -> VegResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| VegError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. Relative input/output folders are resolved
    /// against the directory containing the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> VegResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| VegError::io(path, e))?;
        let mut config = Self::from_json_str(&text)?;

        if let Some(base) = path.parent() {
            if config.input_folder.is_relative() {
                config.input_folder = base.join(&config.input_folder);
            }
            if config.output_folder.is_relative() {
                config.output_folder = base.join(&config.output_folder);
            }
        }

        log::debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> VegResult<()> {
        if !self.soil_adjustment.is_finite() || self.soil_adjustment < 0.0 {
            return Err(VegError::Config(format!(
                "L must be a finite non-negative number, got {}",
                self.soil_adjustment
            )));
        }

        let finite = [
            ("ndvi_threshold", self.ndvi_threshold as f64),
            ("savi_threshold", self.savi_threshold as f64),
            ("cloud_shadow_threshold", self.cloud_shadow_threshold as f64),
            ("brightness_threshold", self.brightness_threshold as f64),
            ("deforestation_alert_threshold", self.deforestation_alert_threshold),
        ];
        for (key, value) in finite {
            if !value.is_finite() {
                return Err(VegError::Config(format!("{} must be finite, got {}", key, value)));
            }
        }

        if !(0.0..=100.0).contains(&self.deforestation_alert_threshold) {
            return Err(VegError::Config(format!(
                "deforestation_alert_threshold must be a percentage in [0, 100], got {}",
                self.deforestation_alert_threshold
            )));
        }

        if !(0.0..=100.0).contains(&self.dark_object_percentile) {
            return Err(VegError::Config(format!(
                "dark_object_percentile must be in [0, 100], got {}",
                self.dark_object_percentile
            )));
        }

        if self.job_timeout_secs == 0 {
            return Err(VegError::Config("job_timeout_secs must be positive".to_string()));
        }

        if self.max_workers == Some(0) {
            return Err(VegError::Config("max_workers must be positive".to_string()));
        }

        if self.red_band_file.is_empty() || self.nir_band_file.is_empty() {
            return Err(VegError::Config("Band file names must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn artifact_ttl(&self) -> Option<Duration> {
        self.artifact_ttl_secs.map(Duration::from_secs)
    }
}

/// Retention period for artifact eviction. An explicit value wins over the
/// configured `artifact_ttl_secs`.
pub fn resolve_artifact_ttl(
    explicit_secs: Option<u64>,
    config: Option<&PipelineConfig>,
) -> VegResult<Duration> {
    explicit_secs
        .map(Duration::from_secs)
        .or_else(|| config.and_then(PipelineConfig::artifact_ttl))
        .ok_or_else(|| {
            VegError::Config(
                "No artifact TTL given and artifact_ttl_secs is not configured".to_string(),
            )
        })
}
