use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Real-valued reflectance or index sample
pub type Sample = f32;

/// 2D sample grid (rows x cols)
pub type SampleGrid = Array2<Sample>;

/// Geospatial transformation parameters (GDAL affine ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Identity-like transform: origin at (0, 0), unit pixels, north-up
    pub fn unit() -> Self {
        Self {
            top_left_x: 0.0,
            pixel_width: 1.0,
            rotation_x: 0.0,
            top_left_y: 0.0,
            rotation_y: 0.0,
            pixel_height: -1.0,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// True when both transforms describe the same grid origin, pixel size
    /// and rotation. Tolerance scales with the pixel size.
    pub fn same_grid(&self, other: &GeoTransform) -> bool {
        let scale = self.pixel_width.abs().max(self.pixel_height.abs()).max(1.0);
        let tol = 1e-9 * scale;
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::unit()
    }
}

/// Single spectral band with its spatial metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub data: SampleGrid,
    pub geo_transform: GeoTransform,
    /// Coordinate reference system as WKT (may be empty for ungeoreferenced rasters)
    pub crs: String,
    pub nodata: Option<f64>,
}

impl Band {
    pub fn new(data: SampleGrid, geo_transform: GeoTransform, crs: impl Into<String>) -> Self {
        Self {
            data,
            geo_transform,
            crs: crs.into(),
            nodata: None,
        }
    }

    /// Same metadata, new samples
    pub fn with_data(&self, data: SampleGrid) -> Self {
        Self {
            data,
            geo_transform: self.geo_transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

/// Red and near-infrared bands captured at one time point
#[derive(Debug, Clone)]
pub struct BandPair {
    pub red: Band,
    pub nir: Band,
}

/// The two acquisition dates being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePoint {
    Old,
    New,
}

impl std::fmt::Display for TimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimePoint::Old => write!(f, "old"),
            TimePoint::New => write!(f, "new"),
        }
    }
}

/// Supported vegetation indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    NDVI,
    SAVI,
}

impl IndexKind {
    /// Lowercase stem used for artifact file names
    pub fn file_stem(&self) -> &'static str {
        match self {
            IndexKind::NDVI => "ndvi",
            IndexKind::SAVI => "savi",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::NDVI => write!(f, "NDVI"),
            IndexKind::SAVI => write!(f, "SAVI"),
        }
    }
}

/// Vegetation index grid for a single time point
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRaster {
    pub kind: IndexKind,
    pub time_point: TimePoint,
    pub data: SampleGrid,
    pub geo_transform: GeoTransform,
    pub crs: String,
}

impl IndexRaster {
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Where a change raster came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProvenance {
    pub kind: IndexKind,
    pub old: TimePoint,
    pub new: TimePoint,
    pub rows: usize,
    pub cols: usize,
}

/// `new - old` over the shared top-left extent of two same-kind index rasters
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRaster {
    pub kind: IndexKind,
    pub data: SampleGrid,
    pub geo_transform: GeoTransform,
    pub crs: String,
    pub provenance: ChangeProvenance,
}

impl ChangeRaster {
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Outcome of the dual-index deforestation test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub deforestation_percentage: f64,
    pub alert: bool,
    pub deforested_pixels: usize,
    pub total_pixels: usize,
    pub ndvi_change: ChangeProvenance,
    pub savi_change: ChangeProvenance,
}

impl ClassificationResult {
    /// Human-readable verdict
    pub fn status(&self) -> &'static str {
        if self.alert {
            "🚨 Significant deforestation detected!"
        } else {
            "✅ No significant deforestation detected."
        }
    }
}

/// Explicit pair of time-point identifiers for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub old: String,
    pub new: String,
}

impl JobRequest {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }

    pub fn id(&self, time_point: TimePoint) -> &str {
        match time_point {
            TimePoint::Old => &self.old,
            TimePoint::New => &self.new,
        }
    }
}

/// Pipeline state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Idle,
    LoadingConfig,
    ComputingIndices,
    Comparing,
    Classifying,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Steps inside one per-time-point job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    Loading,
    Correcting,
    Masking,
    Indices,
    Writing,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Loading => write!(f, "band loading"),
            JobStage::Correcting => write!(f, "atmospheric correction"),
            JobStage::Masking => write!(f, "cloud/shadow masking"),
            JobStage::Indices => write!(f, "index computation"),
            JobStage::Writing => write!(f, "artifact writing"),
        }
    }
}

/// Error types for change-detection processing
#[derive(Debug, thiserror::Error)]
pub enum VegError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid raster format: {0}")]
    Format(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Jobs did not finish within {after:?}")]
    Timeout { after: Duration },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("{time_point} job ({id}) failed during {stage}: {source}")]
    Job {
        stage: JobStage,
        time_point: TimePoint,
        id: String,
        #[source]
        source: Box<VegError>,
    },
}

impl VegError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        VegError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Result type for change-detection operations
pub type VegResult<T> = Result<T, VegError>;
