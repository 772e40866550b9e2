//! Core change-detection processing modules

pub mod atmospheric;
pub mod change;
pub mod classify;
pub mod cloud_mask;
pub mod indices;

// Re-export main types
pub use atmospheric::{nan_percentile, DarkObjectCorrector, DarkObjectParams};
pub use change::ChangeComparator;
pub use classify::{percentage, ClassifierParams, DeforestationClassifier};
pub use cloud_mask::CloudShadowMasker;
pub use indices::{ndvi_pixel, savi_pixel, IndexCalculator};
