use crate::types::{ChangeRaster, ClassificationResult, IndexKind, VegError, VegResult};

/// Threshold parameters for the dual-index deforestation test
#[derive(Debug, Clone)]
pub struct ClassifierParams {
    pub ndvi_threshold: f32,
    pub savi_threshold: f32,
    /// Percentage above which a run is flagged
    pub alert_threshold: f64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            ndvi_threshold: -0.2,
            savi_threshold: -0.2,
            alert_threshold: 5.0,
        }
    }
}

/// Deforestation classifier
///
/// A pixel is deforested only when both NDVI and SAVI changes fall below
/// their thresholds. NaN changes never qualify.
pub struct DeforestationClassifier {
    params: ClassifierParams,
}

impl DeforestationClassifier {
    pub fn new(params: ClassifierParams) -> Self {
        Self { params }
    }

    pub fn classify(
        &self,
        ndvi_change: &ChangeRaster,
        savi_change: &ChangeRaster,
    ) -> VegResult<ClassificationResult> {
        if ndvi_change.kind != IndexKind::NDVI || savi_change.kind != IndexKind::SAVI {
            return Err(VegError::Config(format!(
                "Expected NDVI and SAVI change rasters, got {} and {}",
                ndvi_change.kind, savi_change.kind
            )));
        }
        if ndvi_change.dim() != savi_change.dim() {
            return Err(VegError::Data(format!(
                "NDVI change {:?} and SAVI change {:?} differ in shape",
                ndvi_change.dim(),
                savi_change.dim()
            )));
        }

        let ndvi_t = self.params.ndvi_threshold;
        let savi_t = self.params.savi_threshold;
        let deforested_pixels = ndvi_change
            .data
            .iter()
            .zip(savi_change.data.iter())
            .filter(|&(&n, &s)| n < ndvi_t && s < savi_t)
            .count();
        let total_pixels = ndvi_change.data.len();

        let deforestation_percentage = percentage(deforested_pixels, total_pixels);
        let alert = deforestation_percentage > self.params.alert_threshold;

        log::info!(
            "Deforestation detected in {:.2}% of the area ({} of {} pixels)",
            deforestation_percentage,
            deforested_pixels,
            total_pixels
        );
        if alert {
            log::warn!(
                "Deforestation exceeds alert threshold of {}%",
                self.params.alert_threshold
            );
        }

        Ok(ClassificationResult {
            deforestation_percentage,
            alert,
            deforested_pixels,
            total_pixels,
            ndvi_change: ndvi_change.provenance.clone(),
            savi_change: savi_change.provenance.clone(),
        })
    }
}

/// `100 * count / total`, rounded to two decimal places
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    // Ties go to the even hundredth
    (raw * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeProvenance, GeoTransform, TimePoint};
    use ndarray::{array, Array2};

    fn change(kind: IndexKind, data: Array2<f32>) -> ChangeRaster {
        let (rows, cols) = data.dim();
        ChangeRaster {
            kind,
            data,
            geo_transform: GeoTransform::unit(),
            crs: String::new(),
            provenance: ChangeProvenance {
                kind,
                old: TimePoint::Old,
                new: TimePoint::New,
                rows,
                cols,
            },
        }
    }

    fn classifier(alert_threshold: f64) -> DeforestationClassifier {
        DeforestationClassifier::new(ClassifierParams {
            ndvi_threshold: -0.2,
            savi_threshold: -0.2,
            alert_threshold,
        })
    }

    #[test]
    fn test_half_the_pixels_deforested() {
        let ndvi = change(IndexKind::NDVI, array![[-0.5, -0.5], [0.0, 0.0]]);
        let savi = change(IndexKind::SAVI, array![[-0.5, -0.5], [0.0, 0.0]]);

        let result = classifier(5.0).classify(&ndvi, &savi).unwrap();
        assert_eq!(result.deforestation_percentage, 50.0);
        assert_eq!(result.deforested_pixels, 2);
        assert_eq!(result.total_pixels, 4);
        assert!(result.alert);
    }

    #[test]
    fn test_both_indices_must_decline() {
        let ndvi = change(IndexKind::NDVI, array![[-0.5, -0.5], [-0.5, 0.0]]);
        let savi = change(IndexKind::SAVI, array![[-0.5, 0.0], [-0.1, -0.5]]);

        let result = classifier(5.0).classify(&ndvi, &savi).unwrap();
        assert_eq!(result.deforested_pixels, 1);
        assert_eq!(result.deforestation_percentage, 25.0);
    }

    #[test]
    fn test_nan_pixels_never_qualify() {
        let ndvi = change(IndexKind::NDVI, Array2::from_elem((2, 2), f32::NAN));
        let savi = change(IndexKind::SAVI, Array2::from_elem((2, 2), -1.0));

        let result = classifier(5.0).classify(&ndvi, &savi).unwrap();
        assert_eq!(result.deforestation_percentage, 0.0);
        assert!(!result.alert);
    }

    #[test]
    fn test_alert_boundary_is_strict() {
        let ndvi = change(IndexKind::NDVI, array![[-0.5]]);
        let savi = change(IndexKind::SAVI, array![[-0.5]]);

        // 100% equal to the threshold: no alert
        assert!(!classifier(100.0).classify(&ndvi, &savi).unwrap().alert);
        // One step below the percentage: alert
        assert!(classifier(99.99).classify(&ndvi, &savi).unwrap().alert);

        let quiet = change(IndexKind::NDVI, array![[0.0]]);
        let result = classifier(0.0).classify(&quiet, &savi).unwrap();
        assert_eq!(result.deforestation_percentage, 0.0);
        assert!(!result.alert);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(1, 7), 14.29);
        assert_eq!(percentage(0, 0), 0.0);
        // Exact halves
        assert_eq!(percentage(1, 800), 0.12);
        assert_eq!(percentage(3, 800), 0.38);
        assert_eq!(percentage(5, 800), 0.62);
    }

    #[test]
    fn test_swapped_kinds_is_config_error() {
        let ndvi = change(IndexKind::NDVI, Array2::zeros((2, 2)));
        let savi = change(IndexKind::SAVI, Array2::zeros((2, 2)));
        assert!(matches!(
            classifier(5.0).classify(&savi, &ndvi),
            Err(VegError::Config(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_is_data_error() {
        let ndvi = change(IndexKind::NDVI, Array2::zeros((2, 2)));
        let savi = change(IndexKind::SAVI, Array2::zeros((2, 3)));
        assert!(matches!(
            classifier(5.0).classify(&ndvi, &savi),
            Err(VegError::Data(_))
        ));
    }
}
