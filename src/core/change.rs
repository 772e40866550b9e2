use crate::types::{ChangeProvenance, ChangeRaster, IndexRaster, VegError, VegResult};
use ndarray::s;

/// Temporal differencing of two same-kind index rasters
///
/// Rasters are aligned by pixel index from the top-left corner. Both inputs
/// must sit on the same grid (CRS, origin, pixel size, rotation); they may
/// differ in row/column count, in which case the shared extent is used.
pub struct ChangeComparator;

impl ChangeComparator {
    pub fn compare(old: &IndexRaster, new: &IndexRaster) -> VegResult<ChangeRaster> {
        if old.kind != new.kind {
            return Err(VegError::Config(format!(
                "Cannot compare {} against {}",
                old.kind, new.kind
            )));
        }

        Self::check_same_grid(old, new)?;

        let (old_rows, old_cols) = old.dim();
        let (new_rows, new_cols) = new.dim();
        let rows = old_rows.min(new_rows);
        let cols = old_cols.min(new_cols);

        if (old_rows, old_cols) != (new_rows, new_cols) {
            log::warn!(
                "{} extents differ ({}x{} vs {}x{}), cropping to {}x{}",
                old.kind,
                old_rows,
                old_cols,
                new_rows,
                new_cols,
                rows,
                cols
            );
        }

        let data = &new.data.slice(s![..rows, ..cols]) - &old.data.slice(s![..rows, ..cols]);

        log::info!("Computed {} change over {}x{} pixels", old.kind, rows, cols);

        Ok(ChangeRaster {
            kind: old.kind,
            data,
            // Cropping at (0, 0) leaves the origin untouched
            geo_transform: old.geo_transform,
            crs: old.crs.clone(),
            provenance: ChangeProvenance {
                kind: old.kind,
                old: old.time_point,
                new: new.time_point,
                rows,
                cols,
            },
        })
    }

    fn check_same_grid(old: &IndexRaster, new: &IndexRaster) -> VegResult<()> {
        if old.crs != new.crs {
            return Err(VegError::Config(format!(
                "{} rasters use different coordinate reference systems",
                old.kind
            )));
        }
        if !old.geo_transform.same_grid(&new.geo_transform) {
            return Err(VegError::Config(format!(
                "{} rasters are not co-registered: {:?} vs {:?}",
                old.kind, old.geo_transform, new.geo_transform
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, IndexKind, TimePoint};
    use ndarray::{array, Array2};

    fn raster(kind: IndexKind, time_point: TimePoint, data: Array2<f32>) -> IndexRaster {
        IndexRaster {
            kind,
            time_point,
            data,
            geo_transform: GeoTransform::unit(),
            crs: String::new(),
        }
    }

    #[test]
    fn test_difference_is_new_minus_old() {
        let old = raster(IndexKind::NDVI, TimePoint::Old, array![[0.8, 0.6], [0.5, f32::NAN]]);
        let new = raster(IndexKind::NDVI, TimePoint::New, array![[0.3, 0.6], [0.7, 0.1]]);

        let change = ChangeComparator::compare(&old, &new).unwrap();
        assert_eq!(change.dim(), (2, 2));
        assert!((change.data[[0, 0]] + 0.5).abs() < 1e-6);
        assert_eq!(change.data[[0, 1]], 0.0);
        assert!(change.data[[1, 1]].is_nan());
        assert_eq!(change.provenance.old, TimePoint::Old);
        assert_eq!(change.provenance.new, TimePoint::New);
    }

    #[test]
    fn test_overlap_shape() {
        let old = raster(IndexKind::SAVI, TimePoint::Old, Array2::from_elem((3, 3), 0.5));
        let new = raster(IndexKind::SAVI, TimePoint::New, Array2::from_elem((2, 4), 0.25));

        let change = ChangeComparator::compare(&old, &new).unwrap();
        assert_eq!(change.dim(), (2, 3));
        assert_eq!((change.provenance.rows, change.provenance.cols), (2, 3));
        assert!(change.data.iter().all(|&v| v == -0.25));
    }

    #[test]
    fn test_crop_anchored_top_left() {
        let old = raster(
            IndexKind::NDVI,
            TimePoint::Old,
            Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f32),
        );
        let new = raster(IndexKind::NDVI, TimePoint::New, Array2::zeros((2, 2)));

        let change = ChangeComparator::compare(&old, &new).unwrap();
        assert_eq!(change.data, array![[0.0f32, -1.0], [-3.0, -4.0]]);
    }

    #[test]
    fn test_kind_mismatch_is_config_error() {
        let old = raster(IndexKind::NDVI, TimePoint::Old, Array2::zeros((2, 2)));
        let new = raster(IndexKind::SAVI, TimePoint::New, Array2::zeros((2, 2)));
        assert!(matches!(
            ChangeComparator::compare(&old, &new),
            Err(VegError::Config(_))
        ));
    }

    #[test]
    fn test_shifted_origin_is_config_error() {
        let old = raster(IndexKind::NDVI, TimePoint::Old, Array2::zeros((2, 2)));
        let mut new = raster(IndexKind::NDVI, TimePoint::New, Array2::zeros((2, 2)));
        new.geo_transform.top_left_x += 30.0;

        assert!(matches!(
            ChangeComparator::compare(&old, &new),
            Err(VegError::Config(_))
        ));
    }

    #[test]
    fn test_crs_mismatch_is_config_error() {
        let old = raster(IndexKind::NDVI, TimePoint::Old, Array2::zeros((2, 2)));
        let mut new = raster(IndexKind::NDVI, TimePoint::New, Array2::zeros((2, 2)));
        new.crs = "EPSG:4326".to_string();

        assert!(matches!(
            ChangeComparator::compare(&old, &new),
            Err(VegError::Config(_))
        ));
    }
}
