use crate::types::{Band, GeoTransform, VegError, VegResult};
use gdal::Dataset;
use ndarray::Array2;
use std::path::Path;

/// Single-band raster reader
pub struct BandReader;

impl BandReader {
    /// Read band 1 of a georeferenced raster, widening samples to f32.
    ///
    /// Samples equal to the declared nodata value come back as NaN.
    pub fn read_band<P: AsRef<Path>>(path: P) -> VegResult<Band> {
        let path = path.as_ref();
        log::info!("Reading band from: {}", path.display());

        // GDAL reports a missing file as a generic open failure
        std::fs::metadata(path).map_err(|e| VegError::io(path, e))?;

        let dataset = Dataset::open(path).map_err(|e| {
            VegError::Format(format!("Cannot open {} as a raster: {}", path.display(), e))
        })?;

        if dataset.raster_count() < 1 {
            return Err(VegError::Format(format!(
                "{} contains no raster bands",
                path.display()
            )));
        }

        let (width, height) = dataset.raster_size();
        if width == 0 || height == 0 {
            return Err(VegError::Format(format!(
                "{} has an empty raster ({}x{})",
                path.display(),
                width,
                height
            )));
        }

        // Rasters without georeferencing still load, on a unit grid
        let geo_transform = match dataset.geo_transform() {
            Ok(gt) => GeoTransform::from_gdal(gt),
            Err(e) => {
                log::warn!("No geotransform in {} ({}), using unit grid", path.display(), e);
                GeoTransform::unit()
            }
        };
        let crs = dataset.projection();

        log::debug!("Band size: {}x{}", width, height);
        log::debug!("Band geotransform: {:?}", geo_transform);

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value();
        let buffer = rasterband
            .read_as::<f32>((0, 0), (width, height), (width, height), None)
            .map_err(|e| {
                VegError::Format(format!(
                    "Unsupported pixel encoding in {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let mut data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| VegError::Format(format!("Failed to reshape band data: {}", e)))?;

        if let Some(nd) = nodata {
            let nd = nd as f32;
            let mut masked = 0usize;
            data.mapv_inplace(|v| {
                if v == nd {
                    masked += 1;
                    f32::NAN
                } else {
                    v
                }
            });
            log::debug!("Nodata value {} -> NaN on {} pixels", nd, masked);
        }

        Ok(Band {
            data,
            geo_transform,
            crs,
            nodata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::RasterWriter;

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BandReader::read_band("/definitely/not/here/band4.TIF").unwrap_err();
        match err {
            VegError::Io { path, .. } => assert!(path.ends_with("band4.TIF")),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_raster_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band4.TIF");
        std::fs::write(&path, b"not a tiff").unwrap();

        let err = BandReader::read_band(&path).unwrap_err();
        assert!(matches!(err, VegError::Format(_)));
    }

    #[test]
    fn test_reads_back_written_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.TIF");
        let gt = GeoTransform {
            top_left_x: 500_000.0,
            pixel_width: 30.0,
            rotation_x: 0.0,
            top_left_y: 4_200_000.0,
            rotation_y: 0.0,
            pixel_height: -30.0,
        };
        let data = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        RasterWriter::write_f32(&path, &data, &gt, "", None).unwrap();
        let band = BandReader::read_band(&path).unwrap();

        assert_eq!(band.dim(), (2, 3));
        assert_eq!(band.data, data);
        assert_eq!(band.geo_transform, gt);
    }

    #[test]
    fn test_nodata_becomes_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.TIF");
        let data = Array2::from_shape_vec((2, 2), vec![0.0, 0.2, 0.3, 0.0]).unwrap();

        RasterWriter::write_f32(&path, &data, &GeoTransform::unit(), "", Some(0.0)).unwrap();
        let band = BandReader::read_band(&path).unwrap();

        assert_eq!(band.nodata, Some(0.0));
        assert!(band.data[[0, 0]].is_nan());
        assert!(band.data[[1, 1]].is_nan());
        assert_eq!(band.data[[0, 1]], 0.2);
        assert_eq!(band.valid_count(), 2);
    }
}
