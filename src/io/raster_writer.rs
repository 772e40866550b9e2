use crate::types::{ChangeRaster, GeoTransform, IndexRaster, SampleGrid, VegResult};
use gdal::DriverManager;
use std::path::Path;

/// GeoTIFF writer for index and change rasters
pub struct RasterWriter;

impl RasterWriter {
    /// Write a single-band float32 GeoTIFF
    pub fn write_f32<P: AsRef<Path>>(
        output_path: P,
        data: &SampleGrid,
        transform: &GeoTransform,
        crs: &str,
        nodata: Option<f64>,
    ) -> VegResult<()> {
        log::debug!("Writing GeoTIFF: {}", output_path.as_ref().display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = data.dim();

        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path.as_ref(),
            width as isize,
            height as isize,
            1,
        )?;

        dataset.set_geo_transform(&transform.to_gdal())?;
        if !crs.is_empty() {
            dataset.set_projection(crs)?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<f32> = data.iter().cloned().collect();
        let buffer = gdal::raster::Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;

        if let Some(nd) = nodata {
            rasterband.set_no_data_value(Some(nd))?;
        }

        Ok(())
    }

    /// Write an index raster; invalid pixels are tagged as NaN nodata
    pub fn write_index<P: AsRef<Path>>(output_path: P, raster: &IndexRaster) -> VegResult<()> {
        Self::write_f32(
            output_path,
            &raster.data,
            &raster.geo_transform,
            &raster.crs,
            Some(f64::NAN),
        )
    }

    pub fn write_change<P: AsRef<Path>>(output_path: P, raster: &ChangeRaster) -> VegResult<()> {
        Self::write_f32(
            output_path,
            &raster.data,
            &raster.geo_transform,
            &raster.crs,
            Some(f64::NAN),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IndexKind, TimePoint};
    use ndarray::array;

    #[test]
    fn test_writes_nan_pixels_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndvi.TIF");
        let raster = IndexRaster {
            kind: IndexKind::NDVI,
            time_point: TimePoint::Old,
            data: array![[0.5, f32::NAN], [-0.25, 1.0]],
            geo_transform: GeoTransform::unit(),
            crs: String::new(),
        };

        RasterWriter::write_index(&path, &raster).unwrap();

        let dataset = gdal::Dataset::open(&path).unwrap();
        assert_eq!(dataset.raster_size(), (2, 2));
        let band = dataset.rasterband(1).unwrap();
        let values = band.read_as::<f32>((0, 0), (2, 2), (2, 2), None).unwrap().data;
        assert_eq!(values[0], 0.5);
        assert!(values[1].is_nan());
        assert_eq!(values[2], -0.25);
    }
}
