use crate::types::{SampleGrid, VegError, VegResult};
use image::GrayImage;
use std::path::Path;

/// 8-bit PNG previews of float rasters
pub struct Quicklook;

impl Quicklook {
    /// Min/max-stretch finite samples to 0..=255. NaN pixels and
    /// constant rasters render as 0.
    pub fn normalize(data: &SampleGrid) -> Vec<u8> {
        let (min, max) = data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let range = max - min;
        data.iter()
            .map(|&v| {
                if !v.is_finite() || !range.is_finite() || range <= 0.0 {
                    0
                } else {
                    ((v - min) / range * 255.0) as u8
                }
            })
            .collect()
    }

    pub fn save_png<P: AsRef<Path>>(data: &SampleGrid, output_path: P) -> VegResult<()> {
        let (height, width) = data.dim();
        let pixels = Self::normalize(data);

        let img = GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            VegError::Data(format!("Quicklook buffer does not match {}x{}", width, height))
        })?;
        img.save(output_path.as_ref())?;

        log::info!("Saved PNG: {}", output_path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_stretch_spans_full_range() {
        let data = array![[-1.0, 0.0], [1.0, f32::NAN]];
        let pixels = Quicklook::normalize(&data);
        assert_eq!(pixels, vec![0, 127, 255, 0]);
    }

    #[test]
    fn test_constant_raster_is_black() {
        let data = SampleGrid::from_elem((3, 3), 0.4);
        assert!(Quicklook::normalize(&data).iter().all(|&p| p == 0));
    }

    #[test]
    fn test_all_nan_raster_is_black() {
        let data = SampleGrid::from_elem((2, 2), f32::NAN);
        assert_eq!(Quicklook::normalize(&data), vec![0; 4]);
    }

    #[test]
    fn test_png_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndvi.png");
        let data = SampleGrid::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f32);

        Quicklook::save_png(&data, &path).unwrap();

        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (6, 4));
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(5, 3)[0], 255);
    }
}
