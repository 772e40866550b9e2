use crate::types::{Band, VegError, VegResult};
use ndarray::Zip;

/// Brightness-threshold cloud and shadow masker
///
/// Must run on atmospherically corrected bands, since correction shifts
/// the brightness scale.
pub struct CloudShadowMasker {
    brightness_threshold: f32,
}

impl CloudShadowMasker {
    pub fn new(brightness_threshold: f32) -> Self {
        Self {
            brightness_threshold,
        }
    }

    /// Invalidate pixels in both bands where `(red + nir) / 2` exceeds the
    /// threshold. Shapes are preserved.
    pub fn mask(&self, red: &Band, nir: &Band) -> VegResult<(Band, Band)> {
        if red.dim() != nir.dim() {
            return Err(VegError::Data(format!(
                "Red band {:?} and NIR band {:?} differ in shape",
                red.dim(),
                nir.dim()
            )));
        }

        let mut red_out = red.data.clone();
        let mut nir_out = nir.data.clone();
        let threshold = self.brightness_threshold;
        let mut masked = 0usize;

        Zip::from(&mut red_out).and(&mut nir_out).for_each(|r, n| {
            if (*r + *n) / 2.0 > threshold {
                *r = f32::NAN;
                *n = f32::NAN;
                masked += 1;
            }
        });

        let total = red_out.len();
        let fraction = masked as f64 / total as f64;
        log::debug!(
            "Cloud/shadow mask: {} of {} pixels ({:.2}%) above brightness {}",
            masked,
            total,
            fraction * 100.0,
            threshold
        );
        if fraction > 0.5 {
            log::warn!("More than half of the scene is masked as cloud/shadow");
        }

        Ok((red.with_data(red_out), nir.with_data(nir_out)))
    }
}
