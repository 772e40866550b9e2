use crate::types::{Band, IndexKind, IndexRaster, SampleGrid, TimePoint, VegError, VegResult};
use ndarray::Zip;

/// Ratio that yields NaN instead of ±inf when the denominator is zero.
#[inline]
fn safe_ratio(num: f32, den: f32) -> f32 {
    if den == 0.0 {
        f32::NAN
    } else {
        num / den
    }
}

/// `(nir - red) / (nir + red)`
#[inline]
pub fn ndvi_pixel(red: f32, nir: f32) -> f32 {
    safe_ratio(nir - red, nir + red)
}

/// `((nir - red) / (nir + red + L)) * (1 + L)`
#[inline]
pub fn savi_pixel(red: f32, nir: f32, soil_adjustment: f32) -> f32 {
    safe_ratio(nir - red, nir + red + soil_adjustment) * (1.0 + soil_adjustment)
}

/// NDVI / SAVI calculator
pub struct IndexCalculator {
    /// SAVI soil-adjustment factor `L`
    soil_adjustment: f32,
}

impl IndexCalculator {
    pub fn new(soil_adjustment: f32) -> Self {
        Self { soil_adjustment }
    }

    /// Compute NDVI and SAVI from corrected (and masked) red/NIR bands.
    ///
    /// Undefined ratios become NaN; they are not errors.
    pub fn indices(
        &self,
        red: &Band,
        nir: &Band,
        time_point: TimePoint,
    ) -> VegResult<(IndexRaster, IndexRaster)> {
        if red.dim() != nir.dim() {
            return Err(VegError::Data(format!(
                "Red band {:?} and NIR band {:?} differ in shape",
                red.dim(),
                nir.dim()
            )));
        }

        log::info!(
            "Computing NDVI/SAVI for {} time point ({}x{}, L={})",
            time_point,
            red.dim().0,
            red.dim().1,
            self.soil_adjustment
        );

        let l = self.soil_adjustment;
        let ndvi = Self::apply(&red.data, &nir.data, ndvi_pixel);
        let savi = Self::apply(&red.data, &nir.data, move |r, n| savi_pixel(r, n, l));

        let wrap = |kind, data| IndexRaster {
            kind,
            time_point,
            data,
            geo_transform: red.geo_transform,
            crs: red.crs.clone(),
        };

        Ok((wrap(IndexKind::NDVI, ndvi), wrap(IndexKind::SAVI, savi)))
    }

    #[cfg(feature = "parallel")]
    fn apply<F>(red: &SampleGrid, nir: &SampleGrid, f: F) -> SampleGrid
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        Zip::from(red).and(nir).par_map_collect(|&r, &n| f(r, n))
    }

    #[cfg(not(feature = "parallel"))]
    fn apply<F>(red: &SampleGrid, nir: &SampleGrid, f: F) -> SampleGrid
    where
        F: Fn(f32, f32) -> f32,
    {
        Zip::from(red).and(nir).map_collect(|&r, &n| f(r, n))
    }
}
