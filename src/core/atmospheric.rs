use crate::types::{Band, VegError, VegResult};
use num_traits::Float;

/// Dark-object subtraction parameters
#[derive(Debug, Clone)]
pub struct DarkObjectParams {
    /// Percentile of finite samples taken as the haze offset
    pub percentile: f64,
}

impl Default for DarkObjectParams {
    fn default() -> Self {
        Self { percentile: 1.0 }
    }
}

/// Atmospheric corrector using Dark Object Subtraction (DOS)
pub struct DarkObjectCorrector {
    params: DarkObjectParams,
}

impl DarkObjectCorrector {
    pub fn new(params: DarkObjectParams) -> Self {
        Self { params }
    }

    /// Create corrector with the 1st-percentile offset
    pub fn standard() -> Self {
        Self::new(DarkObjectParams::default())
    }

    /// Subtract the scene dark-object value and clamp negatives to zero.
    /// NaN samples stay NaN.
    pub fn correct(&self, band: &Band) -> VegResult<Band> {
        let offset = nan_percentile(band.data.iter().copied(), self.params.percentile)
            .ok_or_else(|| {
                VegError::Data(
                    "Cannot estimate dark-object offset: band has no finite pixels".to_string(),
                )
            })?;

        log::debug!(
            "Dark-object offset (p{}): {}",
            self.params.percentile,
            offset
        );

        let corrected = band.data.mapv(|v| {
            let c = v - offset;
            if c < 0.0 {
                0.0
            } else {
                c
            }
        });

        Ok(band.with_data(corrected))
    }
}

/// Percentile of the finite values using linear interpolation between
/// order statistics. `None` when no value is finite.
pub fn nan_percentile<T: Float>(values: impl Iterator<Item = T>, q: f64) -> Option<T> {
    let mut finite: Vec<T> = values.filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (finite.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = T::from(rank - lo as f64)?;

    Some(finite[lo] + (finite[hi] - finite[lo]) * frac)
}
