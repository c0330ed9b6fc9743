use crate::config::{NormalizationMethod, ProcessingConfig};
use crate::data::model::Spectrum;
use crate::error::{MsiError, Result};
use crate::processing::stats;

/// Per-spectrum normalization, with the parameters fixed for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub method: NormalizationMethod,
    pub reference_mz: f64,
    pub tolerance: f64,
}

impl Normalizer {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Normalizer {
            method: config.normalization_method,
            reference_mz: config.reference_mz(),
            tolerance: config.reference_tolerance,
        }
    }

    /// The factor the intensities get multiplied by.
    ///
    /// Fails with `DegenerateSpectrum` when the statistic is zero, and with
    /// `ReferenceNotFound` when no peak lies within the reference window.
    pub fn factor(&self, spectrum: &Spectrum) -> Result<f64> {
        let (name, denominator) = match self.method {
            NormalizationMethod::None => return Ok(1.0),
            NormalizationMethod::Tic => ("total ion current", spectrum.tic()),
            NormalizationMethod::Rms => {
                let mean_sq = spectrum.intensity.iter().map(|v| v * v).sum::<f64>()
                    / spectrum.len().max(1) as f64;
                ("root mean square", mean_sq.sqrt())
            }
            NormalizationMethod::Median => (
                "median intensity",
                stats::median(&spectrum.intensity).unwrap_or(0.0),
            ),
            NormalizationMethod::ReferencePeak => {
                let idx = spectrum
                    .nearest_peak(self.reference_mz, self.tolerance)
                    .ok_or(MsiError::ReferenceNotFound {
                        mz: self.reference_mz,
                        tolerance: self.tolerance,
                    })?;
                ("reference peak intensity", spectrum.intensity[idx])
            }
        };
        if denominator > 0.0 && denominator.is_finite() {
            Ok(1.0 / denominator)
        } else {
            Err(MsiError::DegenerateSpectrum(format!("{name} is {denominator}")))
        }
    }

    pub fn apply(&self, spectrum: &Spectrum) -> Result<Spectrum> {
        if self.method == NormalizationMethod::None {
            return Ok(spectrum.clone());
        }
        let factor = self.factor(spectrum)?;
        Ok(spectrum.scaled(factor))
    }
}
