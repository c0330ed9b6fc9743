use crate::data::model::Spectrum;
use crate::error::{MsiError, Result};

/// Drop every peak whose intensity is below `pct`% of the spectrum maximum.
///
/// `pct == 0` returns the spectrum unchanged and `pct == 100` returns an
/// empty spectrum.
pub fn reduce_noise(spectrum: &Spectrum, pct: f64) -> Result<Spectrum> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(MsiError::InvalidConfig(format!(
            "noise reduction percentage must be within [0, 100], got {pct}"
        )));
    }
    if pct == 0.0 {
        return Ok(spectrum.clone());
    }
    if pct == 100.0 {
        return Ok(Spectrum::empty());
    }
    let Some(max) = spectrum.max_intensity() else {
        return Ok(Spectrum::empty());
    };
    let limit = pct / 100.0 * max;

    let (mz, intensity) = spectrum
        .pairs()
        .filter(|&(_, i)| i >= limit)
        .unzip();
    Ok(Spectrum { mz, intensity })
}
