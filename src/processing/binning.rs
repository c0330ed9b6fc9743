use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::data::model::{Pixel, Spectrum, SpectrumSet};

/// Decimal places the m/z axis is rounded to by default.
pub const DEFAULT_DECIMALS: u32 = 4;

/// Key of an m/z bin: the m/z scaled by `10^decimals` and rounded.
fn bin_key(mz: f64, scale: f64) -> i64 {
    (mz * scale).round() as i64
}

/// Round every m/z to `decimals` places and align all spectra on the union
/// of bins. Intensities sharing a bin are summed; missing bins are 0.
pub fn bin_to_common_axis(set: &SpectrumSet, decimals: u32) -> SpectrumSet {
    let scale = 10f64.powi(decimals as i32);

    let binned: Vec<(Pixel, BTreeMap<i64, f64>)> = set
        .spectra
        .par_iter()
        .map(|(pixel, sp)| {
            let mut bins = BTreeMap::new();
            for (mz, i) in sp.pairs() {
                *bins.entry(bin_key(mz, scale)).or_insert(0.0) += i;
            }
            (*pixel, bins)
        })
        .collect();

    let axis: BTreeSet<i64> = binned
        .iter()
        .flat_map(|(_, bins)| bins.keys().copied())
        .collect();
    let mz: Vec<f64> = axis.iter().map(|&k| k as f64 / scale).collect();

    let spectra = binned
        .into_par_iter()
        .map(|(pixel, bins)| {
            let intensity = axis
                .iter()
                .map(|k| bins.get(k).copied().unwrap_or(0.0))
                .collect();
            (
                pixel,
                Spectrum {
                    mz: mz.clone(),
                    intensity,
                },
            )
        })
        .collect();
    set.with_spectra(spectra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::aggregate::mean_spectrum;

    #[test]
    fn aligns_on_rounded_union_axis() {
        let set: SpectrumSet = [
            (
                Pixel::new(0, 0),
                Spectrum::from_pairs(&[(100.00001, 1.0), (100.00002, 1.0), (200.0, 2.0)]).unwrap(),
            ),
            (
                Pixel::new(0, 1),
                Spectrum::from_pairs(&[(150.0, 4.0)]).unwrap(),
            ),
        ]
        .into_iter()
        .collect();

        let binned = bin_to_common_axis(&set, DEFAULT_DECIMALS);
        let a = binned.get(&Pixel::new(0, 0)).unwrap();
        let b = binned.get(&Pixel::new(0, 1)).unwrap();
        assert_eq!(a.mz, vec![100.0, 150.0, 200.0]);
        assert_eq!(a.mz, b.mz);
        assert_eq!(a.intensity, vec![2.0, 0.0, 2.0]);
        assert_eq!(b.intensity, vec![0.0, 4.0, 0.0]);

        let mean = mean_spectrum(&binned, None).unwrap();
        assert_eq!(mean.spectrum.intensity, vec![1.0, 2.0, 1.0]);
    }
}
