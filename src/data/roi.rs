use std::collections::BTreeSet;

use super::model::{Pixel, RoiMask, Spectrum, SpectrumSet};

// ---------------------------------------------------------------------------
// Building masks
// ---------------------------------------------------------------------------

impl RoiMask {
    pub fn new() -> Self {
        RoiMask::default()
    }

    /// Every non-zero cell of a painted label raster (`rows[y][x]`).
    pub fn from_labels<L: Copy + Default + PartialEq>(rows: &[Vec<L>]) -> Self {
        let zero = L::default();
        let pixels = rows
            .iter()
            .enumerate()
            .flat_map(|(y, row)| {
                row.iter()
                    .enumerate()
                    .filter(move |&(_, &label)| label != zero)
                    .map(move |(x, _)| Pixel::new(x as u32, y as u32))
            })
            .collect();
        RoiMask { pixels }
    }

    /// All pixels in the inclusive rectangle spanned by two corners.
    pub fn rectangle(a: Pixel, b: Pixel) -> Self {
        let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
        let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
        let pixels = (x0..=x1)
            .flat_map(|x| (y0..=y1).map(move |y| Pixel::new(x, y)))
            .collect();
        RoiMask { pixels }
    }

    pub fn insert(&mut self, pixel: Pixel) -> bool {
        self.pixels.insert(pixel)
    }

    pub fn remove(&mut self, pixel: &Pixel) -> bool {
        self.pixels.remove(pixel)
    }

    /// Toggle a single pixel (paint / erase).
    pub fn toggle(&mut self, pixel: Pixel) {
        if !self.pixels.remove(&pixel) {
            self.pixels.insert(pixel);
        }
    }

    pub fn extend(&mut self, other: &RoiMask) {
        self.pixels.extend(other.pixels.iter().copied());
    }

    pub fn clear(&mut self) {
        self.pixels.clear();
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn contains(&self, pixel: &Pixel) -> bool {
        self.pixels.contains(pixel)
    }
}

impl FromIterator<Pixel> for RoiMask {
    fn from_iter<I: IntoIterator<Item = Pixel>>(iter: I) -> Self {
        RoiMask {
            pixels: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolving masks against a dataset
// ---------------------------------------------------------------------------

/// Spectra of `set` under `mask`, in pixel order.
///
/// Pixels outside the acquisition (background painted by the user) are
/// skipped.
pub fn resolve<'a>(
    mask: &'a RoiMask,
    set: &'a SpectrumSet,
) -> impl Iterator<Item = (&'a Pixel, &'a Spectrum)> + 'a {
    mask.pixels
        .iter()
        .filter_map(|p| set.spectra.get_key_value(p))
}

/// Pixels of `set` not covered by `mask`.
pub fn complement(mask: &RoiMask, set: &SpectrumSet) -> RoiMask {
    let pixels: BTreeSet<Pixel> = set
        .pixels()
        .filter(|p| !mask.contains(p))
        .copied()
        .collect();
    RoiMask { pixels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_to_mask() {
        let labels = vec![vec![0u8, 1, 0], vec![2, 0, 0]];
        let mask = RoiMask::from_labels(&labels);
        assert_eq!(
            mask.pixels.into_iter().collect::<Vec<_>>(),
            vec![Pixel::new(0, 1), Pixel::new(1, 0)]
        );
    }

    #[test]
    fn rectangle_is_inclusive_and_order_free() {
        let mask = RoiMask::rectangle(Pixel::new(2, 3), Pixel::new(1, 1));
        assert_eq!(mask.len(), 6);
        assert!(mask.contains(&Pixel::new(1, 3)));
        assert!(!mask.contains(&Pixel::new(0, 1)));
    }

    #[test]
    fn toggle_paints_and_erases() {
        let mut mask = RoiMask::new();
        mask.toggle(Pixel::new(1, 1));
        assert!(mask.contains(&Pixel::new(1, 1)));
        mask.toggle(Pixel::new(1, 1));
        assert!(mask.is_empty());
    }

    #[test]
    fn resolve_skips_background() {
        let set: SpectrumSet = [
            (Pixel::new(0, 0), Spectrum::empty()),
            (Pixel::new(1, 0), Spectrum::empty()),
        ]
        .into_iter()
        .collect();
        let mask: RoiMask = [Pixel::new(1, 0), Pixel::new(5, 5)].into_iter().collect();
        let resolved: Vec<Pixel> = resolve(&mask, &set).map(|(p, _)| *p).collect();
        assert_eq!(resolved, vec![Pixel::new(1, 0)]);
        assert_eq!(
            complement(&mask, &set).pixels.into_iter().collect::<Vec<_>>(),
            vec![Pixel::new(0, 0)]
        );
    }
}
