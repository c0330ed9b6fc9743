use image::Rgba;
use palette::{LinSrgb, Mix, Srgb};

// ---------------------------------------------------------------------------
// Sequential colour maps for ion images
// ---------------------------------------------------------------------------

/// Piecewise-linear colour gradient, interpolated in linear RGB.
#[derive(Debug, Clone)]
pub struct ColorMap {
    pub name: &'static str,
    stops: Vec<LinSrgb>,
}

fn linear(r: u8, g: u8, b: u8) -> LinSrgb {
    Srgb::new(r, g, b).into_format::<f32>().into_linear()
}

impl ColorMap {
    /// Dark purple → orange → pale yellow, perceptually ordered.
    pub fn inferno() -> Self {
        ColorMap {
            name: "inferno",
            stops: vec![
                linear(0x00, 0x00, 0x04),
                linear(0x42, 0x0a, 0x68),
                linear(0x93, 0x26, 0x67),
                linear(0xdd, 0x51, 0x3a),
                linear(0xfc, 0xa5, 0x0a),
                linear(0xfc, 0xff, 0xa4),
            ],
        }
    }

    pub fn grey() -> Self {
        ColorMap {
            name: "grey",
            stops: vec![linear(0, 0, 0), linear(255, 255, 255)],
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "inferno" => Some(Self::inferno()),
            "grey" | "gray" => Some(Self::grey()),
            _ => None,
        }
    }

    /// Colour at `t` in [0, 1]; values outside are clamped, NaN maps to 0.
    pub fn color_at(&self, t: f64) -> Rgba<u8> {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) } as f32;
        let segments = (self.stops.len() - 1) as f32;
        let pos = t * segments;
        let idx = (pos.floor() as usize).min(self.stops.len() - 2);
        let mixed = self.stops[idx].mix(self.stops[idx + 1], pos - idx as f32);
        let c: Srgb<u8> = Srgb::<f32>::from_linear(mixed).into_format();
        Rgba([c.red, c.green, c.blue, 255])
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::inferno()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_stops() {
        let cmap = ColorMap::inferno();
        assert_eq!(cmap.color_at(0.0), Rgba([0, 0, 4, 255]));
        assert_eq!(cmap.color_at(1.0), Rgba([0xfc, 0xff, 0xa4, 255]));
        assert_eq!(cmap.color_at(7.0), cmap.color_at(1.0));
        assert_eq!(cmap.color_at(f64::NAN), cmap.color_at(0.0));
    }

    #[test]
    fn grey_is_monotone() {
        let cmap = ColorMap::grey();
        let a = cmap.color_at(0.25).0[0];
        let b = cmap.color_at(0.75).0[0];
        assert!(a < b);
    }
}
