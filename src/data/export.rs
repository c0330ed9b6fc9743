use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use log::info;

use super::model::{MetadataValue, Spectrum};
use crate::color::ColorMap;
use crate::processing::aggregate::IonImage;

// ---------------------------------------------------------------------------
// Spectrum → CSV
// ---------------------------------------------------------------------------

/// Write `m/z,intensity` rows, optionally limited to `lo <= m/z <= hi`.
pub fn write_spectrum_csv<W: Write>(
    writer: W,
    spectrum: &Spectrum,
    range: Option<(f64, f64)>,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["m/z", "intensity"])?;
    let window = match range {
        Some((lo, hi)) => spectrum.window(lo, hi),
        None => 0..spectrum.len(),
    };
    for i in window {
        csv.serialize((spectrum.mz[i], spectrum.intensity[i]))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_spectrum_csv(path: &Path, spectrum: &Spectrum, range: Option<(f64, f64)>) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_spectrum_csv(file, spectrum, range)
        .with_context(|| format!("writing spectrum to {}", path.display()))?;
    info!("Exported {} peaks to {}", spectrum.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Ion image → CSV / PNG
// ---------------------------------------------------------------------------

/// Write `x,y,intensity` rows in pixel order.
pub fn write_ion_image_csv<W: Write>(writer: W, image: &IonImage) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["x", "y", "intensity"])?;
    for (p, v) in &image.values {
        csv.serialize((p.x, p.y, v))?;
    }
    csv.flush()?;
    Ok(())
}

/// Map intensities onto `cmap`, scaled between the image minimum and maximum.
/// Pixels without a spectrum stay transparent.
pub fn render_ion_image(image: &IonImage, cmap: &ColorMap) -> Result<RgbaImage> {
    image.raster_len().context("rendering ion image")?;
    let mut img = RgbaImage::from_pixel(image.width, image.height, Rgba([0, 0, 0, 0]));
    let Some((lo, hi)) = image.value_range() else {
        return Ok(img);
    };
    let span = hi - lo;
    for (p, &v) in &image.values {
        let t = if span > 0.0 { (v - lo) / span } else { 0.0 };
        img.put_pixel(p.x, p.y, cmap.color_at(t));
    }
    Ok(img)
}

/// Save an ion image as CSV or PNG, chosen by the file extension.
pub fn save_ion_image(path: &Path, image: &IonImage, cmap: &ColorMap) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => render_ion_image(image, cmap)?
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?,
        "csv" => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_ion_image_csv(file, image)
                .with_context(|| format!("writing ion image to {}", path.display()))?;
        }
        other => anyhow::bail!("Unsupported ion image extension: .{other}"),
    }
    info!(
        "Exported ion image m/z {} ± {} ({}×{}) to {}",
        image.mz,
        image.tolerance,
        image.width,
        image.height,
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Acquisition metadata → CSV
// ---------------------------------------------------------------------------

/// Write one `key,value` row per metadata entry, without a header. Entries
/// with an empty key or a `Null` value are skipped.
pub fn write_metadata_csv<W: Write>(
    writer: W,
    metadata: &BTreeMap<String, MetadataValue>,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for (key, value) in metadata {
        if key.is_empty() || *value == MetadataValue::Null {
            continue;
        }
        csv.write_record([key.as_str(), value.to_string().as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_metadata_csv(path: &Path, metadata: &BTreeMap<String, MetadataValue>) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_metadata_csv(file, metadata)
        .with_context(|| format!("writing metadata to {}", path.display()))?;
    info!("Exported {} metadata entries to {}", metadata.len(), path.display());
    Ok(())
}
