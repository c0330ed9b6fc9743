/// Data layer: core types, loading, ROI selection and export.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SpectrumSet
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ SpectrumSet  │  Pixel → Spectrum, acquisition metadata
///   └─────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   roi     │  label raster / rectangle → RoiMask
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  spectrum / ion image → .csv / .png
///   └──────────┘
/// ```

pub mod export;
pub mod loader;
pub mod model;
pub mod roi;
