//! Processing core: pure transformations over [`SpectrumSet`]s.
//!
//! ```text
//!   SpectrumSet
//!        │
//!        ▼
//!   ┌──────────┐   noise      drop peaks < p% of spectrum max
//!   │ pipeline │── normalize  tic / rms / median / reference peak
//!   └──────────┘   hotspot    threshold over the set, then clip / rescale
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ aggregate │  mean spectrum (all / ROI), ion image
//!   └───────────┘
//! ```
//!
//! `binning` and `centroid` prepare raw data for aggregation.
//!
//! [`SpectrumSet`]: crate::data::model::SpectrumSet

pub mod aggregate;
pub mod binning;
pub mod centroid;
pub mod hotspot;
pub mod noise;
pub mod normalize;
pub mod pipeline;
pub mod stats;
