//! # libkap
//!
//!
//! This library writes `MapTech` BSB/KAP image files, the raster format used for naval
//! raster navigational charts (RNC), from a composed map image.
//!
//! A KAP image file consists of:
//! - a text header of `TAG/value` records (chart name, edition, projection, reference
//!   points, color palette), terminated by `<Control-Z><NUL>`
//! - a binary section: the pixel depth, one run-length compressed row after another, and
//!   a table of 32-bit offsets to each row
//!
//! The encoder always writes 7-bit depth images. Pixels are quantized against a fixed
//! palette of at most 127 colors, which is written to the header as the `RGB` records.
//!
//! ### Usage
//!
//! ```rust
//! use libkap::{BoundingBox, ChartMetadata, KapEncoder, Palette, RasterImage};
//!
//! fn main() -> Result<(), libkap::Error> {
//!     let palette = Palette::from_reader("RGB/1,255,255,255\nRGB/2,0,0,255\n".as_bytes())?;
//!     let metadata = ChartMetadata::builder()
//!         .title("Gdansk".to_owned())
//!         .map_id("13-4584-2621_13-4595-2648".to_owned())
//!         .scale(12312.0)
//!         .dpi(254.0)
//!         .bounding_box(
//!             BoundingBox::builder()
//!                 .north(54.24)
//!                 .south(53.54)
//!                 .east(21.93)
//!                 .west(21.45)
//!                 .build(),
//!         )
//!         .build();
//!
//!     let image = RasterImage::new(2, 1, vec![[250, 250, 250], [0, 0, 240]])?;
//!     let mut kap = Vec::new();
//!     let summary = KapEncoder::new(&metadata, &palette).encode(&image, &mut kap)?;
//!
//!     let report = libkap::verify::verify_bytes(&kap, Some(image.height()))?;
//!     assert_eq!(report.raster_start as u64, summary.raster_start);
//!     Ok(())
//! }
//! ```
//!
//! ### Quantization
//!
//! By default a pixel maps to the first palette color at the smallest distance in RGB
//! space, provided that distance is under 100. Pixels further away from every palette
//! color map to index 1. [`MissPolicy`] and [`KapEncoder::with_threshold`] change that
//! behaviour.
//!
//! ### Limits
//!
//! Row numbers and run lengths are stored as at most two base-128 digits, so images are
//! limited to [`crate::image::MAX_DIMENSION`] pixels in each direction. Row offsets are 32-bit.
//! Both limits are checked and reported as errors.
//!

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

mod error;
/// Module containing the KAP image file encoder
pub mod image;
mod palette;
mod quantize;
pub mod verify;

pub use error::Error;
pub use crate::image::{
    BoundingBox, ChartMetadata, EncodeSummary, KapEncoder, RasterImage, RowOffsetIndex,
};
pub use palette::{Palette, Rgb, DEFAULT_INDEX, DEFAULT_THRESHOLD, MAX_PALETTE_LEN, PALETTE_TAG};
pub use quantize::{MissPolicy, Quantizer};

const CTRL_Z: u8 = 0x1a;
// Carriage return and line feed (BSB/KAP files use windows-style linebreaks)
const CRLF: &str = "\r\n";
