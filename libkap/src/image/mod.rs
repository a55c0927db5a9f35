#![allow(clippy::module_name_repetitions)]

pub(crate) mod compress;
pub(crate) mod header;
pub(crate) mod index;
pub(crate) mod nb;
pub(crate) mod raster;
pub(crate) mod sink;

pub use compress::{check_dimensions, compress_row, RasterEncoder, DEPTH, MAX_DIMENSION};
pub use header::{
    BoundingBox, ChartMetadata, HeaderWriter, Record, DEFAULT_AGENCY, DEFAULT_CHART_FORMAT,
    DEFAULT_COPYRIGHT, DEFAULT_PROJECTION_PARAMETER,
};
pub use index::{read_index, RowOffsetIndex};
pub use nb::{decode_nb, encode_nb, MAX_NB};
pub use raster::RasterImage;
pub use sink::KapSink;

use crate::{
    palette::{Palette, DEFAULT_THRESHOLD},
    quantize::{MissPolicy, Quantizer},
    Error,
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{debug, info, instrument, warn};

/// Result of a successful encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Number of header bytes, terminator included
    pub header_len: u64,
    /// Offset of the depth byte that opens the binary section
    pub raster_start: u64,
    /// The row index appended to the file
    pub index: RowOffsetIndex,
    /// Total number of bytes written
    pub total_len: u64,
}

/// Writes a [`RasterImage`] as a BSB/KAP image file
///
/// The header is written first, followed by the binary section. Nothing is written if
/// the metadata text, the image dimensions or the quantizer settings are invalid.
#[derive(Debug, Clone)]
pub struct KapEncoder<'a> {
    metadata: &'a ChartMetadata,
    palette: &'a Palette,
    threshold: f64,
    policy: MissPolicy,
}

impl<'a> KapEncoder<'a> {
    /// Creates a new [`KapEncoder`] with the default quantization threshold and policy
    #[must_use]
    pub fn new(metadata: &'a ChartMetadata, palette: &'a Palette) -> Self {
        Self {
            metadata,
            palette,
            threshold: DEFAULT_THRESHOLD,
            policy: MissPolicy::default(),
        }
    }

    /// Sets the distance a palette color must be strictly under to match a pixel
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the policy applied to pixels with no palette color within the threshold
    #[must_use]
    pub fn with_policy(mut self, policy: MissPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Encodes `image` into `out`
    ///
    /// Offsets in the row index are relative to the first byte written to `out`.
    ///
    /// # Errors
    ///
    /// This function errors if:
    /// - a metadata text field would break the header layout
    /// - the image is empty or larger than [`MAX_DIMENSION`] in either direction
    /// - the [`MissPolicy::Fallback`] index is not in the palette
    /// - a pixel is rejected under [`MissPolicy::Reject`]
    /// - the file grows past what the 32-bit row index can address
    /// - writing to `out` fails
    #[instrument(skip_all, fields(title = %self.metadata.title))]
    pub fn encode<W: Write>(&self, image: &RasterImage, out: W) -> Result<EncodeSummary, Error> {
        let quantizer = self.prepare(image)?;
        debug!(
            "Encoding {}x{} image with {} colors",
            image.width(),
            image.height(),
            self.palette.len()
        );

        let mut sink = KapSink::new(out);
        let header_len = HeaderWriter::new(self.metadata, self.palette).write_to(
            &mut sink,
            image.width(),
            image.height(),
        )?;
        info!("Wrote header");

        let raster_start = sink.position();
        let index = RasterEncoder::new(&quantizer).encode(image, &mut sink)?;
        sink.flush()?;

        Ok(EncodeSummary {
            header_len,
            raster_start,
            index,
            total_len: sink.position(),
        })
    }

    /// Checks that `image` and the encoder settings can be written, without writing
    ///
    /// # Errors
    ///
    /// Returns the errors [`Self::encode`] raises before its first byte: invalid
    /// metadata text, image dimensions or [`MissPolicy::Fallback`] index.
    pub fn validate(&self, image: &RasterImage) -> Result<(), Error> {
        self.prepare(image).map(|_| ())
    }

    fn prepare(&self, image: &RasterImage) -> Result<Quantizer<'a>, Error> {
        let quantizer = Quantizer::new(self.palette)
            .with_threshold(self.threshold)
            .with_policy(self.policy)?;
        check_dimensions(image)?;
        HeaderWriter::new(self.metadata, self.palette).validate()?;
        Ok(quantizer)
    }

    /// Encodes `image` into a file at the provided path
    ///
    /// The settings are checked with [`Self::validate`] before the file is opened, so an
    /// existing file is left untouched when they are invalid. Otherwise an existing file
    /// is truncated, and if encoding fails the partially written file is removed.
    ///
    /// # Errors
    ///
    /// This will error if unable to open and/or write to the provided filename. See
    /// [`Self::encode`] for other errors.
    pub fn encode_to_file(
        &self,
        image: &RasterImage,
        filename: impl AsRef<Path>,
    ) -> Result<EncodeSummary, Error> {
        let filename = filename.as_ref();
        self.validate(image)?;
        let f = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;
        // the writer (and file) is dropped when encode returns
        let result = self.encode(image, BufWriter::new(f));
        match &result {
            Ok(summary) => info!(
                "Finished writing {} bytes to {}",
                summary.total_len,
                filename.display()
            ),
            Err(e) => {
                warn!("Encoding {} failed: {e}", filename.display());
                if let Err(rm) = fs::remove_file(filename) {
                    warn!("Unable to remove {}: {rm}", filename.display());
                }
            }
        }
        result
    }
}
