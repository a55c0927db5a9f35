use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
/// Possible `libkap` errors
pub enum Error {
    /// Error returned when reading or writing the underlying stream fails
    #[error("i/o error")]
    Io(#[from] io::Error),

    /// Error returned if a palette holds no colors
    #[error("palette contains no colors")]
    EmptyPalette,
    /// Error returned if a palette holds more colors than a 7-bit index can address
    #[error("palette holds {len} colors, BSB/KAP 7-bit depth supports at most {max}")]
    PaletteOverflow {
        /// number of colors supplied
        len: usize,
        /// largest supported palette
        max: usize,
    },
    /// Error returned if a tagged palette line cannot be parsed
    #[error("invalid palette entry on line {line}: {content:?}")]
    PaletteLine {
        /// 1-based line number in the palette resource
        line: usize,
        /// the offending line
        content: String,
    },
    /// Error returned if a quantizer fallback index does not address a palette entry
    #[error("fallback index {index} is outside the palette (1..={len})")]
    FallbackOutOfRange {
        /// requested fallback index
        index: u8,
        /// palette length
        len: usize,
    },
    /// Error returned under [`crate::MissPolicy::Reject`] if no palette color is close enough
    #[error("pixel {rgb:?} at ({x}, {y}) has no palette color within the quantization threshold")]
    QuantizationMiss {
        /// pixel column
        x: u32,
        /// pixel row
        y: u32,
        /// pixel color
        rgb: [u8; 3],
    },

    /// Error returned if the pixel buffer does not match the image width/height
    #[error("pixel buffer holds {actual} values, {width}x{height} image requires {expected}")]
    PixelBufferMismatch {
        /// image width
        width: u32,
        /// image height
        height: u32,
        /// expected buffer length
        expected: usize,
        /// actual buffer length
        actual: usize,
    },
    /// Error returned if an image cannot be represented by the row/run number encoding
    #[error("image dimensions {width}x{height} are not encodable (each must be within 1..={max})")]
    ImageDimensions {
        /// image width
        width: u32,
        /// image height
        height: u32,
        /// largest encodable width/height
        max: u32,
    },
    /// Error returned if a row number or run length exceeds the two-byte number encoding
    #[error("value {value} exceeds the largest encodable number {max}")]
    ValueOutOfRange {
        /// the value that was to be encoded
        value: u32,
        /// largest encodable value
        max: u16,
    },
    /// Error returned if a row holds an index a 7-bit color byte cannot carry
    #[error("palette index {index} is outside 1..=127")]
    PaletteIndex {
        /// the offending index
        index: u8,
    },
    /// Error returned if a metadata text field holds characters that end its header record
    #[error("{field} {value:?} contains a character that breaks the KAP header")]
    HeaderText {
        /// name of the metadata field
        field: &'static str,
        /// the offending value
        value: String,
    },
    /// Error returned if a row offset does not fit the 32-bit index table
    #[error("row offset {offset} does not fit a 32-bit index entry")]
    OffsetOverflow {
        /// the offending offset
        offset: u64,
    },

    /// Error returned if the header terminator is missing from a written file
    #[error("header terminator (0x1A 0x00) not found in {len} bytes")]
    SentinelNotFound {
        /// number of bytes scanned
        len: usize,
    },
    /// Error returned if the byte following the header is not the expected depth
    #[error("expected depth byte {expected} at offset {offset}, found {found:?}")]
    UnexpectedDepth {
        /// offset of the depth byte
        offset: usize,
        /// expected depth
        expected: u8,
        /// byte found (None if the file ends after the header)
        found: Option<u8>,
    },
    /// Error returned if the trailing row index is inconsistent with the raster
    #[error("invalid row index: {0}")]
    InvalidIndex(String),
}
