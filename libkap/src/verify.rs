//! Post-write checks of a produced KAP file.
//!
//! This is not a decoder: it locates the binary section, checks the depth byte and,
//! when the image height is known, checks that the row index points at the rows.

use std::{fs, path::Path};
use tracing::{debug, info, instrument};

use crate::{
    image::{decode_nb, read_index, RowOffsetIndex, DEPTH},
    Error, CTRL_Z,
};

const SENTINEL: [u8; 2] = [CTRL_Z, 0x00];

/// Findings of [`verify_bytes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Size of the file in bytes
    pub file_size: usize,
    /// Offset following the header terminator, where the depth byte sits
    pub raster_start: usize,
    /// The depth byte
    pub depth: u8,
    /// The row index, if the row count was provided
    pub index: Option<RowOffsetIndex>,
}

/// Returns the offset immediately after the first `0x1A 0x00` sequence
///
/// # Errors
///
/// Returns [`Error::SentinelNotFound`] if the sequence does not occur in `bytes`.
pub fn find_raster_start(bytes: &[u8]) -> Result<usize, Error> {
    bytes
        .windows(SENTINEL.len())
        .position(|w| w == SENTINEL)
        .map(|i| i + SENTINEL.len())
        .ok_or(Error::SentinelNotFound { len: bytes.len() })
}

/// Checks the layout of a KAP file held in memory
///
/// With `rows`, the trailing index is read and every entry must point, in increasing
/// order, at a byte inside the raster section that holds that row's number.
///
/// # Errors
///
/// Returns [`Error::SentinelNotFound`], [`Error::UnexpectedDepth`] or
/// [`Error::InvalidIndex`] for the first check that fails.
pub fn verify_bytes(bytes: &[u8], rows: Option<u32>) -> Result<VerificationReport, Error> {
    let raster_start = find_raster_start(bytes)?;
    debug!("Binary section starts at {raster_start:#x}");
    let depth = match bytes.get(raster_start) {
        Some(&DEPTH) => DEPTH,
        found => {
            return Err(Error::UnexpectedDepth {
                offset: raster_start,
                expected: DEPTH,
                found: found.copied(),
            })
        }
    };

    let index = rows
        .map(|rows| check_index(bytes, raster_start, rows))
        .transpose()?;

    Ok(VerificationReport {
        file_size: bytes.len(),
        raster_start,
        depth,
        index,
    })
}

/// Reads the file at `path` and checks it with [`verify_bytes`]
///
/// # Errors
///
/// This errors if the file cannot be read, see [`verify_bytes`] for other errors.
#[instrument(skip(path), fields(file = %path.as_ref().display()))]
pub fn verify_file(path: impl AsRef<Path>, rows: Option<u32>) -> Result<VerificationReport, Error> {
    let bytes = fs::read(path.as_ref())?;
    info!("File size [{}]", bytes.len());
    let report = verify_bytes(&bytes, rows)?;
    info!(
        "Position [{}, {:#x}] (start)",
        report.raster_start, report.raster_start
    );
    Ok(report)
}

fn check_index(bytes: &[u8], raster_start: usize, rows: u32) -> Result<RowOffsetIndex, Error> {
    let index = read_index(bytes, rows)?;
    let index_start = bytes.len() - index.byte_len();
    if index_start <= raster_start {
        return Err(Error::InvalidIndex(format!(
            "index at {index_start} overlaps the header ending at {raster_start}"
        )));
    }
    if index.entries().first() != Some(&0) {
        return Err(Error::InvalidIndex("first entry is not 0".to_owned()));
    }

    let raster = raster_start + 1..index_start;
    let mut previous = raster_start;
    for (row, &offset) in index.entries()[1..].iter().enumerate() {
        let offset = offset as usize;
        if !raster.contains(&offset) || offset <= previous {
            return Err(Error::InvalidIndex(format!(
                "row {row} offset {offset} is outside the raster section or out of order"
            )));
        }
        match decode_nb(&bytes[offset..index_start]) {
            Some((number, _)) if usize::from(number) == row => {}
            found => {
                return Err(Error::InvalidIndex(format!(
                    "row {row} offset {offset} holds row number {:?}",
                    found.map(|(n, _)| n)
                )))
            }
        }
        previous = offset;
    }
    debug!("Index of {rows} rows starts at {index_start}");
    Ok(index)
}
