use itertools::Itertools;
use std::io::Write;
use tracing::{debug, info, instrument, trace};

use super::{
    index::RowOffsetIndex,
    nb::{encode_nb, MAX_NB},
    raster::RasterImage,
    sink::KapSink,
};
use crate::{quantize::Quantizer, Error};

/// Pixel depth of every raster written by this crate (palettes of up to 127 colors)
pub const DEPTH: u8 = 7;

/// Largest width or height that can be encoded
///
/// Row numbers run up to `height - 1` and run lengths are stored minus one, so both
/// dimensions are bounded by [`MAX_NB`] + 1.
pub const MAX_DIMENSION: u32 = MAX_NB as u32 + 1;

// Set on the byte that opens a run, followed by the run length
const COLOR_START: u8 = 0x80;
const MAX_INDEX: u8 = 0x7F;
const END_OF_ROW: u8 = 0x00;

/// Compresses one row of palette indexes into `compressed_buf`, returning the bytes added
///
/// Layout: row number, then for each run of equal indexes the index with the high bit set
/// and the run length minus one, then a terminating 0.
///
/// # Errors
///
/// Returns [`Error::PaletteIndex`] if an index is outside `1..=127` and
/// [`Error::ValueOutOfRange`] if the row number or a run length cannot be encoded. Nothing
/// is added to `compressed_buf` on error.
#[instrument(skip(indexes, compressed_buf), level = "trace")]
pub fn compress_row(
    indexes: &[u8],
    row_number: u32,
    compressed_buf: &mut Vec<u8>,
) -> Result<usize, Error> {
    if let Some(&index) = indexes.iter().find(|&&i| !(1..=MAX_INDEX).contains(&i)) {
        return Err(Error::PaletteIndex { index });
    }
    let start = compressed_buf.len();
    let result = push_runs(indexes, row_number, compressed_buf);
    if result.is_err() {
        compressed_buf.truncate(start);
    }
    result.map(|()| compressed_buf.len() - start)
}

fn push_runs(indexes: &[u8], row_number: u32, compressed_buf: &mut Vec<u8>) -> Result<(), Error> {
    encode_nb(row_number, compressed_buf)?;
    for (run_length, &index) in indexes.iter().dedup_with_count() {
        compressed_buf.push(COLOR_START | index);
        let run = u32::try_from(run_length - 1).unwrap_or(u32::MAX);
        encode_nb(run, compressed_buf)?;
    }
    compressed_buf.push(END_OF_ROW);
    Ok(())
}

/// Checks that `image` can be written by [`RasterEncoder`]
///
/// # Errors
///
/// Returns [`Error::ImageDimensions`] if either dimension is 0 or above [`MAX_DIMENSION`].
pub fn check_dimensions(image: &RasterImage) -> Result<(), Error> {
    let valid = 1..=MAX_DIMENSION;
    if valid.contains(&image.width()) && valid.contains(&image.height()) {
        Ok(())
    } else {
        Err(Error::ImageDimensions {
            width: image.width(),
            height: image.height(),
            max: MAX_DIMENSION,
        })
    }
}

/// Writes the binary section of a KAP file: depth byte, compressed rows and row index
#[derive(Debug)]
pub struct RasterEncoder<'q, 'p> {
    quantizer: &'q Quantizer<'p>,
}

impl<'q, 'p> RasterEncoder<'q, 'p> {
    /// Creates a [`RasterEncoder`] mapping pixels through `quantizer`
    #[must_use]
    pub const fn new(quantizer: &'q Quantizer<'p>) -> Self {
        Self { quantizer }
    }

    /// Quantizes, compresses and writes `image` to `sink`, returning the row index
    ///
    /// Row offsets are positions of `sink`, so a sink that already holds the header
    /// yields absolute file offsets.
    ///
    /// # Errors
    ///
    /// This errors if the image dimensions are not encodable, a pixel is rejected by the
    /// quantizer, an offset overflows the index, or writing fails.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn encode<W: Write>(
        &self,
        image: &RasterImage,
        sink: &mut KapSink<W>,
    ) -> Result<RowOffsetIndex, Error> {
        check_dimensions(image)?;
        debug!("Raster starts at {}", sink.position());
        sink.write_all(&[DEPTH])?;

        let mut index = RowOffsetIndex::with_rows(image.height() as usize);
        let mut indexes = Vec::with_capacity(image.width() as usize);
        let mut compressed_buf = Vec::with_capacity(image.width() as usize);
        for (y, row) in (0u32..).zip(image.rows()) {
            // the index records where the row starts, before its row number
            index.push(sink.position())?;
            self.quantizer.quantize_row(row, y, &mut indexes)?;
            let len = compress_row(&indexes, y, &mut compressed_buf)?;
            trace!("row {y}: {len} bytes");
            sink.write_all(&compressed_buf)?;
            compressed_buf.clear();
        }
        self.quantizer
            .report(u64::from(image.width()) * u64::from(image.height()));

        debug!("Row index starts at {}", sink.position());
        index.write_to(sink)?;
        info!(
            "Wrote {} rows, raster ends at {}",
            index.rows(),
            sink.position()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::nb::decode_nb, palette::Palette};

    const RED: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];

    /// Parses a compressed row from the start of `bytes` into its row number,
    /// `(index, run length)` pairs and the number of bytes used
    fn parse_row(bytes: &[u8]) -> (u16, Vec<(u8, u32)>, usize) {
        let (row_number, mut pos) = decode_nb(bytes).unwrap();
        let mut runs = vec![];
        while bytes[pos] != END_OF_ROW {
            let index = bytes[pos] & !COLOR_START;
            let (run, used) = decode_nb(&bytes[pos + 1..]).unwrap();
            runs.push((index, u32::from(run) + 1));
            pos += 1 + used;
        }
        (row_number, runs, pos + 1)
    }

    fn runs(row: &[u8]) -> (u16, Vec<(u8, u32)>) {
        let (row_number, runs, used) = parse_row(row);
        assert_eq!(used, row.len(), "trailing bytes after end of row");
        (row_number, runs)
    }

    #[test]
    fn two_pixel_row() {
        let mut buf = vec![];
        let len = compress_row(&[1, 2], 0, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x81, 0x00, 0x82, 0x00, 0x00]);
        assert_eq!(len, 6);
    }

    #[test]
    fn long_runs_and_row_numbers() {
        let mut buf = vec![];
        let mut row = vec![3; 200];
        row.extend([5; 130]);
        compress_row(&row, 200, &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x81, 0x48]);
        // 199 = 1 * 128 + 71
        assert_eq!(&buf[2..5], &[0x83, 0x81, 0x47]);
        // 129 = 1 * 128 + 1
        assert_eq!(&buf[5..], &[0x85, 0x81, 0x01, 0x00]);
    }

    #[test]
    fn runs_cover_row_width() {
        let row = [1, 1, 2, 2, 2, 1, 7, 7, 7, 7, 7, 7, 1];
        let mut buf = vec![];
        compress_row(&row, 41, &mut buf).unwrap();
        let (row_number, runs) = runs(&buf);
        assert_eq!(row_number, 41);
        assert_eq!(runs, [(1, 2), (2, 3), (1, 1), (7, 6), (1, 1)]);
        assert_eq!(runs.iter().map(|(_, n)| n).sum::<u32>(), 13);
        assert_eq!(buf.last(), Some(&END_OF_ROW));
    }

    #[test]
    fn widest_row_fits() {
        let row = vec![1; MAX_DIMENSION as usize];
        let mut buf = vec![];
        compress_row(&row, 0, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x81, 0xFF, 0x7F, 0x00]);
        let row = vec![1; MAX_DIMENSION as usize + 1];
        assert!(matches!(
            compress_row(&row, 0, &mut vec![]),
            Err(Error::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn indexes_outside_seven_bits_are_rejected() {
        let mut buf = vec![0xAA];
        for (row, bad) in [([0, 2], 0), ([1, 200], 200), ([128, 1], 128)] {
            let err = compress_row(&row, 0, &mut buf).unwrap_err();
            assert!(matches!(err, Error::PaletteIndex { index } if index == bad));
        }
        assert_eq!(buf, [0xAA]);
        assert!(compress_row(&[127, 1], 0, &mut buf).is_ok());
    }

    #[test]
    fn failed_row_leaves_buffer_unchanged() {
        let mut buf = vec![0xAA];
        assert!(compress_row(&[1, 2], u32::from(MAX_NB) + 1, &mut buf).is_err());
        assert_eq!(buf, [0xAA]);
    }

    #[test]
    fn two_by_one_image() {
        let palette = Palette::new(vec![RED, GREEN]).unwrap();
        let quantizer = Quantizer::new(&palette);
        let image = RasterImage::new(2, 1, vec![RED, GREEN]).unwrap();
        let mut sink = KapSink::with_offset(vec![], 50);
        let index = RasterEncoder::new(&quantizer)
            .encode(&image, &mut sink)
            .unwrap();
        assert_eq!(index.entries(), &[0, 51]);
        assert_eq!(
            sink.into_inner(),
            [7, 0x00, 0x81, 0x00, 0x82, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 51]
        );
    }

    #[test]
    fn index_points_at_row_numbers() {
        let palette = Palette::new(vec![RED, GREEN, [0, 0, 255]]).unwrap();
        let quantizer = Quantizer::new(&palette);
        let (width, height) = (5, 140);
        let pixels = (0..width * height)
            .map(|i| palette.get(u8::try_from(i % 7 % 3 + 1).unwrap()).unwrap())
            .collect();
        let image = RasterImage::new(width, height, pixels).unwrap();
        let mut sink = KapSink::new(vec![]);
        let index = RasterEncoder::new(&quantizer)
            .encode(&image, &mut sink)
            .unwrap();
        let out = sink.into_inner();

        assert_eq!(index.entries().len(), height as usize + 1);
        assert_eq!(out[0], DEPTH);
        assert_eq!(index.row_offset(0), Some(1));
        let mut expected_start = 1;
        for row in 0..height as usize {
            let start = index.row_offset(row).unwrap() as usize;
            assert_eq!(start, expected_start, "rows are contiguous");
            let (row_number, runs, used) = parse_row(&out[start..]);
            assert_eq!(usize::from(row_number), row);
            assert_eq!(runs.iter().map(|(_, n)| n).sum::<u32>(), width);
            expected_start = start + used;
        }
        // the index follows the last row
        assert_eq!(out.len() - index.byte_len(), expected_start);
    }

    #[test]
    fn dimensions_are_checked_before_writing() {
        let palette = Palette::new(vec![RED]).unwrap();
        let quantizer = Quantizer::new(&palette);
        let empty = RasterImage::new(0, 3, vec![]).unwrap();
        let mut sink = KapSink::new(vec![]);
        assert!(matches!(
            RasterEncoder::new(&quantizer).encode(&empty, &mut sink),
            Err(Error::ImageDimensions { width: 0, .. })
        ));
        assert_eq!(sink.position(), 0);

        let tall = RasterImage::new(1, MAX_DIMENSION + 1, vec![RED; MAX_DIMENSION as usize + 1])
            .unwrap();
        assert!(check_dimensions(&tall).is_err());
    }

    #[test]
    fn rejected_pixels_abort() {
        let palette = Palette::new(vec![RED]).unwrap();
        let quantizer = Quantizer::new(&palette)
            .with_policy(crate::MissPolicy::Reject)
            .unwrap();
        let image = RasterImage::new(2, 1, vec![RED, GREEN]).unwrap();
        let err = RasterEncoder::new(&quantizer)
            .encode(&image, &mut KapSink::new(vec![]))
            .unwrap_err();
        assert!(matches!(err, Error::QuantizationMiss { x: 1, y: 0, .. }));
    }
}
