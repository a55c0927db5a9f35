use std::io::{self, Write};

use crate::Error;

const ENTRY_LEN: usize = 4;

/// Row offset table appended after the raster rows
///
/// The first entry is always 0, followed by the file offset at which each row starts.
/// Entries are written as big-endian 32-bit integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOffsetIndex {
    entries: Vec<u32>,
}

impl Default for RowOffsetIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RowOffsetIndex {
    /// Creates an index holding only the leading 0 entry
    #[must_use]
    pub fn new() -> Self {
        Self { entries: vec![0] }
    }

    pub(crate) fn with_rows(rows: usize) -> Self {
        let mut entries = Vec::with_capacity(rows + 1);
        entries.push(0);
        Self { entries }
    }

    /// Records the offset of the next row
    ///
    /// # Errors
    ///
    /// Returns [`Error::OffsetOverflow`] if `offset` does not fit in 32 bits.
    pub fn push(&mut self, offset: u64) -> Result<(), Error> {
        let entry = u32::try_from(offset).map_err(|_| Error::OffsetOverflow { offset })?;
        self.entries.push(entry);
        Ok(())
    }

    /// Returns every entry, including the leading 0
    #[must_use]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Returns the number of rows recorded
    #[must_use]
    pub fn rows(&self) -> usize {
        self.entries.len() - 1
    }

    /// Returns the file offset of `row`
    #[must_use]
    pub fn row_offset(&self, row: usize) -> Option<u32> {
        self.entries.get(row + 1).copied()
    }

    /// Returns the size of the serialized table in bytes
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.entries.len() * ENTRY_LEN
    }

    /// Writes the table as consecutive big-endian 32-bit integers
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying writer.
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        let bytes: Vec<u8> = self
            .entries
            .iter()
            .flat_map(|entry| entry.to_be_bytes())
            .collect();
        w.write_all(&bytes)
    }
}

/// Reads the row index of a `rows` high image from the tail of a KAP file
///
/// # Errors
///
/// Returns [`Error::InvalidIndex`] if `bytes` is too short to hold the table.
pub fn read_index(bytes: &[u8], rows: u32) -> Result<RowOffsetIndex, Error> {
    let len = (rows as usize + 1) * ENTRY_LEN;
    let start = bytes.len().checked_sub(len).ok_or_else(|| {
        Error::InvalidIndex(format!(
            "{} bytes cannot hold an index of {rows} rows",
            bytes.len()
        ))
    })?;
    let entries = bytes[start..]
        .chunks_exact(ENTRY_LEN)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(RowOffsetIndex { entries })
}
