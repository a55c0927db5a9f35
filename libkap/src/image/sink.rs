use std::io::{self, Write};

/// Output stream of a KAP encode that keeps track of its write position
///
/// The header writer and the raster encoder share one sink; the position is the offset
/// of the next byte in the produced file, which is what the row index records.
#[derive(Debug)]
pub struct KapSink<W> {
    inner: W,
    position: u64,
}

impl<W: Write> KapSink<W> {
    /// Wraps `inner`, counting from offset 0
    pub const fn new(inner: W) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Wraps `inner`, whose next byte lands at `offset`
    pub const fn with_offset(inner: W, offset: u64) -> Self {
        Self {
            inner,
            position: offset,
        }
    }

    /// Offset of the next byte written
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Returns a reference to the wrapped writer
    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the sink, returning the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for KapSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
