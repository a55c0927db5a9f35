use std::cell::Cell;

use tracing::{debug, warn};

use crate::{
    palette::{Palette, Rgb, DEFAULT_INDEX, DEFAULT_THRESHOLD},
    Error,
};

/// What to do with a pixel that has no palette color within the quantization threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    /// Use the given palette index
    Fallback(u8),
    /// Ignore the threshold and use the nearest palette color
    Nearest,
    /// Abort the encode with [`Error::QuantizationMiss`]
    Reject,
}

impl Default for MissPolicy {
    fn default() -> Self {
        Self::Fallback(DEFAULT_INDEX)
    }
}

/// Maps pixels onto the indexes of a [`Palette`]
///
/// With the default threshold and policy this is exactly [`Palette::nearest_index`].
#[derive(Debug)]
pub struct Quantizer<'p> {
    palette: &'p Palette,
    threshold: f64,
    policy: MissPolicy,
    misses: Cell<u64>,
}

impl<'p> Quantizer<'p> {
    /// Creates a [`Quantizer`] with [`DEFAULT_THRESHOLD`] and [`MissPolicy::default`]
    #[must_use]
    pub fn new(palette: &'p Palette) -> Self {
        Self {
            palette,
            threshold: DEFAULT_THRESHOLD,
            policy: MissPolicy::default(),
            misses: Cell::new(0),
        }
    }

    /// Sets the distance a palette color must be strictly under to match a pixel
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the policy applied to pixels with no palette color within the threshold
    ///
    /// # Errors
    ///
    /// Returns [`Error::FallbackOutOfRange`] if a [`MissPolicy::Fallback`] index does not
    /// address a palette color.
    pub fn with_policy(mut self, policy: MissPolicy) -> Result<Self, Error> {
        if let MissPolicy::Fallback(index) = policy {
            if self.palette.get(index).is_none() {
                return Err(Error::FallbackOutOfRange {
                    index,
                    len: self.palette.len(),
                });
            }
        }
        self.policy = policy;
        Ok(self)
    }

    /// Returns the palette used for quantization
    #[must_use]
    pub const fn palette(&self) -> &'p Palette {
        self.palette
    }

    /// Returns the number of pixels that missed the threshold so far
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.get()
    }

    /// Returns the palette index for the pixel `rgb` located at `(x, y)`
    ///
    /// # Errors
    ///
    /// Only errors under [`MissPolicy::Reject`], see [`Error::QuantizationMiss`].
    pub fn quantize(&self, rgb: Rgb, x: u32, y: u32) -> Result<u8, Error> {
        if let Some(index) = self.palette.closest_within(rgb, self.threshold) {
            return Ok(index);
        }
        self.misses.set(self.misses.get() + 1);
        match self.policy {
            MissPolicy::Fallback(index) => Ok(index),
            MissPolicy::Nearest => Ok(self
                .palette
                .closest_within(rgb, f64::INFINITY)
                .unwrap_or(DEFAULT_INDEX)),
            MissPolicy::Reject => Err(Error::QuantizationMiss { x, y, rgb }),
        }
    }

    /// Quantizes row `y` into `indexes`, replacing its previous contents
    ///
    /// # Errors
    ///
    /// See [`Self::quantize`].
    pub fn quantize_row(&self, row: &[Rgb], y: u32, indexes: &mut Vec<u8>) -> Result<(), Error> {
        indexes.clear();
        for (x, rgb) in (0u32..).zip(row) {
            indexes.push(self.quantize(*rgb, x, y)?);
        }
        Ok(())
    }

    pub(crate) fn report(&self, pixels: u64) {
        let misses = self.misses();
        debug!("{misses} of {pixels} pixels missed the quantization threshold");
        if misses > 0 {
            if let MissPolicy::Fallback(index) = self.policy {
                warn!(
                    "{misses} pixels had no palette color within {} and were mapped to index {index}",
                    self.threshold
                );
            }
        }
    }
}
