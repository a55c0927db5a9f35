use ::image::DynamicImage;

use crate::{palette::Rgb, Error};

/// A composed RGB raster, the input of the KAP encoder
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RasterImage {
    /// The width of the image
    width: u32,
    /// The height of the image
    height: u32,
    /// Image pixels, row-major
    pixels: Vec<Rgb>,
}

impl RasterImage {
    /// Creates a new [`RasterImage`] from row-major pixels
    ///
    /// # Errors
    ///
    /// Returns [`Error::PixelBufferMismatch`] if `pixels` does not hold exactly
    /// `width * height` values.
    pub fn new(width: u32, height: u32, pixels: Vec<Rgb>) -> Result<Self, Error> {
        let expected = pixel_count(width, height);
        if pixels.len() != expected {
            return Err(Error::PixelBufferMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Creates a new [`RasterImage`] from packed RGB bytes
    ///
    /// # Errors
    ///
    /// See [`Self::new`]; `data` must hold `width * height * 3` bytes.
    pub fn from_rgb(width: u32, height: u32, data: &[u8]) -> Result<Self, Error> {
        Self::from_packed::<3>(width, height, data)
    }

    /// Creates a new [`RasterImage`] from packed RGBA bytes, the alpha channel is dropped
    ///
    /// # Errors
    ///
    /// See [`Self::new`]; `data` must hold `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, data: &[u8]) -> Result<Self, Error> {
        Self::from_packed::<4>(width, height, data)
    }

    fn from_packed<const CHANNELS: usize>(
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<Self, Error> {
        let expected = pixel_count(width, height);
        if data.len() != expected.saturating_mul(CHANNELS) {
            return Err(Error::PixelBufferMismatch {
                width,
                height,
                expected: expected.saturating_mul(CHANNELS),
                actual: data.len(),
            });
        }
        let pixels = data
            .chunks_exact(CHANNELS)
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        Self::new(width, height, pixels)
    }

    /// Returns the width of the image
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixels of the image
    #[must_use]
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Returns an entire row of the image
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[Rgb]> {
        if y < self.height {
            let width = self.width as usize;
            let start = y as usize * width;
            self.pixels.get(start..start + width)
        } else {
            None
        }
    }

    /// Returns an iterator over the rows of the image, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[Rgb]> + '_ {
        // chunks_exact panics on 0, an empty image has no rows either way
        self.pixels
            .chunks_exact((self.width as usize).max(1))
            .take(self.height as usize)
    }
}

impl From<&DynamicImage> for RasterImage {
    fn from(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let pixels = rgb.pixels().map(|p| p.0).collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl From<DynamicImage> for RasterImage {
    fn from(img: DynamicImage) -> Self {
        Self::from(&img)
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize)
}
