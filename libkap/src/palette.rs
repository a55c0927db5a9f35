use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{char, digit1, space0},
    combinator::map_res,
    sequence::preceded,
    IResult,
};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::{debug, trace};

use crate::Error;

/// A 24-bit color
pub type Rgb = [u8; 3];

/// Largest number of colors a 7-bit BSB/KAP palette can address (index 0 is reserved)
pub const MAX_PALETTE_LEN: usize = 127;

/// Prefix of the palette resource lines that carry a color
pub const PALETTE_TAG: &str = "RGB/";

/// Distance (in RGB space) a color must be strictly under to be matched by
/// [`Palette::nearest_index`]
pub const DEFAULT_THRESHOLD: f64 = 100.0;

/// Index returned by [`Palette::nearest_index`] when no color is within [`DEFAULT_THRESHOLD`]
pub const DEFAULT_INDEX: u8 = 1;

/// Ordered reference colors of a chart
///
/// Colors are addressed with BSB indexes, which start at 1. The load order defines the
/// index of each color. A palette holds between 1 and [`MAX_PALETTE_LEN`] colors and
/// cannot be changed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    /// Creates a new [`Palette`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPalette`] if `colors` is empty and [`Error::PaletteOverflow`] if
    /// it holds more than [`MAX_PALETTE_LEN`] colors.
    pub fn new(colors: Vec<Rgb>) -> Result<Self, Error> {
        if colors.is_empty() {
            return Err(Error::EmptyPalette);
        }
        if colors.len() > MAX_PALETTE_LEN {
            return Err(Error::PaletteOverflow {
                len: colors.len(),
                max: MAX_PALETTE_LEN,
            });
        }
        Ok(Self { colors })
    }

    /// Reads a palette from a line-oriented resource
    ///
    /// Lines starting with [`PALETTE_TAG`] hold a name followed by three comma separated
    /// channel values, e.g. `RGB/1,255,255,255`. Every other line is ignored.
    ///
    /// # Errors
    ///
    /// This function errors if the reader fails, a tagged line is malformed, or the
    /// resulting palette is empty or too large (see [`Self::new`]).
    pub fn from_reader(r: impl BufRead) -> Result<Self, Error> {
        let mut colors = Vec::new();
        for (i, line) in r.lines().enumerate() {
            let line = line?;
            if !line.starts_with(PALETTE_TAG) {
                continue;
            }
            let (_, rgb) = parse_palette_line(&line).map_err(|e| {
                debug!("Failed to parse palette line {}: {e:?}", i + 1);
                Error::PaletteLine {
                    line: i + 1,
                    content: line.clone(),
                }
            })?;
            trace!("palette color {}: {rgb:?}", colors.len() + 1);
            colors.push(rgb);
        }
        debug!("Read {} palette colors", colors.len());
        Self::new(colors)
    }

    /// Reads a palette from the provided file path
    ///
    /// # Errors
    ///
    /// This function errors if the file cannot be opened. See [`Self::from_reader`] for
    /// other errors.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Returns the number of colors in the palette
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`, a palette cannot be built without colors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns the color at BSB `index` (starting from 1)
    #[must_use]
    pub fn get(&self, index: u8) -> Option<Rgb> {
        usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.colors.get(i))
            .copied()
    }

    /// Returns an iterator over `(index, color)`, with indexes starting from 1
    pub fn iter(&self) -> impl Iterator<Item = (u8, Rgb)> + '_ {
        (1u8..).zip(self.colors.iter().copied())
    }

    /// Returns the index of the palette color closest to `rgb`
    ///
    /// A color further than [`DEFAULT_THRESHOLD`] from every palette color is mapped to
    /// [`DEFAULT_INDEX`]. Equidistant colors resolve to the lowest index.
    #[must_use]
    pub fn nearest_index(&self, rgb: Rgb) -> u8 {
        self.closest_within(rgb, DEFAULT_THRESHOLD)
            .unwrap_or(DEFAULT_INDEX)
    }

    /// Returns the index of the palette color closest to `rgb`, considering only colors
    /// strictly closer than `threshold`
    ///
    /// The search keeps the first color found at the smallest distance.
    #[must_use]
    pub fn closest_within(&self, rgb: Rgb, threshold: f64) -> Option<u8> {
        let mut min_distance = threshold;
        let mut best = None;
        for (index, color) in self.iter() {
            let d = distance(color, rgb);
            if d < min_distance {
                min_distance = d;
                best = Some(index);
            }
        }
        best
    }
}

/// Euclidean distance between two colors in RGB space
fn distance(a: Rgb, b: Rgb) -> f64 {
    let squared: u32 = a
        .iter()
        .zip(b)
        .map(|(&a, b)| u32::from(a.abs_diff(b)).pow(2))
        .sum();
    f64::from(squared).sqrt()
}

fn channel(input: &str) -> IResult<&str, u8> {
    preceded(space0, map_res(digit1, |d: &str| d.parse::<u8>()))(input)
}

fn parse_palette_line(input: &str) -> IResult<&str, Rgb> {
    let (input, _) = tag(PALETTE_TAG)(input)?;
    let (input, _name) = take_till(|c| c == ',')(input)?;
    let (input, _) = char(',')(input)?;
    let (input, r) = channel(input)?;
    let (input, _) = char(',')(input)?;
    let (input, g) = channel(input)?;
    let (input, _) = char(',')(input)?;
    let (input, b) = channel(input)?;
    Ok((input, [r, g, b]))
}
