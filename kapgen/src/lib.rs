use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context, Result};
use libkap::{
    verify::{verify_file, VerificationReport},
    BoundingBox, EncodeSummary, KapEncoder, RasterImage,
};
use tracing::{debug, info, instrument};

/// Chart area and scale, as written next to the composed image by the tile downloader
///
/// ```text
/// BoundingBox
/// 13-4584-2621
/// 54.239550531561775,21.4453125
/// 13-4595-2648
/// 53.54030739150021,21.9287109375
/// 12312.0
/// ```
///
/// The first line is a caption. Then come the top-left tile and its `lat,lon`, the
/// bottom-right tile and its `lat,lon`, and the chart scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDefinition {
    /// Tile id of the top-left corner
    pub top_left_tile: String,
    /// Tile id of the bottom-right corner
    pub bottom_right_tile: String,
    /// North/west from the top-left point, south/east from the bottom-right point
    pub bounding_box: BoundingBox,
    /// Chart scale
    pub scale: f64,
}

impl ChartDefinition {
    /// Parses a chart definition
    pub fn from_reader(r: impl BufRead) -> Result<Self> {
        let lines = r
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .context("read chart definition")?;
        ensure!(
            lines.len() >= 6,
            "chart definition holds {} lines, expected 6",
            lines.len()
        );
        let line = |i: usize| lines[i].trim();

        let top_left_tile = parse_tile(line(1)).context("line 2")?;
        let (north, west) = parse_point(line(2)).context("line 3")?;
        let bottom_right_tile = parse_tile(line(3)).context("line 4")?;
        let (south, east) = parse_point(line(4)).context("line 5")?;
        let scale = line(5)
            .parse::<f64>()
            .with_context(|| format!("line 6: invalid scale {:?}", line(5)))?;

        Ok(Self {
            top_left_tile,
            bottom_right_tile,
            bounding_box: BoundingBox::builder()
                .north(north)
                .south(south)
                .east(east)
                .west(west)
                .build(),
            scale,
        })
    }

    /// Reads a chart definition from the provided file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("open chart definition {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("parse chart definition {}", path.display()))
    }

    /// Chart number derived from the corner tiles
    #[must_use]
    pub fn map_id(&self) -> String {
        format!("{}_{}", self.top_left_tile, self.bottom_right_tile)
    }
}

fn parse_tile(s: &str) -> Result<String> {
    ensure!(!s.is_empty(), "missing tile id");
    parse_chart_name(s).context("invalid tile id")
}

/// Checks a chart title or number, which is written to shared header records and to the
/// default output file name
pub fn parse_chart_name(s: &str) -> Result<String> {
    ensure!(!s.trim().is_empty(), "chart name is empty");
    ensure!(
        !s.contains([',', '/', '\\', '\r', '\n', '\x1a']),
        "{s:?} cannot be written to a header record or file name"
    );
    Ok(s.to_owned())
}

fn parse_point(s: &str) -> Result<(f64, f64)> {
    let Some((lat, lon)) = s.split_once(',') else {
        bail!("expected lat,lon, found {s:?}");
    };
    let lat = lat.trim().parse::<f64>().with_context(|| format!("invalid latitude {lat:?}"))?;
    let lon = lon.trim().parse::<f64>().with_context(|| format!("invalid longitude {lon:?}"))?;
    Ok((lat, lon))
}

/// Parses a `north,south,east,west` bounding box
pub fn parse_bounds(s: &str) -> Result<BoundingBox> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid bounds {s:?}"))?;
    let [north, south, east, west] = values[..] else {
        bail!("expected north,south,east,west, found {} values", values.len());
    };
    Ok(BoundingBox::builder()
        .north(north)
        .south(south)
        .east(east)
        .west(west)
        .build())
}

/// File name the chart is written to when no output is given: `<title>_L<map_id>.kap`
#[must_use]
pub fn default_output_name(dir: &Path, title: &str, map_id: &str) -> PathBuf {
    dir.join(format!("{title}_L{map_id}.kap"))
}

/// Encodes the image at `image_file` into `output_name`, then verifies the written file
#[instrument(skip(encoder))]
pub fn image_to_kap(
    image_file: &Path,
    output_name: &Path,
    encoder: &KapEncoder,
) -> Result<(EncodeSummary, VerificationReport)> {
    let img = image::open(image_file)
        .with_context(|| format!("Failed to open image {}", image_file.display()))?;
    let image = RasterImage::from(img);
    info!("Image [{}x{}]", image.width(), image.height());

    let summary = encoder
        .encode_to_file(&image, output_name)
        .with_context(|| format!("write {}", output_name.display()))?;
    debug!("Index: {} entries", summary.index.entries().len());

    let report = verify_kap(output_name, Some(image.height()))?;
    ensure!(
        report.raster_start as u64 == summary.raster_start,
        "binary section found at {}, written at {}",
        report.raster_start,
        summary.raster_start
    );
    Ok((summary, report))
}

/// Runs the post-write checks on a KAP file
#[instrument]
pub fn verify_kap(kap_file: &Path, rows: Option<u32>) -> Result<VerificationReport> {
    let report =
        verify_file(kap_file, rows).with_context(|| format!("verify {}", kap_file.display()))?;
    info!(
        "Verified {}: {} bytes, binary section at {}",
        kap_file.display(),
        report.file_size,
        report.raster_start
    );
    Ok(report)
}
