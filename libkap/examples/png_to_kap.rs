/// Demonstrates how to create a KAP file from a png file
/// using the [`image`] crate
///
/// Usage: `cargo run --example png_to_kap -- <image.png> <palette.txt> <output.kap>`
use anyhow::Context;
use libkap::{BoundingBox, ChartMetadata, KapEncoder, Palette, RasterImage};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(png), Some(palette), Some(output)) = (args.next(), args.next(), args.next()) else {
        anyhow::bail!("usage: png_to_kap <image.png> <palette.txt> <output.kap>");
    };

    let img = image::open(&png).with_context(|| format!("Failed to open image {png}"))?;
    let image = RasterImage::from(img);
    let palette = Palette::from_file(&palette).context("read palette")?;

    let metadata = ChartMetadata::builder()
        .title("test chart".to_owned())
        .map_id("example".to_owned())
        .scale(25000.0)
        .dpi(254.0)
        .bounding_box(
            BoundingBox::builder()
                .north(48.66)
                .south(48.61)
                .east(-1.96)
                .west(-2.05)
                .build(),
        )
        .build();

    let summary = KapEncoder::new(&metadata, &palette).encode_to_file(&image, &output)?;
    println!(
        "Wrote {} bytes ({} rows) to {output}",
        summary.total_len,
        summary.index.rows()
    );
    Ok(())
}
