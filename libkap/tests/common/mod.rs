#![allow(dead_code)]

use chrono::NaiveDate;
use libkap::{BoundingBox, ChartMetadata, Palette, RasterImage};

pub const PALETTE_RESOURCE: &str = "! test palette\r\n\
    RGB/1,255,255,255\r\n\
    RGB/2,0,0,0\r\n\
    RGB/3,255,0,0\r\n\
    RGB/4,0,255,0\r\n\
    RGB/5,0,0,255\r\n\
    RGB/6,181,218,255\r\n";

pub fn palette() -> Palette {
    Palette::from_reader(PALETTE_RESOURCE.as_bytes()).expect("test palette")
}

pub fn metadata() -> ChartMetadata {
    ChartMetadata::builder()
        .title("test chart".to_owned())
        .map_id("13-4584-2621_13-4595-2648".to_owned())
        .scale(12312.0)
        .dpi(254.0)
        .bounding_box(
            BoundingBox::builder()
                .north(54.239_550_531_561_775)
                .south(53.540_307_391_500_21)
                .east(21.928_710_937_5)
                .west(21.445_312_5)
                .build(),
        )
        .edition_date(NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date"))
        .build()
}

/// Vertical bands of palette colors, shifted by one pixel on every row
pub fn banded_image(width: u32, height: u32) -> RasterImage {
    let palette = palette();
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x / 7 + y) % 6))
        .map(|band| {
            let index = u8::try_from(band + 1).expect("band index");
            palette.get(index).expect("band color")
        })
        .collect();
    RasterImage::new(width, height, pixels).expect("banded image")
}
