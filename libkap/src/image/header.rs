use bon::Builder;
use chrono::{Local, NaiveDate};
use std::{
    fmt::{self, Display, Write as _},
    io::Write,
};
use strum::{EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, trace};

use super::{compress::DEPTH, sink::KapSink};
use crate::{palette::Palette, Error, CRLF, CTRL_Z};

const DATE_FORMAT: &str = "%Y/%m/%d";

/// Default copyright record (CRR)
pub const DEFAULT_COPYRIGHT: &str = "map.openseamap.org";
/// Default chart format record (CHF)
pub const DEFAULT_CHART_FORMAT: &str = "Overview";
/// Default producing agency (ORG) and manufacturer (MFR)
pub const DEFAULT_AGENCY: &str = "OpenSeaMap";
/// Default Mercator projection parameter (KNP PP)
pub const DEFAULT_PROJECTION_PARAMETER: f64 = 3.971_300_597_069_060_2;

const COMMENT: &str = "- KAP file (see details in http://opencpn.org/ocpn/kap_format) ";

// end a record, or the whole header
const RECORD_BREAKS: [char; 3] = ['\r', '\n', CTRL_Z as char];

/// Header records written by [`HeaderWriter`], in the order they are written
#[derive(IntoStaticStr, EnumString, EnumIter, PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Record {
    /// Free text comment
    #[strum(serialize = "!")]
    Comment,
    /// Format version
    VER,
    /// Copyright
    CRR,
    /// Chart name and number
    CHT,
    /// Chart format
    CHF,
    /// Chart edition parameters
    CED,
    /// General parameters (pane name, size, drawing units)
    BSB,
    /// Producing agency
    ORG,
    /// Manufacturer
    MFR,
    /// Detailed chart parameters (projection, datum, scale)
    KNP,
    /// Reference point, pixel and geographic coordinates
    REF,
    /// Border polygon vertex
    PLY,
    /// Datum shift
    DTM,
    /// Phase shift
    CPH,
    /// Image rows per index entry
    OST,
    /// Pixel depth
    IFM,
    /// Default color palette entry
    RGB,
}

impl Record {
    /// Returns the record identifier
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Geographic area covered by a chart, in decimal degrees
///
/// The values are written to the header as given, no ordering is checked.
#[derive(Builder, Default, Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BoundingBox {
    /// Northern latitude
    pub north: f64,
    /// Southern latitude
    pub south: f64,
    /// Eastern longitude
    pub east: f64,
    /// Western longitude
    pub west: f64,
}

/// Descriptive values written to the text header of a KAP file
#[derive(Builder, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ChartMetadata {
    /// Chart and pane name (CHT NA, BSB NA)
    pub title: String,
    /// Chart and pane number (CHT NU, BSB NU)
    pub map_id: String,
    /// Chart scale (KNP SC)
    pub scale: f64,
    /// Drawing units in pixels per inch (BSB DU)
    pub dpi: f64,
    /// Area covered by the image, used for REF and PLY records
    pub bounding_box: BoundingBox,

    /// Format version (VER)
    #[builder(default = 3.0)]
    pub version: f64,
    /// Copyright (CRR)
    #[builder(default = DEFAULT_COPYRIGHT.to_owned())]
    pub copyright: String,
    /// Chart format (CHF), e.g. Overview, General, Coastal, Approach, River, Harbour
    #[builder(default = DEFAULT_CHART_FORMAT.to_owned())]
    pub chart_format: String,
    /// Source edition (CED SE)
    #[builder(default = 1)]
    pub source_edition: usize,
    /// Raster edition (CED RE)
    #[builder(default = 2)]
    pub raster_edition: usize,
    /// Edition date (CED ED), today by default
    #[builder(default = Local::now().date_naive())]
    pub edition_date: NaiveDate,
    /// Producing agency (ORG)
    #[builder(default = DEFAULT_AGENCY.to_owned())]
    pub agency: String,
    /// Manufacturer (MFR)
    #[builder(default = DEFAULT_AGENCY.to_owned())]
    pub manufacturer: String,
    /// Mercator projection parameter (KNP PP)
    #[builder(default = DEFAULT_PROJECTION_PARAMETER)]
    pub projection_parameter: f64,
}

/// Writes a float the way chart producers do: plain decimal digits in the shortest
/// round-trip form, always with a fractional part (`12312.0`, `0.00001`)
struct Decimal(f64);

impl Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display never switches to exponent notation, unlike Debug
        let digits = self.0.to_string();
        if self.0.is_finite() && !digits.contains('.') {
            write!(f, "{digits}.0")
        } else {
            f.write_str(&digits)
        }
    }
}

/// Builds and writes the text header of a KAP file
#[derive(Debug, Clone, Copy)]
pub struct HeaderWriter<'a> {
    metadata: &'a ChartMetadata,
    palette: &'a Palette,
}

impl<'a> HeaderWriter<'a> {
    /// Creates a [`HeaderWriter`]
    #[must_use]
    pub const fn new(metadata: &'a ChartMetadata, palette: &'a Palette) -> Self {
        Self { metadata, palette }
    }

    /// Checks that the metadata text fields keep their records intact
    ///
    /// Chart name and number share their records with other fields, so they cannot hold
    /// a comma. No text field can hold a line break or `<Control-Z>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderText`] for the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        let m = self.metadata;
        let shared = [("title", &m.title), ("map id", &m.map_id)];
        let whole = [
            ("copyright", &m.copyright),
            ("chart format", &m.chart_format),
            ("agency", &m.agency),
            ("manufacturer", &m.manufacturer),
        ];
        let invalid = shared
            .into_iter()
            .find(|(_, v)| v.contains(',') || v.contains(RECORD_BREAKS))
            .or_else(|| whole.into_iter().find(|(_, v)| v.contains(RECORD_BREAKS)));
        match invalid {
            Some((field, value)) => Err(Error::HeaderText {
                field,
                value: value.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Returns the header text for a `width` x `height` image, without the terminator
    #[must_use]
    pub fn header_text(&self, width: u32, height: u32) -> String {
        let m = self.metadata;
        let bb = &m.bounding_box;
        let (north, south, east, west) = (
            Decimal(bb.north),
            Decimal(bb.south),
            Decimal(bb.east),
            Decimal(bb.west),
        );
        let (right, bottom) = (width.saturating_sub(1), height.saturating_sub(1));

        let mut h = String::new();
        let _ = write!(h, "{}{COMMENT}{CRLF}", Record::Comment.as_str());
        line(&mut h, Record::VER, Decimal(m.version));
        line(&mut h, Record::CRR, &m.copyright);
        line(&mut h, Record::CHT, format!("NA={},NU={}", m.title, m.map_id));
        line(&mut h, Record::CHF, &m.chart_format);
        line(
            &mut h,
            Record::CED,
            format!(
                "SE={},RE={},ED={}",
                m.source_edition,
                m.raster_edition,
                m.edition_date.format(DATE_FORMAT)
            ),
        );
        line(
            &mut h,
            Record::BSB,
            format!(
                "NA={},NU={},RA={width},{height},DU={}",
                m.title,
                m.map_id,
                Decimal(m.dpi)
            ),
        );
        line(&mut h, Record::ORG, &m.agency);
        line(&mut h, Record::MFR, &m.manufacturer);
        line(
            &mut h,
            Record::KNP,
            format!(
                "PR=MERCATOR,GD=WGS84,SC={},SD=LAT,UN=METRES,SK=0.0,TA=90.0,PI=UNKNOWN,SP=UNKNOWN,PP={}",
                Decimal(m.scale),
                Decimal(m.projection_parameter)
            ),
        );

        // corners: top-left, top-right, bottom-right, bottom-left
        line(&mut h, Record::REF, format!("1,0,0,{north},{west}"));
        line(&mut h, Record::REF, format!("2,{right},0,{north},{east}"));
        line(&mut h, Record::REF, format!("3,{right},{bottom},{south},{east}"));
        line(&mut h, Record::REF, format!("4,0,{bottom},{south},{west}"));
        line(&mut h, Record::PLY, format!("1,{north},{west}"));
        line(&mut h, Record::PLY, format!("2,{north},{east}"));
        line(&mut h, Record::PLY, format!("3,{south},{east}"));
        line(&mut h, Record::PLY, format!("4,{south},{west}"));

        line(&mut h, Record::DTM, "0.0,0.0");
        line(&mut h, Record::CPH, "0.0");
        line(&mut h, Record::OST, 1);
        line(&mut h, Record::IFM, DEPTH);
        for (i, [r, g, b]) in self.palette.iter() {
            line(&mut h, Record::RGB, format!("{i},{r},{g},{b}"));
        }
        h
    }

    /// Writes the header and its terminator to `sink`, returning the bytes written
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderText`] before writing if [`Self::validate`] fails, and
    /// propagates errors from the underlying writer.
    pub fn write_to<W: Write>(
        &self,
        sink: &mut KapSink<W>,
        width: u32,
        height: u32,
    ) -> Result<u64, Error> {
        self.validate()?;
        let start = sink.position();
        let h = self.header_text(width, height);
        trace!("HEADER:\n{h}");
        sink.write_all(h.as_bytes())?;
        sink.write_all(&[CTRL_Z, 0x00])?;
        let written = sink.position() - start;
        debug!("Wrote {written} header bytes");
        Ok(written)
    }
}

fn line(buf: &mut String, record: Record, value: impl Display) {
    let _ = write!(buf, "{}/{value}{CRLF}", record.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, str::FromStr};
    use strum::IntoEnumIterator;

    fn metadata() -> ChartMetadata {
        ChartMetadata::builder()
            .title("Gdansk".to_owned())
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
            .edition_date(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap())
            .build()
    }

    fn palette() -> Palette {
        Palette::new(vec![[255, 255, 255], [0, 0, 0], [12, 34, 56]]).unwrap()
    }

    #[test]
    fn records_in_order() {
        let metadata = metadata();
        let palette = palette();
        let text = HeaderWriter::new(&metadata, &palette).header_text(300, 200);
        let expected = [
            "! - KAP file (see details in http://opencpn.org/ocpn/kap_format) ",
            "VER/3.0",
            "CRR/map.openseamap.org",
            "CHT/NA=Gdansk,NU=13-4584-2621_13-4595-2648",
            "CHF/Overview",
            "CED/SE=1,RE=2,ED=2024/03/07",
            "BSB/NA=Gdansk,NU=13-4584-2621_13-4595-2648,RA=300,200,DU=254.0",
            "ORG/OpenSeaMap",
            "MFR/OpenSeaMap",
            "KNP/PR=MERCATOR,GD=WGS84,SC=12312.0,SD=LAT,UN=METRES,SK=0.0,TA=90.0,PI=UNKNOWN,SP=UNKNOWN,PP=3.9713005970690602",
            "REF/1,0,0,54.239550531561775,21.4453125",
            "REF/2,299,0,54.239550531561775,21.9287109375",
            "REF/3,299,199,53.54030739150021,21.9287109375",
            "REF/4,0,199,53.54030739150021,21.4453125",
            "PLY/1,54.239550531561775,21.4453125",
            "PLY/2,54.239550531561775,21.9287109375",
            "PLY/3,53.54030739150021,21.9287109375",
            "PLY/4,53.54030739150021,21.4453125",
            "DTM/0.0,0.0",
            "CPH/0.0",
            "OST/1",
            "IFM/7",
            "RGB/1,255,255,255",
            "RGB/2,0,0,0",
            "RGB/3,12,34,56",
            "",
        ];
        assert_eq!(text.split(CRLF).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn every_record_appears_the_documented_number_of_times() {
        let metadata = metadata();
        let palette = palette();
        let text = HeaderWriter::new(&metadata, &palette).header_text(10, 10);
        assert!(text.ends_with(CRLF));

        let mut counts = HashMap::new();
        for l in text.split_terminator(CRLF) {
            assert!(!l.contains('\n') && !l.contains('\r'));
            let tag = if l.starts_with('!') { "!" } else { &l[..3] };
            *counts.entry(Record::from_str(tag).unwrap()).or_insert(0) += 1;
        }
        for record in Record::iter() {
            let expected = match record {
                Record::REF | Record::PLY => 4,
                Record::RGB => palette.len(),
                _ => 1,
            };
            assert_eq!(counts.get(&record), Some(&expected), "{record:?}");
        }
    }

    #[test]
    fn terminated_by_ctrl_z_nul() {
        let metadata = metadata();
        let palette = palette();
        let writer = HeaderWriter::new(&metadata, &palette);
        let mut sink = KapSink::new(vec![]);
        let written = writer.write_to(&mut sink, 1, 1).unwrap();
        let out = sink.into_inner();
        assert_eq!(written, out.len() as u64);
        assert_eq!(&out[out.len() - 2..], &[0x1a, 0x00]);
        assert_eq!(out.iter().filter(|&&b| b == CTRL_Z).count(), 1);
        assert_eq!(&out[..out.len() - 2], writer.header_text(1, 1).as_bytes());
    }

    #[test]
    fn single_pixel_image_references_pixel_zero() {
        let metadata = metadata();
        let palette = palette();
        let text = HeaderWriter::new(&metadata, &palette).header_text(1, 1);
        assert!(text.contains("REF/3,0,0,53.54030739150021,21.9287109375\r\n"));
    }

    #[test]
    fn floats_never_use_exponents() {
        assert_eq!(Decimal(0.00001).to_string(), "0.00001");
        assert_eq!(Decimal(-0.00002).to_string(), "-0.00002");
        assert_eq!(Decimal(1e20).to_string(), "100000000000000000000.0");
        assert_eq!(Decimal(254.0).to_string(), "254.0");
        assert_eq!(Decimal(-2.05).to_string(), "-2.05");

        let metadata = ChartMetadata::builder()
            .title("t".to_owned())
            .map_id("m".to_owned())
            .scale(1e17)
            .dpi(254.0)
            .bounding_box(
                BoundingBox::builder()
                    .north(0.00001)
                    .south(-0.00001)
                    .east(0.00002)
                    .west(-0.00002)
                    .build(),
            )
            .build();
        let palette = palette();
        let text = HeaderWriter::new(&metadata, &palette).header_text(2, 2);
        assert!(text.contains("PLY/1,0.00001,-0.00002\r\n"));
        assert!(text.contains("SC=100000000000000000.0,"));
        assert!(!text.contains("e-"));
    }

    #[test]
    fn text_fields_cannot_break_records() {
        let palette = palette();
        let with = |title: &str, copyright: &str| {
            ChartMetadata::builder()
                .title(title.to_owned())
                .map_id("m".to_owned())
                .scale(1.0)
                .dpi(1.0)
                .bounding_box(BoundingBox::default())
                .copyright(copyright.to_owned())
                .build()
        };
        for (title, copyright) in [
            ("a,b", "c"),
            ("a\r\nVER/2.0", "c"),
            ("a\x1a", "c"),
            ("a", "c\nd"),
        ] {
            let metadata = with(title, copyright);
            let writer = HeaderWriter::new(&metadata, &palette);
            assert!(matches!(writer.validate(), Err(Error::HeaderText { .. })));
            let mut sink = KapSink::new(vec![]);
            assert!(writer.write_to(&mut sink, 1, 1).is_err());
            assert_eq!(sink.position(), 0);
        }
        // a comma is fine where the value fills its record
        let metadata = with("a", "me, 2024");
        assert!(HeaderWriter::new(&metadata, &palette).validate().is_ok());
    }

    #[test]
    fn defaults_are_overridable() {
        let metadata = ChartMetadata::builder()
            .title("t".to_owned())
            .map_id("m".to_owned())
            .scale(25000.0)
            .dpi(300.0)
            .bounding_box(BoundingBox::default())
            .copyright("me".to_owned())
            .chart_format("Harbour".to_owned())
            .build();
        let palette = palette();
        let text = HeaderWriter::new(&metadata, &palette).header_text(2, 2);
        assert!(text.contains("CRR/me\r\n"));
        assert!(text.contains("CHF/Harbour\r\n"));
        assert!(text.contains("SC=25000.0,"));
        assert!(text.contains("PLY/1,0.0,0.0\r\n"));
    }
}
