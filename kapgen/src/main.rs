use kapgen::{
    default_output_name, image_to_kap, parse_bounds, parse_chart_name, verify_kap,
    ChartDefinition,
};
use libkap::{
    BoundingBox, ChartMetadata, KapEncoder, MissPolicy, Palette, DEFAULT_INDEX, DEFAULT_THRESHOLD,
};
use std::{fs, path::PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(not(debug_assertions))]
const DEFAULT_DEBUG_LEVEL: u8 = 2;
#[cfg(debug_assertions)]
const DEFAULT_DEBUG_LEVEL: u8 = 3;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, default_value_t = DEFAULT_DEBUG_LEVEL, action = clap::ArgAction::Count)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

/// What to do with pixels that match no palette color
#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Use the fallback index
    Fallback,
    /// Use the closest color regardless of distance
    Nearest,
    /// Abort the conversion
    Reject,
}

#[derive(Subcommand)]
enum Commands {
    /// converts a composed map image to a BSB/KAP file
    #[command(name = "imgkap")]
    ImageToKap {
        /// The image
        img_file: PathBuf,
        /// Palette resource holding `RGB/` lines
        #[arg(short, long)]
        palette: PathBuf,
        /// Chart name
        #[arg(short, long, value_parser = parse_chart_name)]
        title: String,
        /// Resolution of the image
        #[arg(long, default_value_t = 254.0)]
        dpi: f64,
        /// Chart definition file (tiles, corners and scale)
        #[arg(short, long, conflicts_with = "bounds", required_unless_present = "bounds")]
        definition: Option<PathBuf>,
        /// Chart bounds as north,south,east,west
        #[arg(long, value_parser = parse_bounds, requires_all = ["scale", "map_id"], allow_hyphen_values = true)]
        bounds: Option<BoundingBox>,
        /// Chart scale, with --bounds
        #[arg(long)]
        scale: Option<f64>,
        /// Chart number, with --bounds
        #[arg(long, value_parser = parse_chart_name)]
        map_id: Option<String>,
        /// The output file name
        #[arg(short, long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,
        /// Directory of the generated `<title>_L<map_id>.kap`
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Handling of pixels with no palette color within the threshold
        #[arg(long, value_enum, default_value_t = Policy::Fallback)]
        miss_policy: Policy,
        /// Palette index used by the fallback policy
        #[arg(long, default_value_t = DEFAULT_INDEX)]
        fallback_index: u8,
        /// Distance a palette color must be under to match a pixel
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },

    /// checks the layout of a BSB/KAP file
    Verify {
        /// The kap image
        kap_file: PathBuf,
        /// Image height, enables the row index checks
        #[arg(long)]
        rows: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(level).into())
                .from_env_lossy(),
        )
        .with_file(true)
        .with_line_number(true)
        .init();

    match cli.command {
        Commands::ImageToKap {
            img_file,
            palette,
            title,
            dpi,
            definition,
            bounds,
            scale,
            map_id,
            output,
            output_dir,
            miss_policy,
            fallback_index,
            threshold,
        } => {
            let (bounding_box, scale, map_id) = match (definition, bounds, scale, map_id) {
                (Some(def), ..) => {
                    let def = ChartDefinition::from_file(&def)?;
                    let map_id = def.map_id();
                    (def.bounding_box, def.scale, map_id)
                }
                (None, Some(bounds), Some(scale), Some(map_id)) => (bounds, scale, map_id),
                _ => bail!("Either --definition or --bounds, --scale and --map-id are required"),
            };
            let palette = Palette::from_file(&palette)
                .with_context(|| format!("Invalid palette {}", palette.display()))?;

            let metadata = ChartMetadata::builder()
                .title(title)
                .map_id(map_id)
                .scale(scale)
                .dpi(dpi)
                .bounding_box(bounding_box)
                .build();
            let policy = match miss_policy {
                Policy::Fallback => MissPolicy::Fallback(fallback_index),
                Policy::Nearest => MissPolicy::Nearest,
                Policy::Reject => MissPolicy::Reject,
            };

            let output = output.unwrap_or_else(|| {
                default_output_name(
                    &output_dir.unwrap_or_default(),
                    &metadata.title,
                    &metadata.map_id,
                )
            });
            if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Unable to create {}", dir.display()))?;
            }
            info!("output name: {}", output.display());

            let encoder = KapEncoder::new(&metadata, &palette)
                .with_threshold(threshold)
                .with_policy(policy);
            let (summary, _) = image_to_kap(&img_file, &output, &encoder)?;
            println!("{} ({} bytes)", output.display(), summary.total_len);
        }
        Commands::Verify { kap_file, rows } => {
            let report = verify_kap(&kap_file, rows)?;
            println!(
                "{}: {} bytes, depth {}, binary section at {:#x}",
                kap_file.display(),
                report.file_size,
                report.depth,
                report.raster_start
            );
            if let Some(index) = report.index {
                println!("index: {} rows", index.rows());
            }
        }
    }
    Ok(())
}
