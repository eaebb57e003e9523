use clap::{ArgGroup, Parser, ValueEnum};
use starsample::{CanopyMode, ZUnits};
use std::path::PathBuf;

/// Sample land cover, elevation, and canopy rasters along star
/// pattern transects around stream nodes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("fixed_azimuths").args(["heatsource8", "perpendicular"])))]
pub struct Cli {
    /// Stream nodes, a GeoJSON FeatureCollection of points.
    ///
    /// Sampled attributes are written back to this file.
    pub nodes: PathBuf,

    /// Output sample points, written as GeoJSON text sequence.
    pub out: PathBuf,

    /// Number of evenly spaced transects per node.
    #[arg(short, long, default_value_t = 8)]
    pub transects: u16,

    /// Number of samples along each transect, not counting the sample
    /// at the node.
    #[arg(short, long, default_value_t = 4)]
    pub samples: u16,

    /// Distance between samples along a transect (meters).
    #[arg(long, default_value_t = 8.0)]
    pub spacing: f64,

    /// Use the seven Heat Source 8 transect directions.
    #[arg(long)]
    pub heatsource8: bool,

    /// Use two transects perpendicular to the stream.
    #[arg(long)]
    pub perpendicular: bool,

    /// Land cover raster (.flt).
    #[arg(long)]
    pub lc: PathBuf,

    /// Land cover height units: Meters, Feet, a factor to meters, or
    /// anything else to keep values as-is.
    #[arg(long, default_value_t = ZUnits::Other)]
    pub lc_units: ZUnits,

    /// Land cover values are codes rather than heights.
    #[arg(long)]
    pub lc_codes: bool,

    /// What the canopy raster holds.
    #[arg(long, value_enum)]
    pub canopy_type: Option<CanopyType>,

    /// Canopy cover or LAI raster (.flt).
    #[arg(long)]
    pub canopy: Option<PathBuf>,

    /// Extinction coefficient raster (.flt), LAI mode only.
    #[arg(long)]
    pub k: Option<PathBuf>,

    /// Overhang raster (.flt).
    #[arg(long)]
    pub oh: Option<PathBuf>,

    /// Elevation raster (.flt).
    #[arg(long)]
    pub ele: PathBuf,

    /// Elevation units.
    #[arg(long, default_value_t = ZUnits::Meters)]
    pub ele_units: ZUnits,

    /// Edge length of a processing block (kilometres), defaults to 5.
    ///
    /// Lower this if extraction runs out of memory.
    #[arg(long)]
    pub block_size: Option<f64>,

    /// Only sample nodes without results instead of starting over.
    #[arg(short = 'R', long)]
    pub resume: bool,

    /// Number of blocks to sample at once.
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanopyType {
    /// Leaf area index, sampled with k and overhang.
    Lai,
    /// Canopy cover, sampled with overhang.
    CanopyCover,
}

impl From<CanopyType> for CanopyMode {
    fn from(canopy: CanopyType) -> Self {
        match canopy {
            CanopyType::Lai => Self::Lai,
            CanopyType::CanopyCover => Self::CanopyCover,
        }
    }
}
