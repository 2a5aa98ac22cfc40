use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GeoConvert - geographic file format conversion
#[derive(Parser, Debug)]
#[command(name = "geoconvert")]
#[command(about = "Convert geographic files between GeoJSON, KML/KMZ, Shapefile, GPX and CSV", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert one or more files to a target format
    Convert(ConvertArgs),

    /// Detect the format of a file and summarize its contents
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Input files (GeoJSON, KML, KMZ, zipped Shapefile, GPX, CSV)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Target format: geojson, kml, kmz, shapefile, gpx or csv
    #[arg(long, short = 't')]
    pub to: String,

    /// Merge all inputs into a single output file instead of producing
    /// one archive entry per input
    #[arg(long)]
    pub merge: bool,

    /// Output directory (defaults to the current directory)
    #[arg(long, short = 'o', default_value = ".")]
    pub out_dir: PathBuf,

    /// Base label for batch output names
    #[arg(long, default_value = "converted")]
    pub label: String,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// File to inspect
    pub input: PathBuf,

    /// Print the parsed features as GeoJSON to stdout
    #[arg(long)]
    pub dump: bool,
}
