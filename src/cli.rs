use clap::Parser;
use std::path::PathBuf;

use crate::entities::segment::LabelMode;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Store:  JSON recordings, ';' label CSV\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless segment editor for multi-channel sensor recordings
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Recording to open (JSON)
    #[arg(value_name = "RECORDING")]
    pub recording: PathBuf,

    /// Active label mode
    #[arg(short = 'm', long = "mode", value_name = "gestures|attention", default_value = "gestures")]
    pub mode: LabelMode,

    /// Crop the recording to [START, END) before editing
    #[arg(long = "crop", value_names = ["START", "END"], num_args = 2)]
    pub crop: Option<Vec<usize>>,

    /// Replace the active mode's segments with a label CSV
    #[arg(short = 'i', long = "import-labels", value_name = "FILE")]
    pub import_labels: Option<PathBuf>,

    /// Write the active mode's segments to a label CSV
    #[arg(short = 'e', long = "export-labels", value_name = "FILE")]
    pub export_labels: Option<PathBuf>,

    /// Store the active mode's segments back into the recording
    #[arg(short = 's', long = "store")]
    pub store: bool,

    /// Camera frame directory (can be specified multiple times)
    #[arg(long = "images", value_name = "DIR")]
    pub images: Vec<PathBuf>,

    /// Simulate playback for the given number of seconds
    #[arg(short = 'p', long = "play", value_name = "SECONDS")]
    pub play: Option<f64>,

    /// Run the DTW variance report over a snapshot directory
    #[arg(short = 'r', long = "report", value_name = "SNAPSHOT_DIR")]
    pub report: Option<PathBuf>,

    /// Output directory of the report (default: the snapshot directory)
    #[arg(long = "report-out", value_name = "DIR", requires = "report")]
    pub report_out: Option<PathBuf>,

    /// Enable logging to file (default: annotrack.log in the data directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom config directory (overrides default platform location)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Crop range as `(start, end)`.
    pub fn crop_range(&self) -> Option<(usize, usize)> {
        match self.crop.as_deref() {
            Some([start, end]) => Some((*start, *end)),
            _ => None,
        }
    }
}
