//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ooi_m2m::{config::DEFAULT_BASE_URL, Format};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API username
    #[arg(long, env = "OOI_USERNAME", global = true, hide_env_values = true)]
    pub username: Option<String>,

    /// API token
    #[arg(long, env = "OOI_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Sensor inventory root
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Job cache file
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Days before a cached job is resubmitted
    #[arg(long, global = true, default_value_t = 14)]
    pub expiry_days: u32,

    /// Seconds to wait for a connection
    #[arg(long, global = true, default_value_t = 3)]
    pub connect_timeout: u64,

    /// Seconds a read may stall before the request fails
    #[arg(long, global = true, default_value_t = 120)]
    pub read_timeout: u64,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List sites
    Sites {},
    /// List nodes on a site
    Nodes { site: String },
    /// List sensors on a node
    Sensors { site: String, node: String },
    /// List delivery methods of a sensor
    Methods {
        site: String,
        node: String,
        sensor: String,
    },
    /// List streams of a delivery method
    Streams {
        site: String,
        node: String,
        sensor: String,
        method: String,
    },
    /// Show sensor metadata
    Metadata {
        site: String,
        node: String,
        sensor: String,
    },
    /// Prepare a request and list its result files
    Files(RequestArgs),
    /// Prepare a request, download its result files and merge them
    Fetch {
        #[command(flatten)]
        request: RequestArgs,

        /// Merged parquet file (parquet format only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for raw result files (formats without a decoder)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Args, Clone)]
pub struct RequestArgs {
    pub site: String,
    pub node: String,
    pub sensor: String,
    pub method: String,
    pub stream: String,

    /// Start of the time range, RFC 3339 or YYYY-MM-DD
    #[arg(long)]
    pub begin: String,

    /// End of the time range, RFC 3339 or YYYY-MM-DD
    #[arg(long)]
    pub end: String,

    /// Result file format
    #[arg(long, value_enum, default_value_t = Format::NetCdf)]
    pub format: Format,

    /// Regular expression result file names must match
    #[arg(long)]
    pub pattern: Option<String>,

    /// Skip result files containing this text, e.g. VELPT
    #[arg(long)]
    pub exclude: Option<String>,

    /// Status checks before giving up
    #[arg(long, default_value_t = 400)]
    pub max_attempts: u32,

    /// Seconds between status checks
    #[arg(long, default_value_t = 3)]
    pub poll_interval: u64,

    /// Parallel downloads
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Download in parallel only above this many files
    #[arg(long, default_value_t = 5)]
    pub threshold: usize,
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("valid progress template")
            .progress_chars("##-"),
    )
}
