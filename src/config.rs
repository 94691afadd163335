use std::path::PathBuf;
use std::time::Duration;

/// Columns that may carry an image URL, visited in this order.
pub const IMAGE_COLUMNS: [&str; 4] = ["#ImageLink", "#ImageLink2", "#ImageLink3", "#ImageLink4"];

/// Column holding the aircraft's ICAO hex code.
pub const CODE_COLUMN: &str = "$ICAO";

/// Name of the tracking file inside the output directory.
pub const TRACKING_FILE: &str = "downloaded_images.json";

pub const DEFAULT_OUTPUT_DIR: &str = "plane-images";
pub const DEFAULT_SOURCE_PREFIX: &str = "plane-alert-";
pub const DEFAULT_SOURCE_SUFFIX: &str = "-images.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Settings for one fetch run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for input CSV files.
    pub input_dir: PathBuf,
    /// Directory images and the tracking file are written to.
    pub output_dir: PathBuf,
    /// Input files must start with this.
    pub source_prefix: String,
    /// Input files must end with this.
    pub source_suffix: String,
    pub image_columns: Vec<String>,
    pub code_column: String,
    /// Stop after this many new downloads. `Some(0)` is the same as `None`.
    pub limit: Option<usize>,
    /// Upper bound on each wait for the remote server.
    pub timeout: Duration,
}

impl Config {
    pub fn tracking_path(&self) -> PathBuf {
        self.output_dir.join(TRACKING_FILE)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            source_prefix: DEFAULT_SOURCE_PREFIX.to_string(),
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            image_columns: IMAGE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            code_column: CODE_COLUMN.to_string(),
            limit: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
