pub mod anchor;
pub mod assets;
pub mod config;
pub mod docx;
mod error;
pub mod floating;
pub mod geometry;
pub mod grades;
pub mod image_prep;
pub mod model;
pub mod report;
pub mod units;
pub mod xml;

pub use config::Config;
pub use error::{Error, ErrorScope};
pub use report::{BatchSummary, run_batch};

use std::path::Path;

/// Loads the config at `config_path` and generates every student's report.
pub fn generate_reports(config_path: &Path, limit: Option<usize>) -> Result<BatchSummary, Error> {
    let config = Config::load(config_path)?;
    run_batch(&config, limit)
}
