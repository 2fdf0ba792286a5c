//! CLI configuration.

use std::path::Path;

use sds_core::SdsSettings;
use serde::{Deserialize, Serialize};

use crate::CliError;

/// Loads the settings file.
///
/// A `.env` file in the working directory is read first, so `SPINE_*`
/// overrides can live there.
pub fn load_settings(path: &Path) -> crate::CliResult<SdsSettings> {
    let _ = dotenvy::dotenv();

    if !path.exists() {
        return Err(CliError::Config(format!(
            "settings file not found: {}",
            path.display()
        )));
    }

    Ok(SdsSettings::load(path)?)
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}
