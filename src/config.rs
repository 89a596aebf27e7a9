//! Runtime configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{BedflowError, Result};

/// Settings shared by the loader, new sessions and the CLI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Directory holding the weekly CSV and optional auxiliary files
    pub data_dir: PathBuf,
    /// Event categories visible when a session starts
    pub default_visible_events: Vec<String>,
    /// Weeks shown on each side of a drill-down selection
    pub drilldown_half_window: u32,
    /// Rows printed in CLI table previews
    pub preview_rows: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_visible_events: vec!["flu".into(), "strike".into(), "donation".into()],
            drilldown_half_window: 6,
            preview_rows: 5,
        }
    }
}

impl DashboardConfig {
    /// Parse a JSON config file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| BedflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BedflowError::Config(e.to_string()))
    }
}
