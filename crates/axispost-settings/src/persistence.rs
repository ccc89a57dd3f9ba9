//! Loading and saving post parameters
//!
//! Files are JSON or TOML, chosen by extension. Both paths validate so an
//! invalid parameter set never reaches the posting stages.

use axispost_core::{PostError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::params::PostParameters;

const CONFIG_DIR_NAME: &str = "axispost";
const CONFIG_FILE_NAME: &str = "post_parameters.toml";

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    if path.extension().is_some_and(|ext| ext == "json") {
        Ok(Format::Json)
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        Ok(Format::Toml)
    } else {
        Err(PostError::other(
            "Post parameter file must be .json or .toml".to_string(),
        ))
    }
}

impl PostParameters {
    /// Load parameters from a JSON or TOML file and validate them
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| PostError::other(format!("Failed to read post parameters: {}", e)))?;

        let params: Self = match format {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| PostError::other(format!("Invalid JSON post parameters: {}", e)))?,
            Format::Toml => toml::from_str(&content)
                .map_err(|e| PostError::other(format!("Invalid TOML post parameters: {}", e)))?,
        };

        params.validate()?;
        debug!("Loaded post parameters from {}", path.display());
        Ok(params)
    }

    /// Validate and save parameters as JSON or TOML
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| PostError::other(format!("Failed to serialize post parameters: {}", e)))?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| PostError::other(format!("Failed to serialize post parameters: {}", e)))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PostError::other(format!("Failed to create config directory: {}", e))
                })?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| PostError::other(format!("Failed to write post parameters: {}", e)))?;

        info!("Saved post parameters to {}", path.display());
        Ok(())
    }

    /// Platform configuration location for the parameter file
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or the default location when `None`, falling back
    /// to defaults when no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_config_path(),
        };
        match path {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }
}
