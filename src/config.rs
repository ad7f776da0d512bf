//! Configuration loaded from `bookvox.toml`.
//!
//! Keys not present in the file use the defaults below. The environment
//! variable `BOOKVOX_ENGINE` takes precedence over the file for the
//! backend command.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Top-level configuration loaded from `bookvox.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Synthesis backend command, resolved against PATH.
    #[serde(default = "default_engine_command")]
    pub engine_command: String,

    /// Container format of the produced audio artifact.
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// How the backend lays out its output.
    #[serde(default = "default_save_option")]
    pub save_option: String,

    /// Subtitle granularity passed to the backend.
    #[serde(default = "default_subtitle_mode")]
    pub subtitle_mode: String,

    /// Whether the backend should use the GPU when available.
    #[serde(default = "default_use_gpu")]
    pub use_gpu: bool,
}

fn default_engine_command() -> String {
    "kokoro-cli".to_string()
}

fn default_output_format() -> String {
    "m4b".to_string()
}

fn default_save_option() -> String {
    "Create a folder".to_string()
}

fn default_subtitle_mode() -> String {
    "Sentence".to_string()
}

fn default_use_gpu() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_command: default_engine_command(),
            output_format: default_output_format(),
            save_option: default_save_option(),
            subtitle_mode: default_subtitle_mode(),
            use_gpu: default_use_gpu(),
        }
    }
}

impl Config {
    /// Load the configuration from `bookvox.toml` in the current
    /// directory. Uses defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new("bookvox.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&contents)?
        } else {
            Self::default()
        };

        if let Ok(command) = std::env::var("BOOKVOX_ENGINE")
            && !command.is_empty()
        {
            config.engine_command = command;
        }

        Ok(config)
    }
}
