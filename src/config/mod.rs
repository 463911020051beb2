mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./segcast.toml", "~/.config/segcast/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.queue_capacity == 0 {
        anyhow::bail!("Server queue_capacity cannot be 0");
    }

    if config.server.send_timeout_secs == 0 {
        anyhow::bail!("Server send_timeout_secs cannot be 0");
    }

    if config.watch.poll_interval_ms == 0 {
        anyhow::bail!("Watch poll_interval_ms cannot be 0");
    }

    if config.watch.prefix.is_empty() {
        anyhow::bail!("Watch prefix cannot be empty");
    }

    if config.watch.extension.trim_start_matches('.').is_empty() {
        anyhow::bail!("Watch extension cannot be empty");
    }

    if config.encoder.segment_time_secs == 0 {
        anyhow::bail!("Encoder segment_time_secs cannot be 0");
    }

    if let Some(path) = &config.encoder.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    Ok(())
}
