//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

/// Writes `value` as pretty TOML, creating parent directories as needed.
pub fn save_toml_config<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineConfig;
    use tempfile::TempDir;

    #[test]
    fn test_toml_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PipelineConfig::default();
        config.training.epochs = 3;
        save_toml_config(&config, &path).unwrap();

        let loaded: PipelineConfig = load_toml_config(&path).unwrap();
        assert_eq!(loaded.training.epochs, 3);
        assert_eq!(loaded.data.batch_size, config.data.batch_size);
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let result: Result<PipelineConfig> = load_toml_config(Path::new("/nonexistent/grain.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
