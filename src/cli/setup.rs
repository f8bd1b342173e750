use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::path::Path;

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Writes the example configuration to `path`, refusing to overwrite.
pub fn write_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}

/// Creates the configuration at `config_path` (or the default location) and
/// the database it points to.
pub fn run(config_path: Option<&str>) -> Result<()> {
    let path = match config_path {
        Some(path) => Path::new(path).to_path_buf(),
        None => AppConfig::default_config_path()?,
    };
    write_config(&path)?;
    println!("Created configuration at {}", path.display());

    let config = AppConfig::load_from_path(&path)?;
    super::db::init(&config)
}
