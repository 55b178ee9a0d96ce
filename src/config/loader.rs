use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::SlotgateConfig;

/// Prefix for environment overrides, e.g. `SLOTGATE_GATE__CAPACITY=16`.
pub const ENV_PREFIX: &str = "SLOTGATE";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<SlotgateConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<SlotgateConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let config: SlotgateConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(config)
}

/// Load the file if it exists, otherwise fall back to defaults.
pub fn load_config_or_default(config_path: &str) -> Result<SlotgateConfig> {
    if Path::new(config_path).exists() {
        load_config_sync(config_path)
    } else {
        tracing::debug!("No configuration at {config_path}, using defaults");
        Ok(SlotgateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
[gate]
capacity = 4
label = "crawler"

[fetch]
method = "HEAD"
timeout = "5s"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.gate.capacity, 4);
        assert_eq!(config.gate.label, "crawler");
        assert_eq!(config.gate.error_buffer, 10);
        assert_eq!(config.fetch.method, "HEAD");
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
gate:
  capacity: 2
  error_buffer: 32
logging:
  json: true
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.gate.capacity, 2);
        assert_eq!(config.gate.error_buffer, 32);
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_or_default("/nonexistent/slotgate.toml").unwrap();
        assert_eq!(config.gate.capacity, 8);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_config_sync("/nonexistent/slotgate.toml").is_err());
    }
}
