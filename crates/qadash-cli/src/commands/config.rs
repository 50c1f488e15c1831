//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use qadash_core::Config;

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
const KEYS: &str = "data_dir, api_url, request_timeout_secs, probe_timeout_secs, \
                    probe_interval_secs, refresh_interval_secs, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!("  api_url:               {}", config.api_url);
            println!("  request_timeout_secs:  {}", config.request_timeout_secs);
            println!("  probe_timeout_secs:    {}", config.probe_timeout_secs);
            println!("  probe_interval_secs:   {}", config.probe_interval_secs);
            println!("  refresh_interval_secs: {}", config.refresh_interval_secs);
            println!(
                "  log_file:              {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "api_url" => {
            if value.trim().is_empty() {
                bail!("api_url must not be empty");
            }
            config.api_url = value.trim().to_string();
        }
        "request_timeout_secs" => config.request_timeout_secs = parse_secs(key, value)?,
        "probe_timeout_secs" => config.probe_timeout_secs = parse_secs(key, value)?,
        "probe_interval_secs" => config.probe_interval_secs = parse_secs(key, value)?,
        "refresh_interval_secs" => config.refresh_interval_secs = parse_secs(key, value)?,
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }
    Ok(())
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a whole number of seconds.", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "api_url", " http://qa.local:3000/api ").unwrap();
        apply(&mut config, "probe_interval_secs", "15").unwrap();
        apply(&mut config, "log_file", "/tmp/qadash.log").unwrap();

        assert_eq!(config.api_url, "http://qa.local:3000/api");
        assert_eq!(config.probe_interval_secs, 15);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/qadash.log")));

        apply(&mut config, "log_file", "none").unwrap();
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_apply_rejects_bad_input() {
        let mut config = Config::default();
        assert!(apply(&mut config, "sync_url", "ws://x").is_err());
        assert!(apply(&mut config, "refresh_interval_secs", "soon").is_err());
        assert!(apply(&mut config, "api_url", "  ").is_err());
        assert_eq!(config.refresh_interval_secs, 30);
    }

    #[test]
    fn test_set_writes_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!("data_dir = {:?}\n", temp_dir.path().join("data")),
        )
        .unwrap();
        let output = Output::new(OutputFormat::Quiet);

        set(
            "refresh_interval_secs".to_string(),
            "45".to_string(),
            Some(&path),
            &output,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("refresh_interval_secs = 45"));
    }
}
