//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use xword_core::Config;

use crate::output::{Output, OutputFormat};

const KEYS: &str = "data_dir, server_url, offline, display_name, color, defer_join, \
                    ack_timeout_ms, sync_timeout_ms, initial_reconnect_delay_ms, \
                    max_reconnect_delay_ms, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:      {}", config.data_dir.display());
            println!("  server_url:    {}", or_unset(config.server_url.as_deref()));
            println!("  offline:       {}", config.offline);
            println!("  display_name:  {}", or_unset(config.display_name.as_deref()));
            println!("  color:         {}", or_unset(config.color.as_deref()));
            println!("  defer_join:    {}", config.defer_join);
            println!("  ack_timeout:   {} ms", config.ack_timeout_ms);
            println!("  sync_timeout:  {} ms", config.sync_timeout_ms);
            println!(
                "  reconnect:     {} ms .. {} ms",
                config.initial_reconnect_delay_ms, config.max_reconnect_delay_ms
            );
            println!(
                "  log_file:      {}",
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

/// Print the config file location
pub fn path(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    println!("{}", path.display());
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

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "server_url" => config.server_url = optional(value),
        "offline" => config.offline = parse_bool(key, value)?,
        "display_name" => config.display_name = optional(value),
        "color" => config.color = optional(value),
        "defer_join" => config.defer_join = parse_bool(key, value)?,
        "ack_timeout_ms" => config.ack_timeout_ms = parse_ms(key, value)?,
        "sync_timeout_ms" => config.sync_timeout_ms = parse_ms(key, value)?,
        "initial_reconnect_delay_ms" => config.initial_reconnect_delay_ms = parse_ms(key, value)?,
        "max_reconnect_delay_ms" => config.max_reconnect_delay_ms = parse_ms(key, value)?,
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
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

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use 'true' or 'false'.", key))
}

fn parse_ms(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use milliseconds.", key))
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}
