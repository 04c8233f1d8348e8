use crate::connection::RetryPolicy;
use crate::filter::FilterCriteria;
use crate::types::LogLevel;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "logstream-viewer", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Override log server origin (http:// or https://)
    #[clap(long)]
    pub server_url: Option<String>,

    /// Start scoped to a single client
    #[clap(long)]
    pub client: Option<String>,

    /// Comma-separated levels to show
    #[clap(long, value_delimiter = ',')]
    pub levels: Option<Vec<LogLevel>>,

    /// Initial keyword filter
    #[clap(long)]
    pub keyword: Option<String>,

    /// Number of log rows to render
    #[clap(long)]
    pub rows: Option<usize>,

    /// Disable colors and screen clearing
    #[clap(long)]
    pub no_color: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub client: Option<String>,
    pub reconnect: ReconnectConfig,
    pub display: DisplayConfig,
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub rows: usize,
    pub color: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub levels: Vec<LogLevel>,
    pub keyword: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            client: None,
            reconnect: ReconnectConfig::default(),
            display: DisplayConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_retries,
            delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            rows: 40,
            color: true,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            levels: LogLevel::ALL.to_vec(),
            keyword: String::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.reconnect.max_attempts,
            delay: Duration::from_millis(self.reconnect.delay_ms),
        }
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            levels: self.filter.levels.iter().copied().collect(),
            keyword: self.filter.keyword.clone(),
        }
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(ref server_url) = cli.server_url {
            self.server_url = server_url.clone();
        }

        if let Some(ref client) = cli.client {
            self.client = Some(client.clone());
        }

        if let Some(ref levels) = cli.levels {
            self.filter.levels = levels.clone();
        }

        if let Some(ref keyword) = cli.keyword {
            self.filter.keyword = keyword.clone();
        }

        if let Some(rows) = cli.rows {
            self.display.rows = rows;
        }

        if cli.no_color {
            self.display.color = false;
        }
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            Config::from_toml_str(&content)?
        }
        None => Config::default(),
    };

    // Apply CLI overrides
    config.apply_overrides(cli);

    if config.display.rows == 0 {
        anyhow::bail!("display.rows must be at least 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_browser_dashboard() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.criteria(), FilterCriteria::default());
    }

    #[test]
    fn file_values_are_read_per_section() {
        let config = Config::from_toml_str(
            r#"
            server_url = "https://logs.example.com"

            [reconnect]
            max_attempts = 2
            delay_ms = 500

            [filter]
            levels = ["ERROR", "CRITICAL"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server_url, "https://logs.example.com");
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_retries: 2,
                delay: Duration::from_millis(500),
            }
        );
        assert_eq!(config.filter.levels, vec![LogLevel::Error, LogLevel::Critical]);
        assert_eq!(config.display, DisplayConfig::default());
    }

    #[test]
    fn cli_overrides_file() {
        let cli = Cli::parse_from([
            "logstream-viewer",
            "--server-url",
            "http://10.0.0.5:9000",
            "--client",
            "terminal-7",
            "--levels",
            "warning,error",
            "--rows",
            "5",
            "--no-color",
        ]);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.server_url, "http://10.0.0.5:9000");
        assert_eq!(config.client.as_deref(), Some("terminal-7"));
        assert_eq!(config.filter.levels, vec![LogLevel::Warning, LogLevel::Error]);
        assert_eq!(config.display.rows, 5);
        assert!(!config.display.color);
    }

    #[test]
    fn zero_rows_is_rejected() {
        let cli = Cli::parse_from(["logstream-viewer", "--rows", "0"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn unknown_level_in_file_fails() {
        assert!(Config::from_toml_str("[filter]\nlevels = [\"LOUD\"]").is_err());
    }
}
