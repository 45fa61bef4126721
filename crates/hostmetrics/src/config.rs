//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use hostmetrics_collector::AVAILABLE_COLLECTORS;
use hostmetrics_mi::{DestinationOptions, Locale, Namespace};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "HOSTMETRICS_CONFIG";

/// Top-level configuration for the hostmetrics daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Session settings
    #[serde(default)]
    pub mi: MiConfig,
    /// Provider backing the sessions
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Enabled collectors
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

/// Daemon server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

fn default_bind() -> String {
    "127.0.0.1:9182".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiConfig {
    /// Session handshake timeout in seconds; 0 keeps the provider default
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Locale for provider-localized strings; empty keeps the provider default
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Namespace for ad hoc queries
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for MiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            locale: default_locale(),
            namespace: default_namespace(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_locale() -> String {
    Locale::english().as_str().to_string()
}

fn default_namespace() -> String {
    Namespace::ROOT_CIMV2.as_str().to_string()
}

impl MiConfig {
    /// Session options built from this section
    #[must_use]
    pub fn destination_options(&self) -> DestinationOptions {
        let options = DestinationOptions::new().with_timeout(Duration::from_secs(self.timeout_secs));
        match self.locale.trim() {
            "" => options,
            locale => options.with_locale(Locale::new(locale)),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.namespace.clone())
    }
}

/// Provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// JSON snapshot of classes and perf objects to serve
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

/// Collector selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Collectors to run, in scrape order
    #[serde(default = "default_collectors")]
    pub enabled: Vec<String>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_collectors(),
        }
    }
}

fn default_collectors() -> Vec<String> {
    AVAILABLE_COLLECTORS.iter().map(|c| (*c).to_string()).collect()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Find the config file: the environment variable first, then the
    /// common paths
    #[must_use]
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        let paths = [
            Some(PathBuf::from("hostmetrics.toml")),
            Some(PathBuf::from("/etc/hostmetrics/hostmetrics.toml")),
            dirs::config_dir().map(|p| p.join("hostmetrics/hostmetrics.toml")),
        ];
        paths.into_iter().flatten().find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.daemon.bind, "127.0.0.1:9182");
        assert_eq!(config.daemon.log_format, LogFormat::Text);
        assert_eq!(config.collectors.enabled, vec!["cache", "printer"]);
        assert_eq!(config.mi.namespace(), Namespace::ROOT_CIMV2);
        assert_eq!(config.provider.snapshot, None);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            [daemon]
            bind = "0.0.0.0:9999"
            log_level = "debug"
            log_format = "json"

            [mi]
            timeout_secs = 0
            namespace = "root/wmi"

            [provider]
            snapshot = "/var/lib/hostmetrics/snapshot.json"

            [collectors]
            enabled = ["printer"]
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.bind, "0.0.0.0:9999");
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.log_format, LogFormat::Json);
        assert_eq!(config.mi.locale, "en-US");
        assert!(config.mi.namespace().matches(Namespace::ROOT_WMI.as_str()));
        assert_eq!(
            config.provider.snapshot,
            Some(PathBuf::from("/var/lib/hostmetrics/snapshot.json"))
        );
        assert_eq!(config.collectors.enabled, vec!["printer"]);

        let options = config.mi.destination_options();
        assert_eq!(options.timeout(), None);
        assert_eq!(options.locale(), Some(&Locale::english()));
    }

    #[test]
    fn test_destination_options_timeout() {
        let mi = MiConfig {
            timeout_secs: 3,
            locale: String::new(),
            ..MiConfig::default()
        };
        let options = mi.destination_options();
        assert_eq!(options.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(options.locale(), None);
    }

    #[test]
    fn test_empty_locale_keeps_provider_default() {
        let config = Config::parse("[mi]\nlocale = \"\"\n").unwrap();
        assert_eq!(config.mi.destination_options().locale(), None);

        let config = Config::parse("[mi]\nlocale = \"de-DE\"\n").unwrap();
        assert_eq!(
            config.mi.destination_options().locale(),
            Some(&Locale::new("de-DE"))
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(Config::parse("[daemon]\nbind = 9").is_err());
    }
}
