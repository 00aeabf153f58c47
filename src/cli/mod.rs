//! Command-line interface for the collator.
//!
//! Reads measurements from stdin, one per line, and ships them in
//! collated batches:
//!
//! ```text
//! gauge queue.depth 17
//! counter jobs.done 1
//! gauge latency {"count": 4, "sum": 10.5}
//! ```

use crate::collator::{CollatedClient, Measurement, MetricKind};
use crate::core::{CollatorError, Config, ConfigBuilder, Result};
use crate::transport::{HttpTransport, StdoutTransport, Transport};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Collate metric measurements from stdin into batched requests
#[derive(Parser, Debug)]
#[command(name = "collator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/collator/config.yaml)
    #[arg(short, long, env = "COLLATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// API user for basic auth
    #[arg(long, env = "COLLATOR_USER")]
    pub user: Option<String>,

    /// API token for basic auth
    #[arg(long, env = "COLLATOR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Source label attached to every measurement
    #[arg(long, env = "COLLATOR_SOURCE")]
    pub source: Option<String>,

    /// Flush interval, e.g. "5s" or "1m"
    #[arg(long, env = "COLLATOR_INTERVAL", value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Flush early once this many measurements are pending
    #[arg(long, env = "COLLATOR_MAX_BATCH")]
    pub max_batch: Option<usize>,

    /// Print batches to stdout instead of posting them
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, env = "COLLATOR_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            Some(path.clone())
        } else {
            dirs::config_dir()
                .map(|d| d.join("collator").join("config.yaml"))
                .filter(|path| path.exists())
        };

        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    debug!("Loaded configuration from: {:?}", path);
                },
                Err(e) => {
                    return Err(CollatorError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
            }
        }

        self.apply_overrides(builder)
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(interval) = self.interval {
            builder = builder.flush_interval(interval);
        }
        if let Some(max) = self.max_batch {
            builder = builder.max_batch_size(max);
        }
        if let Some(source) = &self.source {
            builder = builder.source(source.clone());
        }
        if let (Some(user), Some(token)) = (&self.user, &self.token) {
            builder = builder.credentials(user.clone(), token.clone());
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("COLLATOR_LOG_LEVEL")
            .unwrap_or_else(|_| config.logging.level.as_str().to_string());
        let log_level = if config.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        // Logs go to stderr so --dry-run output stays clean
        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CollatorError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }

    fn transport(&self, config: &Config) -> Result<Arc<dyn Transport>> {
        if self.dry_run {
            return Ok(Arc::new(StdoutTransport::new()));
        }

        if !config.has_credentials() {
            return Err(CollatorError::config(
                "user and token are required unless --dry-run is set",
            ));
        }

        Ok(Arc::new(HttpTransport::new(&config.endpoint)?))
    }
}

/// Parse one input line.
///
/// Returns `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<(MetricKind, String, Measurement)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.splitn(3, char::is_whitespace);
    let kind = match parts.next() {
        Some("gauge" | "g") => MetricKind::Gauge,
        Some("counter" | "c") => MetricKind::Counter,
        Some(other) => {
            return Err(CollatorError::parse(format!("unknown metric kind '{}'", other)));
        },
        None => return Ok(None),
    };

    let name = parts
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CollatorError::parse("missing metric name"))?;

    let raw = parts
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CollatorError::parse(format!("missing value for '{}'", name)))?;

    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| CollatorError::parse(format!("invalid value '{}': {}", raw, e)))?;

    match value {
        serde_json::Value::Number(_) | serde_json::Value::Object(_) => {
            Ok(Some((kind, name.to_string(), Measurement::from(value))))
        },
        _ => Err(CollatorError::parse(format!(
            "value for '{}' must be a number or an object",
            name
        ))),
    }
}

/// Execute the collator.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Flush interval: {:?}", config.collation.flush_interval);
        println!("  Max batch size: {}", config.collation.max_batch_size);
        println!("  Source: {}", config.collation.source_label().unwrap_or("<none>"));
        println!("  Metrics URL: {}", config.endpoint.metrics_url);
        return Ok(());
    }

    cli.init_logging(&config)?;

    let transport = cli.transport(&config)?;
    let client = CollatedClient::new(config.collation.clone(), transport)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0u64;
    let mut rejected = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match parse_line(&line) {
                    Ok(Some((kind, name, measurement))) => {
                        client.get_source(kind, &name)?.push(measurement)?;
                        accepted += 1;
                    },
                    Ok(None) => {},
                    Err(e) => {
                        warn!(error = %e, "skipping line");
                        rejected += 1;
                    },
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, flushing pending measurements");
                break;
            }
        }
    }

    client.close().await;
    client.wait().await;

    let stats = client.stats();
    info!(
        accepted,
        rejected,
        sent = stats.observations_sent,
        dropped = stats.observations_dropped,
        flushes = stats.total_flushes(),
        failed = stats.failed_flushes,
        "Collator finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scalar_line() {
        let (kind, name, measurement) = parse_line("gauge queue.depth 17").unwrap().unwrap();
        assert_eq!(kind, MetricKind::Gauge);
        assert_eq!(name, "queue.depth");
        assert_eq!(measurement, Measurement::Value(json!(17)));
    }

    #[test]
    fn test_parse_record_line() {
        let (kind, name, measurement) =
            parse_line("c latency {\"count\": 4, \"sum\": 10.5}").unwrap().unwrap();
        assert_eq!(kind, MetricKind::Counter);
        assert_eq!(name, "latency");
        assert!(matches!(measurement, Measurement::Record(ref r) if r.len() == 2));
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# gauge x 1").unwrap().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("timer x 1").is_err());
        assert!(parse_line("gauge x").is_err());
        assert!(parse_line("gauge x abc").is_err());
        assert!(parse_line("gauge x \"text\"").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "collator",
            "--interval",
            "2s",
            "--max-batch",
            "10",
            "--source",
            "host-a",
            "--user",
            "u",
            "--token",
            "t",
        ]);

        let config = cli.apply_overrides(ConfigBuilder::new()).unwrap();
        assert_eq!(config.collation.flush_interval, Duration::from_secs(2));
        assert_eq!(config.collation.max_batch_size, 10);
        assert_eq!(config.collation.source_label(), Some("host-a"));
        assert!(config.has_credentials());
    }

    #[test]
    fn test_debug_flag_reaches_config() {
        let cli = Cli::parse_from(["collator", "--debug"]);
        let config = cli.apply_overrides(ConfigBuilder::new()).unwrap();
        assert!(config.debug);

        let cli = Cli::parse_from(["collator"]);
        let config = cli.apply_overrides(ConfigBuilder::new()).unwrap();
        assert!(!config.debug);
    }

    #[test]
    fn test_transport_requires_credentials() {
        let cli = Cli::parse_from(["collator"]);
        let config = Config::default();
        assert!(cli.transport(&config).is_err());

        let cli = Cli::parse_from(["collator", "--dry-run"]);
        assert_eq!(cli.transport(&config).unwrap().name(), "stdout");
    }
}
