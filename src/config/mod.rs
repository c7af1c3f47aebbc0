//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ricordo";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_ITEM_DELAY_MS: u64 = 1500;
const DEFAULT_SCREENING_DELAY_MS: u64 = 1000;
const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;
const DEFAULT_MIN_POLL_INTERVAL_MS: u64 = 50;
const DEFAULT_DEMO_ITEM_DELAY_MS: u64 = 300;
const DEFAULT_DEMO_SCREENING_DELAY_MS: u64 = 150;
const DEFAULT_DEMO_GRACE_PERIOD_SECS: u64 = 3;

/// Command-line arguments for the Ricordo binary.
#[derive(Debug, Parser)]
#[command(name = "ricordo", version, about = "Ricordo query cache demo")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RICORDO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the demo REST server.
    Serve(Box<ServeArgs>),
    /// Walk a query-cache scenario and print the view timeline.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the simulated latency of the items endpoint in milliseconds.
    #[arg(long = "server-item-delay-ms", value_name = "MILLIS")]
    pub item_delay_ms: Option<u64>,

    /// Override the simulated latency of the screenings endpoints in milliseconds.
    #[arg(long = "server-screening-delay-ms", value_name = "MILLIS")]
    pub screening_delay_ms: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Which walkthrough to run.
    #[arg(value_enum, default_value_t = DemoScenario::Items)]
    pub scenario: DemoScenario,

    #[command(flatten)]
    pub overrides: DemoOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoScenario {
    /// Mock item source: deduplication, sticky data, errors, expiry, polling.
    Items,
    /// In-process screenings server: optimistic updates and tag invalidation.
    Screenings,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DemoOverrides {
    /// Override the simulated item latency in milliseconds.
    #[arg(long = "demo-item-delay-ms", value_name = "MILLIS")]
    pub item_delay_ms: Option<u64>,

    /// Override the screenings server latency in milliseconds.
    #[arg(long = "demo-screening-delay-ms", value_name = "MILLIS")]
    pub screening_delay_ms: Option<u64>,

    /// Override how long unwatched cache entries are retained, in seconds.
    #[arg(long = "demo-grace-seconds", value_name = "SECONDS")]
    pub grace_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub item_delay: Duration,
    pub screening_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub unused_entry_grace_period: Duration,
    pub min_poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub item_delay: Duration,
    pub screening_delay: Duration,
    pub grace_period: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("RICORDO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Demo(args)) => raw.apply_demo_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    demo: RawDemoSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(delay) = overrides.item_delay_ms {
            self.server.item_delay_ms = Some(delay);
        }
        if let Some(delay) = overrides.screening_delay_ms {
            self.server.screening_delay_ms = Some(delay);
        }
        self.apply_logging_overrides(overrides.log_level.as_ref(), overrides.log_json);
    }

    fn apply_demo_overrides(&mut self, overrides: &DemoOverrides) {
        if let Some(delay) = overrides.item_delay_ms {
            self.demo.item_delay_ms = Some(delay);
        }
        if let Some(delay) = overrides.screening_delay_ms {
            self.demo.screening_delay_ms = Some(delay);
        }
        if let Some(grace) = overrides.grace_seconds {
            self.demo.grace_period_seconds = Some(grace);
        }
        self.apply_logging_overrides(overrides.log_level.as_ref(), overrides.log_json);
    }

    fn apply_logging_overrides(&mut self, level: Option<&String>, json: Option<bool>) {
        if let Some(level) = level {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            demo,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let demo = build_demo_settings(demo);

        Ok(Self {
            server,
            logging,
            cache,
            demo,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let item_delay =
        Duration::from_millis(server.item_delay_ms.unwrap_or(DEFAULT_ITEM_DELAY_MS));
    let screening_delay = Duration::from_millis(
        server
            .screening_delay_ms
            .unwrap_or(DEFAULT_SCREENING_DELAY_MS),
    );

    Ok(ServerSettings {
        addr,
        item_delay,
        screening_delay,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    // Zero is a valid grace period: entries vanish as soon as their last
    // subscriber leaves.
    let grace_seconds = cache
        .unused_entry_grace_period_seconds
        .unwrap_or(DEFAULT_GRACE_PERIOD_SECS);

    let min_poll_ms = cache
        .min_poll_interval_ms
        .unwrap_or(DEFAULT_MIN_POLL_INTERVAL_MS);
    if min_poll_ms == 0 {
        return Err(LoadError::invalid(
            "cache.min_poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        unused_entry_grace_period: Duration::from_secs(grace_seconds),
        min_poll_interval: Duration::from_millis(min_poll_ms),
    })
}

fn build_demo_settings(demo: RawDemoSettings) -> DemoSettings {
    DemoSettings {
        item_delay: Duration::from_millis(demo.item_delay_ms.unwrap_or(DEFAULT_DEMO_ITEM_DELAY_MS)),
        screening_delay: Duration::from_millis(
            demo.screening_delay_ms
                .unwrap_or(DEFAULT_DEMO_SCREENING_DELAY_MS),
        ),
        grace_period: Duration::from_secs(
            demo.grace_period_seconds
                .unwrap_or(DEFAULT_DEMO_GRACE_PERIOD_SECS),
        ),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    item_delay_ms: Option<u64>,
    screening_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    unused_entry_grace_period_seconds: Option<u64>,
    min_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDemoSettings {
    item_delay_ms: Option<u64>,
    screening_delay_ms: Option<u64>,
    grace_period_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn defaults_mirror_the_reference_timings() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 3001);
        assert_eq!(settings.server.item_delay, Duration::from_millis(1500));
        assert_eq!(settings.server.screening_delay, Duration::from_millis(1000));
        assert_eq!(
            settings.cache.unused_entry_grace_period,
            Duration::from_secs(10)
        );
        assert_eq!(settings.cache.min_poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["ricordo"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(0);

        let error = Settings::from_raw(raw).expect_err("zero port must fail");
        assert!(matches!(
            error,
            LoadError::Invalid {
                key: "server.port",
                ..
            }
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.min_poll_interval_ms = Some(0);

        let error = Settings::from_raw(raw).expect_err("zero poll floor must fail");
        assert!(matches!(
            error,
            LoadError::Invalid {
                key: "cache.min_poll_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn zero_grace_period_is_valid() {
        let mut raw = RawSettings::default();
        raw.cache.unused_entry_grace_period_seconds = Some(0);

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.unused_entry_grace_period, Duration::ZERO);
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "ricordo",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--server-item-delay-ms",
            "250",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(serve.overrides.item_delay_ms, Some(250));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_demo_arguments() {
        let args = CliArgs::parse_from([
            "ricordo",
            "demo",
            "screenings",
            "--demo-grace-seconds",
            "5",
            "--log-level",
            "debug",
        ]);

        match args.command.expect("demo command") {
            Command::Demo(demo) => {
                assert_eq!(demo.scenario, DemoScenario::Screenings);
                assert_eq!(demo.overrides.grace_seconds, Some(5));
                assert_eq!(demo.overrides.log_level.as_deref(), Some("debug"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn demo_scenario_defaults_to_items() {
        let args = CliArgs::parse_from(["ricordo", "demo"]);

        match args.command.expect("demo command") {
            Command::Demo(demo) => assert_eq!(demo.scenario, DemoScenario::Items),
            _ => panic!("wrong command parsed"),
        }
    }
}
