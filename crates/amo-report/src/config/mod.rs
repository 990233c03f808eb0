use crate::report::StageGroupConfig;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the report service and CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub report: ReportConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let ansi = env::var("APP_LOG_ANSI")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let stage_config_path = env::var("REPORT_STAGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yaml"));
        let csv_delimiter = match env::var("REPORT_CSV_DELIMITER") {
            Ok(raw) => parse_delimiter(&raw)?,
            Err(_) => b',',
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, ansi },
            report: ReportConfig {
                stage_config_path,
                csv_delimiter,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Where stage groups come from and how deal exports are read.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub stage_config_path: PathBuf,
    pub csv_delimiter: u8,
}

impl ReportConfig {
    pub fn load_stage_config(&self) -> Result<StageGroupConfig, ConfigError> {
        load_stage_config(&self.stage_config_path)
    }
}

pub fn load_stage_config(path: &Path) -> Result<StageGroupConfig, ConfigError> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::StageConfigIo {
        path: path.to_path_buf(),
        source,
    })?;

    StageGroupConfig::from_yaml_reader(file).map_err(|source| ConfigError::StageConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts a single ASCII character, or `tab`/`\t`.
pub fn parse_delimiter(raw: &str) -> Result<u8, ConfigError> {
    match raw {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        value if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        value => Err(ConfigError::InvalidDelimiter(value.to_string())),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidDelimiter(String),
    StageConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    StageConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDelimiter(value) => write!(
                f,
                "REPORT_CSV_DELIMITER must be a single ASCII character, got '{value}'"
            ),
            ConfigError::StageConfigIo { path, source } => {
                write!(f, "cannot read stage config {}: {source}", path.display())
            }
            ConfigError::StageConfigParse { path, source } => {
                write!(f, "invalid stage config {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDelimiter(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::StageConfigIo { source, .. } => Some(source),
            ConfigError::StageConfigParse { source, .. } => Some(source),
        }
    }
}
