use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::kpi::scheduler::{JobName, MonthlySchedule};

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub kpi: KpiConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            kpi: KpiConfig::from_env()?,
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
}

/// Rules and limits for KPI provisioning, scoring and ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiConfig {
    pub admin_department: String,
    /// `(supervising role, supervised role)` pairs.
    pub supervisors: Vec<(String, String)>,
    pub min_year: i32,
    pub batch_concurrency: usize,
    pub insert_batch_size: usize,
    pub external_timeout_ms: u64,
    pub directory_page_size: usize,
    pub utc_offset_minutes: i32,
    pub scheduler_enabled: bool,
    /// Replaces the built-in fire time of the `default-entries` job.
    pub default_entries_schedule: Option<MonthlySchedule>,
    /// Replaces the built-in fire time of the `final-reports` job.
    pub final_reports_schedule: Option<MonthlySchedule>,
    pub seed_path: Option<PathBuf>,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            admin_department: "admin".to_string(),
            supervisors: Vec::new(),
            min_year: 2020,
            batch_concurrency: 8,
            insert_batch_size: 500,
            external_timeout_ms: 5_000,
            directory_page_size: 200,
            utc_offset_minutes: 0,
            scheduler_enabled: true,
            default_entries_schedule: None,
            final_reports_schedule: None,
            seed_path: None,
        }
    }
}

impl KpiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let supervisors = match env::var("KPI_SUPERVISORS") {
            Ok(raw) => parse_supervisors(&raw)?,
            Err(_) => defaults.supervisors,
        };

        let config = Self {
            admin_department: env::var("KPI_ADMIN_DEPARTMENT")
                .unwrap_or(defaults.admin_department),
            supervisors,
            min_year: env_parse("KPI_MIN_YEAR", defaults.min_year)?,
            batch_concurrency: env_parse("KPI_BATCH_CONCURRENCY", defaults.batch_concurrency)?
                .max(1),
            insert_batch_size: env_parse("KPI_INSERT_BATCH_SIZE", defaults.insert_batch_size)?
                .max(1),
            external_timeout_ms: env_parse(
                "KPI_EXTERNAL_TIMEOUT_MS",
                defaults.external_timeout_ms,
            )?,
            directory_page_size: env_parse(
                "KPI_DIRECTORY_PAGE_SIZE",
                defaults.directory_page_size,
            )?
            .max(1),
            utc_offset_minutes: env_parse("KPI_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?,
            scheduler_enabled: env_parse("KPI_SCHEDULER_ENABLED", defaults.scheduler_enabled)?,
            default_entries_schedule: env_schedule("KPI_DEFAULT_ENTRIES_SCHEDULE")?,
            final_reports_schedule: env_schedule("KPI_FINAL_REPORTS_SCHEDULE")?,
            seed_path: env::var("KPI_SEED_PATH").ok().map(PathBuf::from),
        };

        config.utc_offset()?;
        Ok(config)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidUtcOffset(self.utc_offset_minutes))
    }

    pub fn schedule_override(&self, job: JobName) -> Option<MonthlySchedule> {
        match job {
            JobName::DefaultEntries => self.default_entries_schedule,
            JobName::FinalReports => self.final_reports_schedule,
        }
    }
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::InvalidValue { key, value })
        }
        Err(_) => Ok(default),
    }
}

/// Reads `DAY HH:MM`, e.g. `1 00:30`. Days past a month's end fire on its last day.
fn env_schedule(key: &'static str) -> Result<Option<MonthlySchedule>, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_schedule(&raw)
            .map(Some)
            .ok_or(ConfigError::InvalidSchedule { key, value: raw }),
        Err(_) => Ok(None),
    }
}

fn parse_schedule(raw: &str) -> Option<MonthlySchedule> {
    let (day, time) = raw.trim().split_once(char::is_whitespace)?;
    let (hour, minute) = time.trim().split_once(':')?;
    let day: u32 = day.parse().ok()?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if !(1..=31).contains(&day) || hour > 23 || minute > 59 {
        return None;
    }
    Some(MonthlySchedule::new(day, hour, minute))
}

/// Parses `sdm>tehsildar,dc>sdm` into role pairs.
fn parse_supervisors(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('>') {
            Some((supervisor, target))
                if !supervisor.trim().is_empty() && !target.trim().is_empty() =>
            {
                Ok((supervisor.trim().to_string(), target.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidSupervisor(pair.to_string())),
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    InvalidSupervisor(String),
    InvalidUtcOffset(i32),
    InvalidSchedule { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::InvalidSupervisor(pair) => write!(
                f,
                "KPI_SUPERVISORS entry '{pair}' must look like supervisor>target"
            ),
            ConfigError::InvalidUtcOffset(minutes) => {
                write!(f, "KPI_UTC_OFFSET_MINUTES {minutes} is outside +/-24h")
            }
            ConfigError::InvalidSchedule { key, value } => {
                write!(f, "{key} '{value}' must look like 'DAY HH:MM'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::InvalidSupervisor(_)
            | ConfigError::InvalidUtcOffset(_)
            | ConfigError::InvalidSchedule { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "KPI_ADMIN_DEPARTMENT",
            "KPI_SUPERVISORS",
            "KPI_MIN_YEAR",
            "KPI_BATCH_CONCURRENCY",
            "KPI_INSERT_BATCH_SIZE",
            "KPI_EXTERNAL_TIMEOUT_MS",
            "KPI_DIRECTORY_PAGE_SIZE",
            "KPI_UTC_OFFSET_MINUTES",
            "KPI_SCHEDULER_ENABLED",
            "KPI_DEFAULT_ENTRIES_SCHEDULE",
            "KPI_FINAL_REPORTS_SCHEDULE",
            "KPI_SEED_PATH",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.kpi, KpiConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn parses_supervisor_pairs_and_limits() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KPI_SUPERVISORS", "sdm>tehsildar, dc>sdm");
        env::set_var("KPI_BATCH_CONCURRENCY", "0");
        env::set_var("KPI_UTC_OFFSET_MINUTES", "330");
        let config = KpiConfig::from_env().expect("kpi config loads");
        assert_eq!(
            config.supervisors,
            vec![
                ("sdm".to_string(), "tehsildar".to_string()),
                ("dc".to_string(), "sdm".to_string()),
            ]
        );
        assert_eq!(config.batch_concurrency, 1);
        assert_eq!(
            config.utc_offset().expect("offset valid").local_minus_utc(),
            330 * 60
        );
        reset_env();
    }

    #[test]
    fn rejects_malformed_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KPI_SUPERVISORS", "sdm");
        assert!(matches!(
            KpiConfig::from_env(),
            Err(ConfigError::InvalidSupervisor(_))
        ));
        reset_env();
        env::set_var("KPI_MIN_YEAR", "soon");
        assert!(matches!(
            KpiConfig::from_env(),
            Err(ConfigError::InvalidValue {
                key: "KPI_MIN_YEAR",
                ..
            })
        ));
        reset_env();
        env::set_var("KPI_UTC_OFFSET_MINUTES", "2000");
        assert!(matches!(
            KpiConfig::from_env(),
            Err(ConfigError::InvalidUtcOffset(2000))
        ));
        reset_env();
    }

    #[test]
    fn reads_job_schedule_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KPI_FINAL_REPORTS_SCHEDULE", "2 06:15");
        let config = KpiConfig::from_env().expect("kpi config loads");
        assert_eq!(
            config.final_reports_schedule,
            Some(MonthlySchedule::new(2, 6, 15))
        );
        assert_eq!(config.default_entries_schedule, None);

        for bad in ["2", "0 06:15", "2 24:00", "2 06:75", "x 06:15"] {
            env::set_var("KPI_DEFAULT_ENTRIES_SCHEDULE", bad);
            assert!(
                matches!(
                    KpiConfig::from_env(),
                    Err(ConfigError::InvalidSchedule {
                        key: "KPI_DEFAULT_ENTRIES_SCHEDULE",
                        ..
                    })
                ),
                "{bad} must be rejected"
            );
        }
        reset_env();
    }
}
