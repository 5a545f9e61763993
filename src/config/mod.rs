use std::env;
use std::fmt;
use std::str::FromStr;

use crate::workflows::promotion::PromotionConfig;
use crate::workflows::records::{GradebookConfig, PromotionWeighting};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
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
    pub telemetry: TelemetryConfig,
    pub promotion: PromotionConfig,
    pub gradebook: GradebookConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::parse(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidChoice {
                key: "APP_LOG_FORMAT",
                value: raw,
                expected: "compact or json",
            })?,
            Err(_) => LogFormat::Compact,
        };

        let defaults = PromotionConfig::default();
        let promotion = PromotionConfig {
            minimum_passing_average: number(
                "PROMOTION_MIN_AVERAGE",
                defaults.minimum_passing_average,
            )?,
            subject_average_precision: number(
                "PROMOTION_SUBJECT_PRECISION",
                defaults.subject_average_precision,
            )?,
            final_average_precision: number(
                "PROMOTION_FINAL_PRECISION",
                defaults.final_average_precision,
            )?,
            max_absence_percentage: number(
                "PROMOTION_MAX_ABSENCE_PCT",
                defaults.max_absence_percentage,
            )?,
            require_all_trimesters: flag(
                "PROMOTION_REQUIRE_ALL_TRIMESTERS",
                defaults.require_all_trimesters,
            )?,
            count_failed_subjects: flag(
                "PROMOTION_COUNT_FAILED_SUBJECTS",
                defaults.count_failed_subjects,
            )?,
            weighting: PromotionWeighting {
                annual: number("PROMOTION_ANNUAL_WEIGHT", defaults.weighting.annual)?,
                final_evaluation: number(
                    "PROMOTION_FINAL_EVALUATION_WEIGHT",
                    defaults.weighting.final_evaluation,
                )?,
            },
            max_parallelism: number("PROMOTION_MAX_PARALLELISM", defaults.max_parallelism)?,
        };
        promotion.validate()?;

        let gradebook = GradebookConfig {
            max_write_attempts: number(
                "GRADEBOOK_MAX_WRITE_ATTEMPTS",
                GradebookConfig::default().max_write_attempts,
            )?,
        };
        if gradebook.max_write_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "GRADEBOOK_MAX_WRITE_ATTEMPTS",
                detail: "must allow at least one attempt".to_string(),
            });
        }

        Ok(Self {
            environment,
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            promotion,
            gradebook,
        })
    }
}

fn number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

fn flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Output shape for log lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidFlag { key: &'static str, value: String },
    InvalidChoice {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    OutOfRange { field: &'static str, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be numeric (got '{value}')")
            }
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{key} must be true or false (got '{value}')")
            }
            ConfigError::InvalidChoice {
                key,
                value,
                expected,
            } => write!(f, "{key} must be {expected} (got '{value}')"),
            ConfigError::OutOfRange { field, detail } => write!(f, "{field} {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {}
