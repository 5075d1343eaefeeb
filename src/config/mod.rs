use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub analysis: AnalysisConfig,
    pub documents: DocumentConfig,
    pub reasoning: ReasoningConfig,
    pub database: DatabaseConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Timeout and retry policy for external capability calls
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Remote analysis service
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Document index lookup
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub base_url: Option<String>,
    pub max_sources: usize,
}

/// Inference and answer assembly settings
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub max_hops: usize,
    pub calculator_confidence: f64,
}

/// Snapshot database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_or("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: parse_or("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parse_or("RETRY_DELAY_MS", defaults.retry_delay_ms),
        };
        if request.timeout_ms == 0 {
            return Err(AppError::Config {
                message: "REQUEST_TIMEOUT_MS must be greater than zero".to_string(),
            });
        }

        let analysis = AnalysisConfig {
            base_url: non_empty("ANALYSIS_BASE_URL"),
            api_key: non_empty("ANALYSIS_API_KEY"),
        };

        let documents = DocumentConfig {
            base_url: non_empty("DOCUMENT_INDEX_URL"),
            max_sources: parse_or("MAX_SOURCES", DocumentConfig::default().max_sources),
        };

        let reasoning_defaults = ReasoningConfig::default();
        let reasoning = ReasoningConfig {
            max_hops: parse_or("MAX_HOPS", reasoning_defaults.max_hops),
            calculator_confidence: parse_or(
                "CALCULATOR_CONFIDENCE",
                reasoning_defaults.calculator_confidence,
            ),
        };
        if !(0.0..=1.0).contains(&reasoning.calculator_confidence) {
            return Err(AppError::Config {
                message: format!(
                    "CALCULATOR_CONFIDENCE must be within [0, 1], got {}",
                    reasoning.calculator_confidence
                ),
            });
        }
        if reasoning.max_hops == 0 {
            return Err(AppError::Config {
                message: "MAX_HOPS must be at least 1".to_string(),
            });
        }

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/knowledge.db".to_string()),
            ),
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        Ok(Config {
            logging,
            request,
            analysis,
            documents,
            reasoning,
            database,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            analysis: AnalysisConfig::default(),
            documents: DocumentConfig::default(),
            reasoning: ReasoningConfig::default(),
            database: DatabaseConfig {
                path: PathBuf::from("./data/knowledge.db"),
                max_connections: 5,
            },
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_retries: 1,
            retry_delay_ms: 200,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_sources: 5,
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_hops: 3,
            calculator_confidence: 0.95,
        }
    }
}
