use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

const DEFAULT_QUERIES_CSV: &str =
    "data/text2cypher/datasets/synthetic_opus_demodbs/text2cypher_claudeopus.csv";
const DEFAULT_SCHEMAS_CSV: &str =
    "data/text2cypher/datasets/synthetic_opus_demodbs/text2cypher_schemas.csv";

/// Converter configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// TypeDB HTTP endpoint
    #[validate(length(min = 1, message = "TypeDB URL cannot be empty"))]
    pub typedb_url: String,

    pub typedb_username: String,

    pub typedb_password: String,

    /// TypeDB server binary; when unset the engine is never restarted
    pub typedb_binary: Option<PathBuf>,

    #[validate(range(
        min = 1,
        max = 120,
        message = "Engine startup wait must be between 1 and 120 seconds"
    ))]
    pub engine_startup_wait_secs: u64,

    /// Drafting attempts per query
    #[validate(range(min = 1, max = 20, message = "Max retries must be between 1 and 20"))]
    pub max_retries: usize,

    #[validate(range(min = 1, max = 200, message = "Batch size must be between 1 and 200"))]
    pub batch_size: usize,

    /// Rounds over the failure stream per `retry` invocation
    #[validate(range(
        min = 1,
        max = 20,
        message = "Max retry rounds must be between 1 and 20"
    ))]
    pub max_retry_rounds: usize,

    /// Engine error text kept per failed attempt
    #[validate(range(
        min = 50,
        max = 10000,
        message = "Error truncation must be between 50 and 10000 characters"
    ))]
    pub error_truncate_chars: usize,

    /// Root of the per-database output directories
    pub dataset_dir: PathBuf,

    pub queries_csv: PathBuf,

    pub schemas_csv: PathBuf,

    pub mappings_dir: PathBuf,

    #[validate(length(min = 1, message = "Validation database prefix cannot be empty"))]
    pub validation_db_prefix: String,

    #[validate(length(min = 1, message = "Scratch database name cannot be empty"))]
    pub scratch_db_name: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            typedb_url: "http://localhost:8000".to_string(),
            typedb_username: "admin".to_string(),
            typedb_password: "password".to_string(),
            typedb_binary: None,
            engine_startup_wait_secs: 8,
            max_retries: 3,
            batch_size: 10,
            max_retry_rounds: 3,
            error_truncate_chars: 500,
            dataset_dir: PathBuf::from("dataset"),
            queries_csv: PathBuf::from(DEFAULT_QUERIES_CSV),
            schemas_csv: PathBuf::from(DEFAULT_SCHEMAS_CSV),
            mappings_dir: PathBuf::from("mappings"),
            validation_db_prefix: "text2typeql_".to_string(),
            scratch_db_name: "text2typeql_validation".to_string(),
        }
    }
}

impl ConverterConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            typedb_url: env::var("TYPEDB_ADDRESS").unwrap_or(defaults.typedb_url),
            typedb_username: env::var("TYPEDB_USERNAME").unwrap_or(defaults.typedb_username),
            typedb_password: env::var("TYPEDB_PASSWORD").unwrap_or(defaults.typedb_password),
            typedb_binary: env::var("TYPEDB_BINARY").ok().map(PathBuf::from),
            engine_startup_wait_secs: parse_env_var("TYPEDB_STARTUP_WAIT", "8")?,
            max_retries: parse_env_var("TEXT2TYPEQL_MAX_RETRIES", "3")?,
            batch_size: parse_env_var("TEXT2TYPEQL_BATCH_SIZE", "10")?,
            max_retry_rounds: parse_env_var("TEXT2TYPEQL_MAX_ROUNDS", "3")?,
            dataset_dir: env_path("TEXT2TYPEQL_DATASET_DIR", defaults.dataset_dir),
            queries_csv: env_path("TEXT2TYPEQL_QUERIES_CSV", defaults.queries_csv),
            schemas_csv: env_path("TEXT2TYPEQL_SCHEMAS_CSV", defaults.schemas_csv),
            mappings_dir: env_path("TEXT2TYPEQL_MAPPINGS_DIR", defaults.mappings_dir),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of an environment configuration
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = match &cli.config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::from_env()?,
        };
        config.merge(cli);
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// CLI values override whatever was loaded before
    pub fn merge(&mut self, cli: CliConfig) {
        if let Some(url) = cli.typedb_url {
            self.typedb_url = url;
        }
        if let Some(binary) = cli.typedb_binary {
            self.typedb_binary = Some(binary);
        }
        if let Some(max_retries) = cli.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(batch_size) = cli.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(rounds) = cli.max_retry_rounds {
            self.max_retry_rounds = rounds;
        }
        if let Some(dir) = cli.dataset_dir {
            self.dataset_dir = dir;
        }
        if let Some(dir) = cli.mappings_dir {
            self.mappings_dir = dir;
        }
    }

    /// Name of the long-lived validation database for `database`
    pub fn validation_database(&self, database: &str) -> String {
        format!("{}{}", self.validation_db_prefix, database)
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub config_file: Option<PathBuf>,
    pub typedb_url: Option<String>,
    pub typedb_binary: Option<PathBuf>,
    pub max_retries: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_retry_rounds: Option<usize>,
    pub dataset_dir: Option<PathBuf>,
    pub mappings_dir: Option<PathBuf>,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}
