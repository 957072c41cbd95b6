use serde::Deserialize;
use std::path::PathBuf;

use crate::services::collaborative::CfParams;
use crate::services::content::Aggregation;
use crate::services::engine::EngineConfig;

/// Which dataset store backs the engine
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatasetBackend {
    Csv,
    Postgres,
}

/// Where trained artifacts are persisted
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackend {
    File,
    Redis,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_dataset_backend")]
    pub dataset_backend: DatasetBackend,

    /// Directory holding students.csv, courses.csv and engagement.csv
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// PostgreSQL connection URL, required for the postgres backend
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_artifact_backend")]
    pub artifact_backend: ArtifactBackend,

    /// Directory for file-backed model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_cf_factors")]
    pub cf_factors: usize,

    #[serde(default = "default_cf_epochs")]
    pub cf_epochs: usize,

    #[serde(default = "default_cf_learning_rate")]
    pub cf_learning_rate: f64,

    #[serde(default = "default_cf_regularization")]
    pub cf_regularization: f64,

    #[serde(default = "default_cf_init_std")]
    pub cf_init_std: f64,

    #[serde(default = "default_cf_seed")]
    pub cf_seed: u64,

    /// Fraction of observed ratings held out for offline validation
    #[serde(default = "default_cf_holdout_fraction")]
    pub cf_holdout_fraction: f64,

    /// Courses the student already rated at or above this value are not re-recommended
    #[serde(default = "default_cf_exclude_rated_at_least")]
    pub cf_exclude_rated_at_least: f64,

    #[serde(default = "default_cbf_aggregation")]
    pub cbf_aggregation: Aggregation,

    #[serde(default = "default_recommendations")]
    pub default_recommendations: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_dataset_backend() -> DatasetBackend {
    DatasetBackend::Csv
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_artifact_backend() -> ArtifactBackend {
    ArtifactBackend::File
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cf_factors() -> usize {
    100
}

fn default_cf_epochs() -> usize {
    20
}

fn default_cf_learning_rate() -> f64 {
    0.005
}

fn default_cf_regularization() -> f64 {
    0.02
}

fn default_cf_init_std() -> f64 {
    0.1
}

fn default_cf_seed() -> u64 {
    42
}

fn default_cf_holdout_fraction() -> f64 {
    0.2
}

fn default_cf_exclude_rated_at_least() -> f64 {
    5.0
}

fn default_cbf_aggregation() -> Aggregation {
    Aggregation::Mean
}

fn default_recommendations() -> usize {
    5
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Engine tuning derived from the environment
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cf: CfParams {
                factors: self.cf_factors,
                epochs: self.cf_epochs,
                learning_rate: self.cf_learning_rate,
                regularization: self.cf_regularization,
                init_std: self.cf_init_std,
                seed: self.cf_seed,
                holdout_fraction: self.cf_holdout_fraction,
            },
            exclude_rated_at_least: self.cf_exclude_rated_at_least,
            cbf_aggregation: self.cbf_aggregation,
            default_recommendations: self.default_recommendations,
        }
    }
}
