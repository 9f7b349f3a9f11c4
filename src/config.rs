//! Runtime configuration (§0 ambient stack): loaded from environment
//! variables via `dotenvy::dotenv()` + `std::env::var`, mirroring the
//! `CG_PRO_API_KEY` fallback the original CSV exporter used before this
//! crate grew a dedicated config module.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::ingestion::{IngestionTuning, BATCH_SIZE, CHUNK_DAYS, CHUNK_DELAY_MS, INTERMEDIATE_SAVE};

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned by the model artifact store (C6) for
    /// `<code>_arima_model[_yyyymmdd].json` files.
    pub artifacts_dir: PathBuf,
    /// Directory used for optional CSV snapshot load/save.
    pub snapshot_dir: PathBuf,
    /// Default `ExternalDataSource` id, e.g. `"coingecko"`.
    pub data_source_id: String,
    pub coingecko_api_key: String,
    pub vs_currency: String,
    pub chunk_days: i64,
    pub batch_size: usize,
    pub intermediate_save: usize,
    pub chunk_delay_ms: u64,
    pub http_timeout: Duration,
    pub http_max_retries: usize,
    pub rate_limit_requests_per_sec: f64,
    pub rate_limit_burst: f64,
}

impl Config {
    /// Loads `.env` (if present) on top of the process environment. Numeric
    /// knobs fall back to the same defaults the ingestion pipeline itself
    /// uses when the matching variable is unset; `CG_PRO_API_KEY` is the
    /// only variable that is actually required.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            artifacts_dir: PathBuf::from(env_or("ARTIFACTS_DIR", "./artifacts")),
            snapshot_dir: PathBuf::from(env_or("SNAPSHOT_DIR", "./out")),
            data_source_id: env_or("DATA_SOURCE_ID", "coingecko"),
            coingecko_api_key: require_var("CG_PRO_API_KEY")?,
            vs_currency: env_or("VS_CURRENCY", "usd"),
            chunk_days: parse_or("CHUNK_DAYS", CHUNK_DAYS)?,
            batch_size: parse_or("BATCH_SIZE", BATCH_SIZE)?,
            intermediate_save: parse_or("INTERMEDIATE_SAVE", INTERMEDIATE_SAVE)?,
            chunk_delay_ms: parse_or("CHUNK_DELAY_MS", CHUNK_DELAY_MS)?,
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 30u64)?),
            http_max_retries: parse_or("HTTP_MAX_RETRIES", 6usize)?,
            rate_limit_requests_per_sec: parse_or("RATE_LIMIT_RPS", 8.0)?,
            rate_limit_burst: parse_or("RATE_LIMIT_BURST", 16.0)?,
        })
    }

    /// Projects the chunk/batch/save/pacing knobs into an
    /// [`IngestionTuning`] for [`crate::ingestion::ingest`].
    pub fn ingestion_tuning(&self) -> IngestionTuning {
        IngestionTuning {
            chunk_days: self.chunk_days,
            batch_size: self.batch_size,
            intermediate_save: self.intermediate_save,
            chunk_delay_ms: self.chunk_delay_ms,
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn require_var(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_reported_by_name() {
        // SAFETY: test runs single-threaded w.r.t. this var; no other test
        // in this crate reads or writes CG_PRO_API_KEY.
        unsafe {
            std::env::remove_var("CG_PRO_API_KEY");
        }
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("CG_PRO_API_KEY")));
    }

    #[test]
    fn invalid_numeric_override_is_reported_with_var_name() {
        // SAFETY: test runs single-threaded w.r.t. this var; no other test
        // in this crate reads or writes CHUNK_DELAY_MS_TEST_ONLY.
        unsafe {
            std::env::set_var("CHUNK_DELAY_MS_TEST_ONLY", "not-a-number");
        }
        let err = parse_or::<u64>("CHUNK_DELAY_MS_TEST_ONLY", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "CHUNK_DELAY_MS_TEST_ONLY", .. }));
        unsafe {
            std::env::remove_var("CHUNK_DELAY_MS_TEST_ONLY");
        }
    }
}
