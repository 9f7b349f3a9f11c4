//! Error kinds for the ingestion and forecasting core, per the error-handling
//! design: business errors are reported, technical/infra errors propagate.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::Instrument;

/// Errors raised while fetching bars from an external data source (C2).
#[derive(Error, Debug)]
pub enum ExternalFetchError {
    #[error("{source_id} fetch for {symbol} failed: {message}")]
    Failed {
        source_id: String,
        symbol: String,
        message: String,
    },

    #[error("{source_id} does not support symbol {symbol}")]
    UnsupportedSymbol { source_id: String, symbol: String },

    #[error("no data source registered for id {0:?}")]
    UnknownSource(String),
}

/// Errors raised by the market-data / master-data / forecast stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("persistence failure for {instrument}: {message}")]
    PersistenceFailure {
        instrument: Instrument,
        message: String,
    },
}

/// Errors raised while validating an incoming batch of bars (C3.1).
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("bar timestamps unordered or duplicated within batch")]
    UnorderedOrDuplicate,

    #[error("bar at {timestamp} violates OHLC invariant (open={open}, high={high}, low={low}, close={close})")]
    OhlcInvariant {
        timestamp: chrono::DateTime<chrono::Utc>,
        open: String,
        high: String,
        low: String,
        close: String,
    },

    #[error("bar at {0} has non-positive price")]
    NonPositivePrice(chrono::DateTime<chrono::Utc>),

    #[error("currency mismatch: instrument expects {expected}, bar carries {actual}")]
    CurrencyMismatch { expected: String, actual: String },
}

/// Non-fatal warnings attached to a validated batch; callers may inspect but
/// must not treat them as failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    GapDetected {
        after: chrono::DateTime<chrono::Utc>,
        before: chrono::DateTime<chrono::Utc>,
        missing_days: i64,
    },
    SanityJump {
        timestamp: chrono::DateTime<chrono::Utc>,
        pct_change: f64,
    },
}

/// Errors surfaced by the master-data preparation pipeline (C5).
#[derive(Error, Debug)]
pub enum MasterPrepError {
    #[error("required master data points not reached: have {have}, need {need}, range {range_start}..{range_end}")]
    InsufficientMasterData {
        have: usize,
        need: usize,
        range_start: NaiveDate,
        range_end: NaiveDate,
    },

    #[error("price data unavailable for {0}")]
    PriceDataUnavailable(String),

    #[error(transparent)]
    ExternalFetch(#[from] ExternalFetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the model artifact store (C6).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no AR(p) artifact found for {instrument} version {version:?}")]
    NotFound {
        instrument: Instrument,
        version: Option<String>,
    },

    #[error("artifact {path} invalid: {message}")]
    InvalidArtifact { path: String, message: String },

    #[error("io error reading artifacts directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the forecast engine (C7).
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("failed to extract lag {lag_index} for day {day}")]
    LagExtractionFailed { day: NaiveDate, lag_index: usize },

    #[error("model instrument {model} does not match requested instrument {requested}")]
    InstrumentMismatch {
        model: Instrument,
        requested: Instrument,
    },

    #[error("master data series too short: have {have}, need at least {need}")]
    InsufficientSeries { have: usize, need: usize },

    #[error(transparent)]
    MasterPrep(#[from] MasterPrepError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised while loading [`crate::config::Config`] from the process
/// environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: &'static str, message: String },
}

/// Top-level errors surfaced on the external invocation surfaces (§6).
/// `InvalidRequest` is the only business error reported without a retry
/// hint; everything else nests the originating component's error.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    ExternalFetch(#[from] ExternalFetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    MasterPrep(#[from] MasterPrepError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),
}
