use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::instrument::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastStatus {
    Success,
    Failed,
}

/// Non-fatal diagnostics attached to a forecast, per the Open Questions in
/// spec.md §9: neither is an error, both are facts the caller should see.
#[derive(Debug, Clone, Default)]
pub struct ForecastDiagnostics {
    /// Set when the reconstruction fell back to the most recent available
    /// master record instead of the literal previous calendar day.
    pub stale_basis: bool,
    /// Set (range mode) when one or more lags were substituted with 0.0
    /// because no master record existed for that day.
    pub missing_lag_substituted: bool,
}

/// Result of a single forecast invocation. Uniqueness on
/// `(instrument, forecastDate, modelVersion)`.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub execution_id: Uuid,
    pub instrument: Instrument,
    pub forecast_date: NaiveDate,
    pub expected_return: f64,
    pub confidence: f64,
    pub status: ForecastStatus,
    pub predicted_diff_oc: f64,
    pub predicted_oc: f64,
    pub ar_order: usize,
    pub data_points_used: usize,
    pub model_version: String,
    pub data_range_start: NaiveDate,
    pub data_range_end: NaiveDate,
    pub mse: f64,
    pub std_err: f64,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub diagnostics: ForecastDiagnostics,
}

impl ForecastResult {
    pub fn key(&self) -> (Instrument, NaiveDate, String) {
        (self.instrument, self.forecast_date, self.model_version.clone())
    }
}
