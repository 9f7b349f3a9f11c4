//! External invocation surfaces (§6): the two request/response shapes this
//! crate exposes to callers — ingestion and forecasting. Each wraps the
//! lower-level pipelines (C3, C5, C6, C7) behind a single async entry point.
//! The actual REST façade/orchestrator these would sit behind is out of
//! scope (spec.md §11); these functions are what it would call.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ForecastStatus, Instrument, TimeRange};
use crate::error::CoreError;
use crate::forecast_engine;
use crate::ingestion::{self, CancellationToken, IngestionRequest, IngestionTuning};
use crate::master_prep::{self, MasterPrepRequest};
use crate::model_store::ModelArtifactStore;
use crate::source::DataSourceFactory;
use crate::store::{ForecastStore, MarketDataStore, MasterDataStore};

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionInvocationRequest {
    pub instrument_codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub launch_new_instruments: bool,
    /// `ExternalDataSource` id override; `None` uses the factory default.
    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionInvocationResponse {
    pub execution_id: Uuid,
    pub task_completed: bool,
    pub completed_at: chrono::DateTime<Utc>,
    pub instruments_requested: Vec<String>,
    pub data_source: String,
    pub launch_new_instruments: bool,
}

fn resolve_instruments(codes: &[String]) -> Result<Vec<Instrument>, CoreError> {
    codes
        .iter()
        .map(|c| Instrument::parse(c).ok_or_else(|| CoreError::InvalidRequest(format!("unknown instrument code {c}"))))
        .collect()
}

/// Runs C3 end to end for the requested instruments and range, returning a
/// summary stable enough to hand back across a process boundary. `tuning`
/// carries the chunk/batch/save/pacing knobs (normally sourced from
/// [`Config`](crate::config::Config)); callers with no config to load from
/// can pass `IngestionTuning::default()`.
pub async fn run_ingestion_invocation(
    factory: Arc<DataSourceFactory>,
    market_store: Arc<dyn MarketDataStore>,
    request: IngestionInvocationRequest,
    tuning: IngestionTuning,
) -> Result<IngestionInvocationResponse, CoreError> {
    let instruments = resolve_instruments(&request.instrument_codes)?;
    let range = TimeRange::from_dates(request.start_date, request.end_date);
    let source_id = request.resource.clone();
    let data_source = factory.get(source_id.as_deref())?.data_source_id().to_string();

    let report = ingestion::ingest(
        factory,
        market_store,
        IngestionRequest {
            instruments,
            range,
            source_id,
            tuning,
        },
        CancellationToken::new(),
    )
    .await;

    Ok(IngestionInvocationResponse {
        execution_id: report.execution_id,
        task_completed: true,
        completed_at: Utc::now(),
        instruments_requested: request.instrument_codes,
        data_source,
        launch_new_instruments: request.launch_new_instruments,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastInvocationRequest {
    pub instrument_code: String,
    /// When set, `start_date` is ignored in favor of today (UTC).
    #[serde(default)]
    pub is_current_date: bool,
    pub start_date: NaiveDate,
    /// `None` runs single-date mode; `Some` runs range (backtest) mode over
    /// `[start_date, end_date]`.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub include_calculation_details: bool,
    /// `None` resolves to C6's active version for the instrument.
    #[serde(default)]
    pub arima_model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastInvocationResponse {
    pub execution_id: Uuid,
    pub task_completed: bool,
    pub successful_forecasts: usize,
    pub total_instruments: usize,
    pub arima_model_version: String,
    pub all_forecasts_successful: bool,
    pub has_partial_failures: bool,
    /// Single-instrument request, so this names failed forecast *dates*
    /// rather than instruments when a range request partially fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_instruments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Runs C5 (master-data prep, backfilling through C3 on a coverage miss)
/// then C7 (AR(p) forecasting) for one instrument, in either single-date or
/// range mode depending on whether `end_date` is set.
#[allow(clippy::too_many_arguments)]
pub async fn run_forecast_invocation(
    market_store: Arc<dyn MarketDataStore>,
    master_store: Arc<dyn MasterDataStore>,
    forecast_store: Arc<dyn ForecastStore>,
    factory: Arc<DataSourceFactory>,
    model_store: Arc<ModelArtifactStore>,
    request: ForecastInvocationRequest,
) -> Result<ForecastInvocationResponse, CoreError> {
    let instrument = Instrument::parse(&request.instrument_code)
        .ok_or_else(|| CoreError::InvalidRequest(format!("unknown instrument code {}", request.instrument_code)))?;

    let model_arc = match &request.arima_model_version {
        Some(v) => model_store.find_by_instrument_and_version(instrument, v).await?,
        None => model_store.find_active_by_instrument(instrument).await?,
    };
    let mut model = (*model_arc).clone();
    let model_version = model.model_version.clone();

    let target_start = if request.is_current_date {
        Utc::now().date_naive()
    } else {
        request.start_date
    };
    let target_end = request.end_date.unwrap_or(target_start);

    let lookback_days = model.p_order as u64 + 30;
    let lookback_start = target_start
        .checked_sub_days(Days::new(lookback_days))
        .ok_or_else(|| CoreError::InvalidRequest("start date too close to the epoch".into()))?;
    // `coverage_end` is the last day master data actually needs: the day
    // before `target_end`, since the target day itself is only ever a
    // forecast *output*, never a master-data input (master_prep::prepare
    // treats its `to_day` the same way).
    let coverage_end = target_end
        .pred_opt()
        .ok_or_else(|| CoreError::InvalidRequest("end date too close to the epoch".into()))?;
    let historical_data_range = TimeRange::from_dates(lookback_start, coverage_end);

    let master = master_prep::prepare(
        market_store.clone(),
        master_store.clone(),
        factory,
        &model,
        MasterPrepRequest {
            instrument,
            historical_data_range,
            required_points: lookback_days as usize,
            execution_id: Uuid::new_v4(),
        },
    )
    .await?;

    if request.include_calculation_details {
        tracing::debug!(instrument = %instrument, master_points = master.len(), "prepared master data for forecast");
    }

    if target_start == target_end {
        let result =
            forecast_engine::forecast_single_date(market_store, master_store, &master, &mut model, instrument, target_start)
                .await?;
        let success = matches!(result.status, ForecastStatus::Success);
        let error_message = result.error_message.clone();
        let execution_id = result.execution_id;
        forecast_store.upsert(result).await?;

        Ok(ForecastInvocationResponse {
            execution_id,
            task_completed: true,
            successful_forecasts: usize::from(success),
            total_instruments: 1,
            arima_model_version: model_version,
            all_forecasts_successful: success,
            has_partial_failures: false,
            failed_instruments: (!success).then(|| vec![target_start.to_string()]),
            error_message,
        })
    } else {
        let outcome = forecast_engine::forecast_range(&master, &mut model, instrument, target_start, target_end)?;
        let total = outcome.results.len();
        let successful = outcome
            .results
            .iter()
            .filter(|r| matches!(r.status, ForecastStatus::Success))
            .count();
        let failed_dates: Vec<String> = outcome
            .results
            .iter()
            .filter(|r| matches!(r.status, ForecastStatus::Failed))
            .map(|r| r.forecast_date.to_string())
            .collect();
        let execution_id = outcome.results.first().map(|r| r.execution_id).unwrap_or_else(Uuid::new_v4);

        for result in outcome.results {
            forecast_store.upsert(result).await?;
        }

        Ok(ForecastInvocationResponse {
            execution_id,
            task_completed: true,
            successful_forecasts: successful,
            total_instruments: 1,
            arima_model_version: model_version,
            all_forecasts_successful: successful == total,
            has_partial_failures: successful > 0 && successful < total,
            failed_instruments: (!failed_dates.is_empty()).then_some(failed_dates),
            error_message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Ohlcv, Price};
    use crate::error::ExternalFetchError;
    use crate::source::ExternalDataSource;
    use crate::store::forecast_store::InMemoryForecastStore;
    use crate::store::market_data::InMemoryMarketDataStore;
    use crate::store::master_data::InMemoryMasterDataStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn bar(offset: i64) -> Ohlcv {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset - 1);
        let timestamp = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
        Ohlcv {
            open: Price::new(dec!(100), "USD"),
            high: Price::new(dec!(115), "USD"),
            low: Price::new(dec!(85), "USD"),
            close: Price::new(Decimal::from(101 + offset % 5), "USD"),
            volume: dec!(10),
            timestamp,
        }
    }

    struct FixedSource {
        bars: Vec<Ohlcv>,
    }

    #[async_trait]
    impl ExternalDataSource for FixedSource {
        async fn fetch_historical_data(
            &self,
            _instrument: Instrument,
            range: TimeRange,
        ) -> Result<Vec<Ohlcv>, ExternalFetchError> {
            Ok(self
                .bars
                .iter()
                .filter(|b| b.timestamp >= range.from() && b.timestamp < range.to())
                .cloned()
                .collect())
        }

        async fn fetch_latest_data(&self, instrument: Instrument) -> Result<Ohlcv, ExternalFetchError> {
            self.bars.last().cloned().ok_or_else(|| ExternalFetchError::Failed {
                source_id: "fixed".into(),
                symbol: instrument.code().into(),
                message: "empty".into(),
            })
        }

        fn supports_symbol(&self, _instrument: Instrument) -> bool {
            true
        }

        fn data_source_id(&self) -> &str {
            "fixed"
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn ingestion_invocation_round_trips_through_the_pipeline() {
        let bars: Vec<Ohlcv> = (1..=5).map(bar).collect();
        let mut factory = DataSourceFactory::new();
        factory.register(Arc::new(FixedSource { bars }), true);
        let factory = Arc::new(factory);
        let market_store: Arc<dyn MarketDataStore> = Arc::new(InMemoryMarketDataStore::new());

        let response = run_ingestion_invocation(
            factory,
            market_store.clone(),
            IngestionInvocationRequest {
                instrument_codes: vec!["BTC".into()],
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                launch_new_instruments: false,
                resource: None,
            },
            IngestionTuning::default(),
        )
        .await
        .unwrap();

        assert!(response.task_completed);
        assert_eq!(response.instruments_requested, vec!["BTC".to_string()]);
        assert_eq!(response.data_source, "fixed");
        let found = market_store
            .count_by_range(
                Instrument::Btc,
                TimeRange::from_dates(
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                ),
            )
            .await
            .unwrap();
        assert!(found > 0);
    }

    #[tokio::test]
    async fn unknown_instrument_code_is_rejected_before_any_fetch() {
        let factory = Arc::new(DataSourceFactory::new());
        let market_store: Arc<dyn MarketDataStore> = Arc::new(InMemoryMarketDataStore::new());
        let err = run_ingestion_invocation(
            factory,
            market_store,
            IngestionInvocationRequest {
                instrument_codes: vec!["DOGE".into()],
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                launch_new_instruments: false,
                resource: None,
            },
            IngestionTuning::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn forecast_invocation_round_trips_through_the_pipeline() {
        let market_store: Arc<dyn MarketDataStore> = Arc::new(InMemoryMarketDataStore::new());
        let master_store: Arc<dyn MasterDataStore> = Arc::new(InMemoryMasterDataStore::new());
        let forecast_store: Arc<dyn ForecastStore> = Arc::new(InMemoryForecastStore::new());
        let factory = Arc::new(DataSourceFactory::new());

        let bars: Vec<Ohlcv> = (1..=60).map(bar).collect();
        market_store.upsert_all(Instrument::Btc, bars).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("btc_arima_model_20240101.json"),
            r#"{"mean_diff_oc":0.0,"sigma2":1.0,"p":1,"ar.L1":0.2}"#,
        )
        .unwrap();
        let model_store = Arc::new(ModelArtifactStore::new(dir.path().to_path_buf()));
        model_store.reload().await.unwrap();

        let target = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        let response = run_forecast_invocation(
            market_store,
            master_store,
            forecast_store,
            factory,
            model_store,
            ForecastInvocationRequest {
                instrument_code: "BTC".into(),
                is_current_date: false,
                start_date: target,
                end_date: None,
                include_calculation_details: false,
                arima_model_version: None,
            },
        )
        .await
        .unwrap();

        assert!(response.task_completed);
        assert_eq!(response.successful_forecasts, 1);
        assert_eq!(response.total_instruments, 1);
        assert!(response.all_forecasts_successful);
        assert_eq!(response.arima_model_version, "20240101");
    }
}
