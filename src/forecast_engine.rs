//! Forecast engine (C7): applies an AR(p) model to a prepared master-data
//! series to predict next-day expected return, for a single target date or
//! a backtest range. Expressed as a sequence of pure transformations over an
//! immutable calculation context rather than mutable stateful classes
//! (spec.md §9).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    ArModel, ForecastDiagnostics, ForecastResult, ForecastStatus, Instrument, MasterDataRecord, Price, SignedAmount,
};
use crate::error::ForecastError;
use crate::master_prep::oc;
use crate::store::{MarketDataStore, MasterDataStore};

/// Immutable snapshot the pipeline stages read from; built once per
/// invocation and never mutated in place.
struct CalculationContext<'a> {
    instrument: Instrument,
    model: &'a ArModel,
    by_day: BTreeMap<NaiveDate, &'a MasterDataRecord>,
    execution_id: Uuid,
}

fn lag_for(ctx: &CalculationContext, day: NaiveDate, lag: usize) -> Option<f64> {
    let target = day.checked_sub_days(Days::new(lag as u64))?;
    ctx.by_day.get(&target).and_then(|r| r.demean_diff_oc).map(|d| d.to_f64())
}

fn predict_demean_diff(ctx: &CalculationContext, lags: &[f64]) -> f64 {
    ctx.model.mean_diff_oc
        + ctx.model
            .coefficients
            .iter()
            .zip(lags.iter())
            .map(|(phi, l)| phi * l)
            .sum::<f64>()
}

fn confidence_for(master_count: usize, predicted_is_finite: bool) -> f64 {
    let mut confidence = 0.8;
    if master_count < 50 {
        confidence -= 0.1;
    }
    if master_count < 30 {
        confidence -= 0.2;
    }
    if !predicted_is_finite {
        confidence -= 0.3;
    }
    confidence.clamp(0.0, 1.0)
}

/// Reconstructs predicted OC/close/return against `prev_bar`'s open and the
/// stored `oc = open - close` convention (spec.md §9 Open Question 1).
fn reconstruct(pred_demean_diff: f64, prev_record: &MasterDataRecord) -> (f64, f64) {
    let prev_oc = prev_record.oc.to_f64();
    let pred_oc = pred_demean_diff + prev_oc;
    let prev_open = prev_record.open_price.amount().to_f64().unwrap_or(0.0);
    let expected_return = if prev_open != 0.0 { pred_oc / prev_open } else { f64::NAN };
    (pred_oc, expected_return)
}

/// Attempts to recompute a single day's `(oc, diffOC, demeanDiffOC)` from
/// raw bars and upsert it into C4, substituting for a missing/zero lag.
/// Per spec.md §4.7: self-heal here never reaches the external API — only
/// the already-fetched C1 bars.
async fn self_heal_lag(
    market_store: &dyn MarketDataStore,
    master_store: &dyn MasterDataStore,
    instrument: Instrument,
    day: NaiveDate,
    model: &ArModel,
) -> Option<MasterDataRecord> {
    let range = crate::domain::TimeRange::from_dates(day.pred_opt()?, day);
    let bars = market_store.find_by_range(instrument, range).await.ok()?;
    let by_day: BTreeMap<_, _> = bars.iter().map(|b| (b.timestamp.date_naive(), b)).collect();
    let today = *by_day.get(&day)?;
    let prev = *by_day.get(&day.pred_opt()?)?;

    let today_oc = oc(today);
    let prev_oc = oc(prev);
    let diff_oc = today_oc.sub(&prev_oc);
    let demean = SignedAmount::new(diff_oc.value() - rust_decimal::Decimal::try_from(model.mean_diff_oc).unwrap_or_default());

    let record = MasterDataRecord {
        instrument,
        timestamp: today.timestamp,
        open_price: today.open,
        close_price: today.close,
        oc: today_oc,
        diff_oc: Some(diff_oc),
        demean_diff_oc: Some(demean),
        mean_diff_oc: model.mean_diff_oc,
        calculation_version: 1,
        calculated_at: Utc::now(),
    };
    if let Err(e) = master_store.upsert(record.clone()).await {
        warn!(error = %e, %day, "self-heal upsert failed; proceeding with recomputed value only");
    }
    Some(record)
}

/// Single-date mode: predicts expected return for exactly `target_date`.
pub async fn forecast_single_date(
    market_store: Arc<dyn MarketDataStore>,
    master_store: Arc<dyn MasterDataStore>,
    master: &[MasterDataRecord],
    model: &mut ArModel,
    instrument: Instrument,
    target_date: NaiveDate,
) -> Result<ForecastResult, ForecastError> {
    let start = Instant::now();
    if model.instrument != instrument {
        return Err(ForecastError::InstrumentMismatch {
            model: model.instrument,
            requested: instrument,
        });
    }
    if master.len() < model.p_order {
        return Err(ForecastError::InsufficientSeries {
            have: master.len(),
            need: model.p_order,
        });
    }

    let mut by_day: BTreeMap<NaiveDate, MasterDataRecord> =
        master.iter().map(|r| (r.timestamp.date_naive(), r.clone())).collect();

    let mut lags = Vec::with_capacity(model.p_order);
    for i in 1..=model.p_order {
        let day = target_date.checked_sub_days(Days::new(i as u64)).ok_or(ForecastError::LagExtractionFailed {
            day: target_date,
            lag_index: i,
        })?;
        let lag_value = by_day.get(&day).and_then(|r| r.demean_diff_oc).map(|d| d.to_f64());
        let resolved = match lag_value {
            Some(v) if v != 0.0 => v,
            _ => {
                match self_heal_lag(market_store.as_ref(), master_store.as_ref(), instrument, day, model).await {
                    Some(healed) => {
                        let v = healed.demean_diff_oc.map(|d| d.to_f64()).unwrap_or(0.0);
                        by_day.insert(day, healed);
                        v
                    }
                    None => {
                        return Err(ForecastError::LagExtractionFailed {
                            day: target_date,
                            lag_index: i,
                        });
                    }
                }
            }
        };
        lags.push(resolved);
    }

    let ctx = CalculationContext {
        instrument,
        model,
        by_day: by_day.iter().map(|(d, r)| (*d, r)).collect(),
        execution_id: Uuid::new_v4(),
    };
    let pred_demean_diff = predict_demean_diff(&ctx, &lags);

    let prev_day_literal = target_date.pred_opt().ok_or(ForecastError::LagExtractionFailed {
        day: target_date,
        lag_index: 1,
    })?;
    let (prev_record, stale_basis) = match ctx.by_day.get(&prev_day_literal) {
        Some(r) => ((*r).clone(), false),
        None => {
            let fallback = master
                .iter()
                .max_by_key(|r| r.timestamp)
                .cloned()
                .ok_or(ForecastError::LagExtractionFailed {
                    day: target_date,
                    lag_index: 1,
                })?;
            (fallback, true)
        }
    };

    let (pred_oc, expected_return) = reconstruct(pred_demean_diff, &prev_record);
    let confidence = confidence_for(master.len(), expected_return.is_finite());

    model.mark_used(Utc::now());

    Ok(ForecastResult {
        execution_id: ctx.execution_id,
        instrument,
        forecast_date: target_date,
        expected_return,
        confidence,
        status: ForecastStatus::Success,
        predicted_diff_oc: pred_demean_diff,
        predicted_oc: pred_oc,
        ar_order: model.p_order,
        data_points_used: master.len(),
        model_version: model.model_version.clone(),
        data_range_start: master.iter().map(|r| r.timestamp.date_naive()).min().unwrap_or(target_date),
        data_range_end: master.iter().map(|r| r.timestamp.date_naive()).max().unwrap_or(target_date),
        mse: model.sigma2,
        std_err: model.std_err(),
        execution_time_ms: start.elapsed().as_millis() as u64,
        error_message: None,
        created_at: Utc::now(),
        diagnostics: ForecastDiagnostics {
            stale_basis,
            missing_lag_substituted: false,
        },
    })
}

pub struct RangeForecastOutcome {
    pub results: Vec<ForecastResult>,
    pub valid_ratio: f64,
}

/// Range (backtest) mode: one prediction per calendar day in
/// `[start_date, end_date]`. Missing lags are substituted with `0.0` and
/// flagged in diagnostics rather than silently defaulted (spec.md §9 Open
/// Question 3) — this is a backtest-leniency choice, not used in
/// single-date mode.
pub fn forecast_range(
    master: &[MasterDataRecord],
    model: &mut ArModel,
    instrument: Instrument,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<RangeForecastOutcome, ForecastError> {
    if model.instrument != instrument {
        return Err(ForecastError::InstrumentMismatch {
            model: model.instrument,
            requested: instrument,
        });
    }
    if master.len() < model.p_order {
        return Err(ForecastError::InsufficientSeries {
            have: master.len(),
            need: model.p_order,
        });
    }

    let by_day: BTreeMap<NaiveDate, &MasterDataRecord> =
        master.iter().map(|r| (r.timestamp.date_naive(), r)).collect();

    let mut results = Vec::new();
    let mut valid = 0usize;
    let mut total = 0usize;
    let mut day = start_date;
    while day <= end_date {
        total += 1;
        let start = Instant::now();
        let mut missing_lag_substituted = false;
        let mut lags = Vec::with_capacity(model.p_order);
        for i in 1..=model.p_order {
            let lag_day = match day.checked_sub_days(Days::new(i as u64)) {
                Some(d) => d,
                None => {
                    missing_lag_substituted = true;
                    lags.push(0.0);
                    continue;
                }
            };
            match by_day.get(&lag_day).and_then(|r| r.demean_diff_oc) {
                Some(v) => lags.push(v.to_f64()),
                None => {
                    missing_lag_substituted = true;
                    lags.push(0.0);
                }
            }
        }

        let ctx = CalculationContext {
            instrument,
            model,
            by_day: by_day.clone(),
            execution_id: Uuid::new_v4(),
        };
        let pred_demean_diff = predict_demean_diff(&ctx, &lags);

        let prev_day = day.pred_opt();
        let (prev_record, stale_basis) = match prev_day.and_then(|d| by_day.get(&d)) {
            Some(r) => (Some((*r).clone()), false),
            None => {
                let fallback = master.iter().filter(|r| r.timestamp.date_naive() < day).max_by_key(|r| r.timestamp).cloned();
                let stale = fallback.is_some();
                (fallback, stale)
            }
        };

        match prev_record {
            Some(prev) => {
                let (pred_oc, expected_return) = reconstruct(pred_demean_diff, &prev);
                valid += 1;
                results.push(ForecastResult {
                    execution_id: ctx.execution_id,
                    instrument,
                    forecast_date: day,
                    expected_return,
                    confidence: 0.0, // filled in after the loop with the aggregate range confidence
                    status: ForecastStatus::Success,
                    predicted_diff_oc: pred_demean_diff,
                    predicted_oc: pred_oc,
                    ar_order: model.p_order,
                    data_points_used: master.len(),
                    model_version: model.model_version.clone(),
                    data_range_start: start_date,
                    data_range_end: end_date,
                    mse: model.sigma2,
                    std_err: model.std_err(),
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    error_message: None,
                    created_at: Utc::now(),
                    diagnostics: ForecastDiagnostics {
                        stale_basis,
                        missing_lag_substituted,
                    },
                });
            }
            None => {
                results.push(ForecastResult {
                    execution_id: ctx.execution_id,
                    instrument,
                    forecast_date: day,
                    expected_return: 0.0,
                    confidence: 0.0,
                    status: ForecastStatus::Failed,
                    predicted_diff_oc: pred_demean_diff,
                    predicted_oc: 0.0,
                    ar_order: model.p_order,
                    data_points_used: master.len(),
                    model_version: model.model_version.clone(),
                    data_range_start: start_date,
                    data_range_end: end_date,
                    mse: model.sigma2,
                    std_err: model.std_err(),
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    error_message: Some("no basis price available for reconstruction".into()),
                    created_at: Utc::now(),
                    diagnostics: ForecastDiagnostics {
                        stale_basis: false,
                        missing_lag_substituted,
                    },
                });
            }
        }

        day = day.succ_opt().expect("date arithmetic");
    }

    let valid_ratio = if total == 0 { 0.0 } else { valid as f64 / total as f64 };
    let range_confidence = 0.7 * valid_ratio;
    for r in results.iter_mut() {
        r.confidence = range_confidence;
    }

    model.mark_used(Utc::now());

    Ok(RangeForecastOutcome { results, valid_ratio })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Price;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn record(day: u32, demean: f64, oc_val: f64, open: f64) -> MasterDataRecord {
        let ts = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        );
        MasterDataRecord {
            instrument: Instrument::Btc,
            timestamp: ts,
            open_price: Price::new(open.try_into().unwrap_or_default(), "USD"),
            close_price: Price::new((open - oc_val).try_into().unwrap_or_default(), "USD"),
            oc: SignedAmount::new(oc_val.try_into().unwrap_or_default()),
            diff_oc: Some(SignedAmount::new(Default::default())),
            demean_diff_oc: Some(SignedAmount::new(demean.try_into().unwrap_or_default())),
            mean_diff_oc: 0.5,
            calculation_version: 1,
            calculated_at: Utc::now(),
        }
    }

    #[test]
    fn ar_prediction_is_linear_in_lags() {
        let model = ArModel::new(Instrument::Btc, 1, vec![1.0], 0.5, 1.0, "legacy".into(), Utc::now());
        let ctx = CalculationContext {
            instrument: Instrument::Btc,
            model: &model,
            by_day: BTreeMap::new(),
            execution_id: Uuid::new_v4(),
        };
        assert_eq!(predict_demean_diff(&ctx, &[0.0]), 0.5);
        assert_eq!(predict_demean_diff(&ctx, &[2.0]), 2.5);
    }

    #[test]
    fn s5_single_date_forecast_matches_worked_example() {
        // p=3, meanDiffOC=0.5, phi=(0.4, -0.2, 0.1); L1=2.0 L2=1.0 L3=-1.0
        let model = ArModel::new(Instrument::Btc, 3, vec![0.4, -0.2, 0.1], 0.5, 1.0, "legacy".into(), Utc::now());
        let ctx = CalculationContext {
            instrument: Instrument::Btc,
            model: &model,
            by_day: BTreeMap::new(),
            execution_id: Uuid::new_v4(),
        };
        let pred = predict_demean_diff(&ctx, &[2.0, 1.0, -1.0]);
        assert!((pred - 1.0).abs() < 1e-9);

        let prev = record(1, 0.0, 3.0, 100.0);
        let (pred_oc, expected_return) = reconstruct(pred, &prev);
        assert!((pred_oc - 4.0).abs() < 1e-9);
        assert!((expected_return - 0.04).abs() < 1e-9);
    }

    #[test]
    fn confidence_drops_with_short_series() {
        assert_eq!(confidence_for(100, true), 0.8);
        assert!((confidence_for(40, true) - 0.7).abs() < 1e-9);
        assert!((confidence_for(10, true) - 0.5).abs() < 1e-9);
    }
}
