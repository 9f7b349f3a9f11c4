//! Master-data preparation pipeline (C5): identifies gaps in the derived
//! series, back-fills them from raw prices (pulling through ingestion on a
//! price-coverage miss), and returns the full ordered series for the
//! requested range. Deterministic and idempotent (§8).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Utc};
use itertools::Itertools;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ArModel, Instrument, MasterDataRecord, Ohlcv, Price, SignedAmount, TimeRange};
use crate::error::MasterPrepError;
use crate::ingestion;
use crate::source::DataSourceFactory;
use crate::store::{MarketDataStore, MasterDataStore};

/// `oc = open - close` — the sign convention pinned by this crate for both
/// master-data persistence and forecast reconstruction, per spec.md §9 Open
/// Question 1. The alternative ("expected-return estimate" path using
/// `close - open`) is NOT used anywhere in this crate; `expectedReturn =
/// predOC / open(prev)` is computed consistently against this convention so
/// a rising close (close > open, "OC" negative under this convention) yields
/// a negative expected return, matching a bearish day.
pub fn oc(bar: &Ohlcv) -> SignedAmount {
    bar.open.checked_sub(&bar.close).expect("same-currency OHLCV bar")
}

pub struct MasterPrepRequest {
    pub instrument: Instrument,
    pub historical_data_range: TimeRange,
    pub required_points: usize,
    pub execution_id: Uuid,
}

#[allow(clippy::too_many_arguments)]
pub async fn prepare(
    market_store: Arc<dyn MarketDataStore>,
    master_store: Arc<dyn MasterDataStore>,
    factory: Arc<DataSourceFactory>,
    model: &ArModel,
    request: MasterPrepRequest,
) -> Result<Vec<MasterDataRecord>, MasterPrepError> {
    let from_day = request.historical_data_range.from_date();
    let to_day = request.historical_data_range.to_date();

    // Stage 1: existence + cardinality probe. The to-day is the forecast
    // target and is never itself a master-data day.
    let mut loaded = master_store
        .find_by_range(request.instrument, from_day, to_day)
        .await?;
    let required_dates = date_sequence(from_day, to_day);
    let existing_dates: std::collections::BTreeSet<NaiveDate> =
        loaded.iter().map(|r| r.timestamp.date_naive()).collect();
    let fully_covered = required_dates.iter().all(|d| existing_dates.contains(d));

    if loaded.len() >= request.required_points && fully_covered {
        loaded.sort_by_key(|r| r.timestamp);
        return Ok(loaded);
    }

    // Stage 2: gap identification — maximal contiguous sub-intervals of
    // requiredDates \ existingDates.
    let missing_dates: Vec<NaiveDate> = required_dates
        .iter()
        .filter(|d| !existing_dates.contains(d))
        .copied()
        .collect();
    let missing_ranges = contiguous_ranges(&missing_dates);

    // Stage 3: back-fill.
    for (a, b) in missing_ranges {
        let expand_from = a.checked_sub_days(Days::new(1)).expect("date arithmetic in range");
        let price_range = TimeRange::from_dates(expand_from, b);
        let mut bars = market_store.find_by_range(request.instrument, price_range).await?;

        let expected_days = (b - expand_from).num_days() + 1;
        if (bars.len() as i64) < expected_days {
            info!(instrument = %request.instrument, %a, %b, "price coverage incomplete, pulling through ingestion");
            ingestion::fetch_missing(
                factory.clone(),
                market_store.clone(),
                request.instrument,
                price_range,
                None,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "fetch_missing failed during back-fill");
                MasterPrepError::PriceDataUnavailable(format!("{a}..{b}"))
            })?;
            bars = market_store.find_by_range(request.instrument, price_range).await?;
        }

        let by_day: BTreeMap<NaiveDate, &Ohlcv> = bars.iter().map(|b| (b.timestamp.date_naive(), b)).collect();

        let mut day = a;
        while day <= b {
            let prev_day = day.checked_sub_days(Days::new(1)).expect("date arithmetic");
            let (today_bar, prev_bar) = match (by_day.get(&day), by_day.get(&prev_day)) {
                (Some(t), Some(p)) => (*t, *p),
                _ => return Err(MasterPrepError::PriceDataUnavailable(day.to_string())),
            };

            let today_oc = oc(today_bar);
            let prev_oc = oc(prev_bar);
            let diff_oc = today_oc.sub(&prev_oc);
            let demean = SignedAmount::new(diff_oc.value() - rust_decimal::Decimal::try_from(model.mean_diff_oc).unwrap_or_default());

            let record = MasterDataRecord {
                instrument: request.instrument,
                timestamp: today_bar.timestamp,
                open_price: today_bar.open,
                close_price: today_bar.close,
                oc: today_oc,
                diff_oc: Some(diff_oc),
                demean_diff_oc: Some(demean),
                mean_diff_oc: model.mean_diff_oc,
                calculation_version: 1,
                calculated_at: Utc::now(),
            };
            master_store.upsert(record.clone()).await?;

            match loaded.iter().position(|r| r.timestamp.date_naive() == day) {
                Some(idx) => {
                    if record.has_differences() || !loaded[idx].has_differences() {
                        loaded[idx] = record;
                    }
                }
                None => loaded.push(record),
            }

            day = day.checked_add_days(Days::new(1)).expect("date arithmetic");
        }
    }

    // Stage 4: sufficiency check.
    loaded.sort_by_key(|r| r.timestamp);
    loaded.retain(|r| {
        let d = r.timestamp.date_naive();
        d >= from_day && d < to_day
    });
    if loaded.len() < request.required_points {
        return Err(MasterPrepError::InsufficientMasterData {
            have: loaded.len(),
            need: request.required_points,
            range_start: from_day,
            range_end: to_day,
        });
    }

    Ok(loaded)
}

fn date_sequence(from: NaiveDate, to_exclusive: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = from;
    while d < to_exclusive {
        out.push(d);
        d = d.checked_add_days(Days::new(1)).expect("date arithmetic");
    }
    out
}

/// Groups a sorted-or-unsorted list of dates into maximal contiguous
/// `(start, end)` inclusive runs.
fn contiguous_ranges(dates: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut sorted = dates.to_vec();
    sorted.sort();
    sorted.dedup();
    let mut out = Vec::new();
    for run in sorted.into_iter().enumerate().chunk_by(|(i, d)| d.num_days_from_ce() - *i as i32).into_iter() {
        let days: Vec<NaiveDate> = run.1.map(|(_, d)| d).collect();
        if let (Some(first), Some(last)) = (days.first(), days.last()) {
            out.push((*first, *last));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_ranges_groups_runs_and_splits_on_gaps() {
        let dates = vec![
            NaiveDate::from_ymd_opt(2024, 2, 6).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 7).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 8).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 9).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
        ];
        let ranges = contiguous_ranges(&dates);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].0.day(), 6);
        assert_eq!(ranges[0].1.day(), 9);
        assert_eq!(ranges[1].0.day(), 20);
    }
}
