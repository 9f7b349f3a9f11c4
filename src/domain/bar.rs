use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::instrument::Instrument;
use crate::domain::money::Price;
use crate::domain::quality::DataQualityMetrics;
use crate::error::ValidationError;

/// A single daily OHLCV bar. Identity within an instrument series is the
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ohlcv {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.volume < Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(self.timestamp));
        }
        if !self.open.is_positive() || !self.high.is_positive() || !self.low.is_positive() || !self.close.is_positive()
        {
            return Err(ValidationError::NonPositivePrice(self.timestamp));
        }
        let max_oc = self.open.amount().max(self.close.amount());
        let min_oc = self.open.amount().min(self.close.amount());
        if self.high.amount() < max_oc || self.low.amount() > min_oc {
            return Err(ValidationError::OhlcInvariant {
                timestamp: self.timestamp,
                open: self.open.amount().to_string(),
                high: self.high.amount().to_string(),
                low: self.low.amount().to_string(),
                close: self.close.amount().to_string(),
            });
        }
        for p in [self.open, self.high, self.low, self.close] {
            if p.currency() != self.open.currency() {
                return Err(ValidationError::CurrencyMismatch {
                    expected: self.open.currency().to_string(),
                    actual: p.currency().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn currency(&self) -> &'static str {
        self.open.currency()
    }
}

/// Emitted whenever bars are merged into a [`MarketInstrument`] aggregate.
#[derive(Debug, Clone)]
pub struct MarketDataUpdated {
    pub instrument: Instrument,
    pub added: usize,
    pub at: DateTime<Utc>,
}

/// Per-instrument aggregate: ordered price history plus derived quality
/// metrics. `priceHistory` is kept as a `BTreeMap` keyed by timestamp so
/// that merges are dedup-on-insert and iteration is always ascending.
#[derive(Debug, Clone)]
pub struct MarketInstrument {
    pub instrument: Instrument,
    pub name: &'static str,
    pub quote_currency: &'static str,
    price_history: BTreeMap<DateTime<Utc>, Ohlcv>,
    pub quality: DataQualityMetrics,
    pub last_updated: Option<DateTime<Utc>>,
    data_source: Option<String>,
}

impl MarketInstrument {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            name: instrument.name(),
            quote_currency: instrument.quote_currency(),
            price_history: BTreeMap::new(),
            quality: DataQualityMetrics::default(),
            last_updated: None,
            data_source: None,
        }
    }

    pub fn len(&self) -> usize {
        self.price_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.price_history.is_empty()
    }

    pub fn bars(&self) -> impl Iterator<Item = &Ohlcv> {
        self.price_history.values()
    }

    /// Timestamp-deduplicating merge: last-write-wins at the bar level.
    /// Recomputes quality metrics and returns the update event.
    pub fn add_bars(
        &mut self,
        bars: impl IntoIterator<Item = Ohlcv>,
        data_source: &str,
        now: DateTime<Utc>,
    ) -> Result<MarketDataUpdated, ValidationError> {
        let mut duplicates = 0usize;
        let mut added = 0usize;
        for bar in bars {
            if bar.currency() != self.quote_currency {
                return Err(ValidationError::CurrencyMismatch {
                    expected: self.quote_currency.to_string(),
                    actual: bar.currency().to_string(),
                });
            }
            if self.price_history.insert(bar.timestamp, bar).is_some() {
                duplicates += 1;
            } else {
                added += 1;
            }
        }
        self.data_source = Some(data_source.to_string());
        self.last_updated = Some(now);
        self.recompute_quality(duplicates);
        Ok(MarketDataUpdated {
            instrument: self.instrument,
            added,
            at: now,
        })
    }

    fn recompute_quality(&mut self, duplicates_this_merge: usize) {
        let total = self.price_history.len();
        let missing = expected_missing_days(&self.price_history);
        self.quality = DataQualityMetrics::compute(
            total,
            missing,
            self.quality.duplicate_points + duplicates_this_merge,
            self.last_updated.unwrap_or_else(Utc::now),
            self.data_source.clone().unwrap_or_default(),
        );
    }

    pub fn earliest(&self) -> Option<&Ohlcv> {
        self.price_history.values().next()
    }

    pub fn latest(&self) -> Option<&Ohlcv> {
        self.price_history.values().next_back()
    }

    /// `to` is treated as exclusive, matching [`TimeRange::from_dates`]'s
    /// convention of placing `to` at the midnight after the last requested
    /// calendar day — every store-level range query in this crate shares
    /// this convention so a chunk boundary is never double-counted.
    pub fn find_by_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Ohlcv> {
        self.price_history
            .range(from..to)
            .map(|(_, bar)| bar.clone())
            .collect()
    }

    pub fn count_by_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        self.price_history.range(from..to).count()
    }
}

/// Counts calendar-day gaps in an ordered bar series (daily granularity
/// assumed); used to feed `DataQualityMetrics::compute`.
fn expected_missing_days(bars: &BTreeMap<DateTime<Utc>, Ohlcv>) -> usize {
    let mut missing = 0usize;
    let mut prev: Option<DateTime<Utc>> = None;
    for ts in bars.keys() {
        if let Some(p) = prev {
            let gap_days = (*ts - p).num_days();
            if gap_days > 1 {
                missing += (gap_days - 1) as usize;
            }
        }
        prev = Some(*ts);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(day: u32, o: &str, h: &str, l: &str, c: &str) -> Ohlcv {
        use chrono::TimeZone;
        Ohlcv {
            open: Price::new(o.parse().unwrap(), "USD"),
            high: Price::new(h.parse().unwrap(), "USD"),
            low: Price::new(l.parse().unwrap(), "USD"),
            close: Price::new(c.parse().unwrap(), "USD"),
            volume: dec!(10),
            timestamp: Utc.from_utc_datetime(
                &chrono::NaiveDate::from_ymd_opt(2024, 1, day)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            ),
        }
    }

    #[test]
    fn ohlc_invariant_rejects_high_below_close() {
        let b = bar(1, "100", "99", "95", "101");
        assert!(b.validate().is_err());
    }

    #[test]
    fn merge_is_timestamp_deduplicating() {
        let mut m = MarketInstrument::new(Instrument::Btc);
        let now = Utc::now();
        m.add_bars(vec![bar(1, "100", "105", "95", "101")], "test", now)
            .unwrap();
        m.add_bars(vec![bar(1, "100", "110", "90", "102")], "test", now)
            .unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.latest().unwrap().close.amount(), dec!(102));
    }
}
