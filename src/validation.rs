//! Batch validation service (C3.1): checks a slice of bars before they are
//! merged into a [`MarketInstrument`](crate::domain::MarketInstrument)
//! aggregate. Errors are fatal to the batch; warnings are attached but never
//! block the merge.

use chrono::Utc;

use crate::domain::Ohlcv;
use crate::error::{ValidationError, ValidationWarning};

/// Sanity threshold for close/open jumps, expressed as a fraction (0.5 =
/// 50%). Configurable per deployment; this is the default.
pub const DEFAULT_JUMP_SANITY_THRESHOLD: f64 = 0.5;

pub struct ValidationOutcome {
    pub warnings: Vec<ValidationWarning>,
}

/// Validates one batch of bars against `instrument_currency` and, if given,
/// the tail bar of the prior batch (for gap/jump detection across batch
/// boundaries).
pub fn validate_batch(
    bars: &[Ohlcv],
    instrument_currency: &'static str,
    prior_tail: Option<&Ohlcv>,
    jump_threshold: f64,
) -> Result<ValidationOutcome, ValidationError> {
    let mut warnings = Vec::new();

    check_ordered_and_unique(bars)?;

    for bar in bars {
        bar.validate()?;
        if bar.currency() != instrument_currency {
            return Err(ValidationError::CurrencyMismatch {
                expected: instrument_currency.to_string(),
                actual: bar.currency().to_string(),
            });
        }
    }

    let mut prev: Option<&Ohlcv> = prior_tail;
    for bar in bars {
        if let Some(p) = prev {
            if let Some(w) = gap_warning(p, bar) {
                warnings.push(w);
            }
            if let Some(w) = jump_warning(p, bar, jump_threshold) {
                warnings.push(w);
            }
        }
        prev = Some(bar);
    }

    Ok(ValidationOutcome { warnings })
}

fn check_ordered_and_unique(bars: &[Ohlcv]) -> Result<(), ValidationError> {
    for w in bars.windows(2) {
        if w[0].timestamp >= w[1].timestamp {
            return Err(ValidationError::UnorderedOrDuplicate);
        }
    }
    Ok(())
}

fn gap_warning(prev: &Ohlcv, next: &Ohlcv) -> Option<ValidationWarning> {
    let gap_days = (next.timestamp - prev.timestamp).num_days();
    if gap_days > 1 {
        Some(ValidationWarning::GapDetected {
            after: prev.timestamp,
            before: next.timestamp,
            missing_days: gap_days - 1,
        })
    } else {
        None
    }
}

fn jump_warning(prev: &Ohlcv, next: &Ohlcv, threshold: f64) -> Option<ValidationWarning> {
    use rust_decimal::prelude::ToPrimitive;
    let prev_close = prev.close.amount().to_f64().unwrap_or(0.0);
    let next_open = next.open.amount().to_f64().unwrap_or(0.0);
    if prev_close <= 0.0 {
        return None;
    }
    let pct_change = (next_open - prev_close).abs() / prev_close;
    if pct_change > threshold {
        Some(ValidationWarning::SanityJump {
            timestamp: next.timestamp,
            pct_change,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Price;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: &str) -> Ohlcv {
        Ohlcv {
            open: Price::new(dec!(100), "USD"),
            high: Price::new(dec!(105), "USD"),
            low: Price::new(dec!(95), "USD"),
            close: Price::new(close.parse().unwrap(), "USD"),
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
    fn gap_in_middle_is_a_warning_not_an_error() {
        let bars = vec![bar(1, "101"), bar(3, "102")];
        let outcome = validate_batch(&bars, "USD", None, DEFAULT_JUMP_SANITY_THRESHOLD).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            ValidationWarning::GapDetected { missing_days: 1, .. }
        ));
    }

    #[test]
    fn unordered_batch_is_rejected() {
        let bars = vec![bar(3, "101"), bar(1, "102")];
        assert!(validate_batch(&bars, "USD", None, DEFAULT_JUMP_SANITY_THRESHOLD).is_err());
    }

    #[test]
    fn duplicate_timestamp_within_batch_is_rejected() {
        let bars = vec![bar(1, "101"), bar(1, "102")];
        assert!(validate_batch(&bars, "USD", None, DEFAULT_JUMP_SANITY_THRESHOLD).is_err());
    }
}
