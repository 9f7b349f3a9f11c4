use chrono::{DateTime, Utc};

use crate::domain::instrument::Instrument;
use crate::domain::money::{Price, SignedAmount};

/// A derived per-day record: open/close prices plus the OC / diffOC /
/// demeanDiffOC chain used as input to the AR(p) model.
///
/// `diffOC`/`demeanDiffOC` are absent on the first day of a series (there is
/// no `oc(t-1)` to difference against) — `hasDifferences()` reflects that.
#[derive(Debug, Clone)]
pub struct MasterDataRecord {
    pub instrument: Instrument,
    pub timestamp: DateTime<Utc>,
    pub open_price: Price,
    pub close_price: Price,
    pub oc: SignedAmount,
    pub diff_oc: Option<SignedAmount>,
    pub demean_diff_oc: Option<SignedAmount>,
    pub mean_diff_oc: f64,
    pub calculation_version: u32,
    pub calculated_at: DateTime<Utc>,
}

impl MasterDataRecord {
    pub fn has_differences(&self) -> bool {
        self.diff_oc.is_some() && self.demean_diff_oc.is_some()
    }

    /// Unique key: `(instrument, timestamp, calculationVersion)`.
    pub fn key(&self) -> (Instrument, DateTime<Utc>, u32) {
        (self.instrument, self.timestamp, self.calculation_version)
    }
}
