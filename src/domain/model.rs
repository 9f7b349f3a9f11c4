use chrono::{DateTime, Utc};

use crate::domain::instrument::Instrument;

/// A pre-fitted AR(p) artifact: `predDemeanDiff = meanDiffOC + sum(phi_i * L_i)`
/// for `i` in `1..=p_order`, coefficients stored in lag-1..lag-p order.
#[derive(Debug, Clone)]
pub struct ArModel {
    pub instrument: Instrument,
    pub p_order: usize,
    pub coefficients: Vec<f64>,
    pub mean_diff_oc: f64,
    pub sigma2: f64,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ArModel {
    /// # Panics
    /// Panics if `coefficients.len() != p_order`, or `p_order` is outside
    /// `[1, 50]` — both are load-time invariants enforced by the artifact
    /// store before an `ArModel` is ever constructed.
    pub fn new(
        instrument: Instrument,
        p_order: usize,
        coefficients: Vec<f64>,
        mean_diff_oc: f64,
        sigma2: f64,
        model_version: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        assert!((1..=50).contains(&p_order), "p_order out of [1, 50]");
        assert_eq!(coefficients.len(), p_order, "coefficient count must equal p_order");
        Self {
            instrument,
            p_order,
            coefficients,
            mean_diff_oc,
            sigma2,
            model_version,
            created_at,
            last_used: None,
        }
    }

    pub fn std_err(&self) -> f64 {
        self.sigma2.sqrt()
    }

    pub fn mark_used(&mut self, at: DateTime<Utc>) {
        self.last_used = Some(at);
    }
}
