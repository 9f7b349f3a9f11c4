use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived data-quality snapshot for a price series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityMetrics {
    pub total_points: usize,
    pub missing_points: usize,
    pub duplicate_points: usize,
    pub completeness_pct: f64,
    pub last_updated: DateTime<Utc>,
    pub data_source: String,
}

impl Default for DataQualityMetrics {
    fn default() -> Self {
        Self {
            total_points: 0,
            missing_points: 0,
            duplicate_points: 0,
            completeness_pct: 0.0,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            data_source: String::new(),
        }
    }
}

impl DataQualityMetrics {
    pub fn compute(
        total_points: usize,
        missing_points: usize,
        duplicate_points: usize,
        last_updated: DateTime<Utc>,
        data_source: String,
    ) -> Self {
        let expected = total_points + missing_points;
        let completeness_pct = if expected == 0 {
            100.0
        } else {
            (total_points as f64 / expected as f64) * 100.0
        };
        Self {
            total_points,
            missing_points,
            duplicate_points,
            completeness_pct,
            last_updated,
            data_source,
        }
    }

    fn duplicate_pct(&self) -> f64 {
        if self.total_points == 0 {
            0.0
        } else {
            (self.duplicate_points as f64 / self.total_points as f64) * 100.0
        }
    }

    /// `completenessPct - min(50, 2*duplicatePct)`.
    pub fn quality_score(&self) -> f64 {
        (self.completeness_pct - (2.0 * self.duplicate_pct()).min(50.0)).max(0.0)
    }

    pub fn level(&self) -> QualityLevel {
        let score = self.quality_score();
        if score >= 90.0 {
            QualityLevel::Excellent
        } else if score >= 70.0 {
            QualityLevel::Good
        } else if score >= 50.0 {
            QualityLevel::Acceptable
        } else {
            QualityLevel::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_complete_series_scores_excellent() {
        let q = DataQualityMetrics::compute(10, 0, 0, Utc::now(), "test".into());
        assert_eq!(q.completeness_pct, 100.0);
        assert_eq!(q.level(), QualityLevel::Excellent);
    }

    #[test]
    fn duplicate_pct_is_capped_at_fifty_penalty() {
        let q = DataQualityMetrics::compute(10, 0, 10, Utc::now(), "test".into());
        // duplicatePct = 100%, penalty = min(50, 200) = 50
        assert_eq!(q.quality_score(), 50.0);
        assert_eq!(q.level(), QualityLevel::Acceptable);
    }
}
