use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

/// Inclusive interval `[from, to]` with `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TimeRange {
    /// # Panics
    /// Panics if `from > to`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        assert!(from <= to, "time range requires from <= to");
        Self { from, to }
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.from && t <= self.to
    }

    pub fn duration_days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    /// Splits into contiguous, non-overlapping (touching at endpoints only)
    /// sub-ranges of at most `n` days each, tiling the original range.
    ///
    /// # Panics
    /// Panics if `n == 0`.
    pub fn split_into_days(&self, n: i64) -> Vec<TimeRange> {
        assert!(n > 0, "chunk length must be positive");
        if self.from == self.to {
            return vec![TimeRange::new(self.from, self.to)];
        }
        let mut chunks = Vec::new();
        let mut cursor = self.from;
        let step = chrono::Duration::days(n);
        while cursor < self.to {
            let next = (cursor + step).min(self.to);
            chunks.push(TimeRange::new(cursor, next));
            cursor = next;
        }
        chunks
    }

    /// Maps inclusive calendar days `[a, b]` (UTC) to the half-open instant
    /// range `[startOfDay(a), startOfDay(b+1))`, per spec.md's day-inclusive
    /// convention.
    pub fn from_dates(a: NaiveDate, b: NaiveDate) -> Self {
        let from = Utc.from_utc_datetime(&a.and_hms_opt(0, 0, 0).unwrap());
        let to_day = b.checked_add_days(Days::new(1)).unwrap();
        let to = Utc.from_utc_datetime(&to_day.and_hms_opt(0, 0, 0).unwrap());
        Self { from, to }
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from.date_naive()
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
    }

    #[test]
    fn split_tiles_the_original_range() {
        let r = TimeRange::new(day(2024, 1, 1), day(2024, 1, 10));
        let chunks = r.split_into_days(3);
        assert_eq!(chunks.first().unwrap().from(), r.from());
        assert_eq!(chunks.last().unwrap().to(), r.to());
        for w in chunks.windows(2) {
            assert_eq!(w[0].to(), w[1].from());
        }
    }

    #[test]
    fn split_zero_length_range_yields_one_chunk() {
        let r = TimeRange::new(day(2024, 1, 1), day(2024, 1, 1));
        let chunks = r.split_into_days(90);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].from(), chunks[0].to());
    }

    #[test]
    fn from_dates_excludes_the_day_after_to() {
        let r = TimeRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
        );
        assert_eq!(r.from(), day(2024, 2, 1));
        assert_eq!(r.to(), day(2024, 2, 11));
    }
}
