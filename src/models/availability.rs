use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// Minutes between bookable times on the hourly grid.
pub const GRID_MINUTES: u32 = 30;

pub fn window_open() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN)
}

pub fn window_close() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn starting_at(start: NaiveDateTime, minutes: i64) -> Option<Self> {
        Self::new(start, start + Duration::minutes(minutes))
    }

    /// Back-to-back ranges (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn clip(&self, bounds: &TimeRange) -> Option<TimeRange> {
        TimeRange::new(self.start.max(bounds.start), self.end.min(bounds.end))
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Operating window 07:00–23:00 on `date`.
pub fn operating_window(date: NaiveDate) -> TimeRange {
    TimeRange {
        start: date.and_time(window_open()),
        end: date.and_time(window_close()),
    }
}

/// Whole calendar day `[date 00:00, date+1 00:00)`.
pub fn calendar_day(date: NaiveDate) -> TimeRange {
    let start = date.and_time(NaiveTime::MIN);
    TimeRange {
        start,
        end: start + Duration::days(1),
    }
}

/// True for 07:00, 07:30 … 23:00.
pub fn is_on_grid(t: NaiveTime) -> bool {
    t.second() == 0 && t.minute() % GRID_MINUTES == 0 && t >= window_open() && t <= window_close()
}

/// Start of every 30-minute cell inside the operating window (07:00 … 22:30).
pub fn grid_cells() -> Vec<NaiveTime> {
    let mut cells = Vec::new();
    let mut t = window_open();
    while t < window_close() {
        cells.push(t);
        t += Duration::minutes(GRID_MINUTES as i64);
    }
    cells
}

/// Sorts and coalesces overlapping or touching ranges.
pub fn merge(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
            _ => merged.push(r),
        }
    }
    merged
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Accepts `YYYY-MM-DD HH:MM` or the ISO `T` separator.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn range(a: &str, b: &str) -> TimeRange {
        TimeRange::new(dt(a), dt(b)).unwrap()
    }

    #[test]
    fn test_overlap_inside() {
        let existing = range("2030-06-16 10:00", "2030-06-16 13:00");
        assert!(existing.overlaps(&range("2030-06-16 11:00", "2030-06-16 12:00")));
        assert!(existing.overlaps(&range("2030-06-16 09:00", "2030-06-16 10:30")));
        assert!(existing.overlaps(&range("2030-06-16 12:30", "2030-06-16 15:00")));
        assert!(existing.overlaps(&range("2030-06-16 08:00", "2030-06-16 18:00")));
    }

    #[test]
    fn test_back_to_back_does_not_overlap() {
        let existing = range("2030-06-16 10:00", "2030-06-16 13:00");
        assert!(!existing.overlaps(&range("2030-06-16 13:00", "2030-06-16 15:00")));
        assert!(!existing.overlaps(&range("2030-06-16 08:00", "2030-06-16 10:00")));
    }

    #[test]
    fn test_empty_range_rejected() {
        assert!(TimeRange::new(dt("2030-06-16 10:00"), dt("2030-06-16 10:00")).is_none());
        assert!(TimeRange::new(dt("2030-06-16 11:00"), dt("2030-06-16 10:00")).is_none());
    }

    #[test]
    fn test_clip_to_window() {
        let date = NaiveDate::from_ymd_opt(2030, 6, 16).unwrap();
        let overnight = range("2030-06-15 20:00", "2030-06-16 09:00");
        let clipped = overnight.clip(&operating_window(date)).unwrap();
        assert_eq!(clipped, range("2030-06-16 07:00", "2030-06-16 09:00"));

        let early = range("2030-06-16 01:00", "2030-06-16 06:00");
        assert!(early.clip(&operating_window(date)).is_none());
    }

    #[test]
    fn test_grid() {
        assert!(is_on_grid(parse_time("07:00").unwrap()));
        assert!(is_on_grid(parse_time("23:00").unwrap()));
        assert!(is_on_grid(parse_time("13:30").unwrap()));
        assert!(!is_on_grid(parse_time("06:30").unwrap()));
        assert!(!is_on_grid(parse_time("23:30").unwrap()));
        assert!(!is_on_grid(parse_time("10:15").unwrap()));
        assert_eq!(grid_cells().len(), 32);
    }

    #[test]
    fn test_merge_coalesces_touching_ranges() {
        let merged = merge(vec![
            range("2030-06-16 14:00", "2030-06-16 15:00"),
            range("2030-06-16 10:00", "2030-06-16 12:00"),
            range("2030-06-16 12:00", "2030-06-16 13:00"),
            range("2030-06-16 11:00", "2030-06-16 11:30"),
        ]);
        assert_eq!(
            merged,
            vec![
                range("2030-06-16 10:00", "2030-06-16 13:00"),
                range("2030-06-16 14:00", "2030-06-16 15:00"),
            ]
        );
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(parse_datetime("2030-06-16T10:00"), Some(dt("2030-06-16 10:00")));
        assert_eq!(parse_datetime("2030-06-16 10:00"), Some(dt("2030-06-16 10:00")));
        assert!(parse_datetime("16/06/2030 10:00").is_none());
        assert!(parse_date("2030-13-01").is_none());
    }
}
