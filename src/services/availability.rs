use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::availability::{self, calendar_day, grid_cells, operating_window, GRID_MINUTES};
use crate::models::{FleetCategory, RentalMode, SlotCategory, TimeRange};

/// True iff the slot exists and nobody holds it.
pub fn is_slot_free(
    conn: &Connection,
    category: SlotCategory,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<bool, AppError> {
    Ok(queries::find_slot(conn, category, date, time)?.is_some_and(|s| !s.is_reserved))
}

/// Times of the reserved slots for a category on `date`.
pub fn unavailable_slot_times(
    conn: &Connection,
    category: SlotCategory,
    date: NaiveDate,
) -> Result<Vec<String>, AppError> {
    Ok(queries::list_slots(conn, category, date)?
        .into_iter()
        .filter(|s| s.is_reserved)
        .map(|s| s.time.format("%H:%M").to_string())
        .collect())
}

/// Covered parts of the operating window on `date` for one fleet resource.
///
/// Bookings running past either window edge are clipped to it. In daily mode
/// any booking touching the window blocks the whole window.
pub fn unavailable_ranges(
    conn: &Connection,
    category: FleetCategory,
    resource_id: i64,
    date: NaiveDate,
    mode: RentalMode,
) -> Result<Vec<TimeRange>, AppError> {
    let window = operating_window(date);
    let bookings = queries::overlapping_ranges(conn, category, resource_id, &calendar_day(date))?;

    let clipped: Vec<TimeRange> = bookings.iter().filter_map(|b| b.clip(&window)).collect();
    if clipped.is_empty() {
        return Ok(Vec::new());
    }

    match mode {
        RentalMode::Daily => Ok(vec![window]),
        RentalMode::Hourly => Ok(availability::merge(clipped)),
    }
}

/// Grid labels (`HH:MM`) whose 30-minute cell intersects any of `ranges`.
pub fn unavailable_labels(date: NaiveDate, ranges: &[TimeRange]) -> Vec<String> {
    grid_cells()
        .into_iter()
        .filter_map(|t| {
            let start = date.and_time(t);
            TimeRange::new(start, start + Duration::minutes(GRID_MINUTES as i64))
        })
        .filter(|cell| ranges.iter().any(|r| r.overlaps(cell)))
        .map(|cell| cell.start.format("%H:%M").to_string())
        .collect()
}

pub fn has_overlap(
    conn: &Connection,
    category: FleetCategory,
    resource_id: i64,
    range: &TimeRange,
) -> Result<bool, AppError> {
    Ok(queries::count_overlapping(conn, category, resource_id, range)? > 0)
}
