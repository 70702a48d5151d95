use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, Row};
use rust_decimal::Decimal;

use crate::models::{
    AuditEntry, Booking, BookingStatus, Client, FleetCategory, LimoService, Limousine,
    LimousineRate, NewBooking, PaymentMethod, PaymentStatus, ServiceCategory, ServicePackage,
    Slot, SlotCategory, TimeRange, Vehicle,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, thiserror::Error)]
#[error("unexpected value in column: {0}")]
struct UnknownValue(String);

fn now_ts() -> String {
    Utc::now().naive_utc().format(TS_FORMAT).to_string()
}

fn ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    s.parse::<Decimal>().map_err(|e| conversion_err(idx, e))
}

fn opt_decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse::<Decimal>().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn datetime_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, TS_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn opt_datetime_at(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDateTime::parse_from_str(&s, TS_FORMAT).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn enum_at<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    parse(&s).ok_or_else(|| conversion_err(idx, UnknownValue(s)))
}

fn money(amount: Decimal) -> String {
    amount.round_dp(2).to_string()
}

// ── Catalog ──

pub fn insert_vehicle(
    conn: &Connection,
    model: &str,
    hourly_rate: Decimal,
    daily_rate: Decimal,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO vehicles (model, hourly_rate, daily_rate) VALUES (?1, ?2, ?3)",
        params![model, money(hourly_rate), money(daily_rate)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_vehicle_available(conn: &Connection, id: i64, available: bool) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE vehicles SET available = ?1 WHERE id = ?2",
        params![available, id],
    )?;
    Ok(count > 0)
}

fn parse_vehicle_row(row: &Row) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        model: row.get(1)?,
        hourly_rate: decimal_at(row, 2)?,
        daily_rate: decimal_at(row, 3)?,
        available: row.get(4)?,
    })
}

pub fn get_vehicle(conn: &Connection, id: i64) -> rusqlite::Result<Option<Vehicle>> {
    let result = conn.query_row(
        "SELECT id, model, hourly_rate, daily_rate, available FROM vehicles WHERE id = ?1",
        params![id],
        parse_vehicle_row,
    );
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn list_vehicles(conn: &Connection) -> rusqlite::Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(
        "SELECT id, model, hourly_rate, daily_rate, available FROM vehicles
         WHERE available = 1 ORDER BY model ASC",
    )?;
    let rows = stmt.query_map([], parse_vehicle_row)?;
    rows.collect()
}

pub fn insert_limousine(conn: &Connection, model: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT INTO limousines (model) VALUES (?1)", params![model])?;
    Ok(conn.last_insert_rowid())
}

pub fn set_limousine_rate(
    conn: &Connection,
    limousine_id: i64,
    service: LimoService,
    rate: Decimal,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO limousine_rates (limousine_id, service, rate) VALUES (?1, ?2, ?3)
         ON CONFLICT(limousine_id, service) DO UPDATE SET rate = excluded.rate",
        params![limousine_id, service.as_str(), money(rate)],
    )?;
    Ok(())
}

fn limousine_rates(conn: &Connection, limousine_id: i64) -> rusqlite::Result<Vec<LimousineRate>> {
    let mut stmt =
        conn.prepare("SELECT service, rate FROM limousine_rates WHERE limousine_id = ?1")?;
    let rows = stmt.query_map(params![limousine_id], |row| {
        Ok(LimousineRate {
            service: enum_at(row, 0, LimoService::parse)?,
            rate: decimal_at(row, 1)?,
        })
    })?;
    let mut rates: Vec<LimousineRate> = rows.collect::<rusqlite::Result<_>>()?;
    rates.sort_by_key(|r| LimoService::ALL.iter().position(|s| *s == r.service));
    Ok(rates)
}

pub fn get_limousine(conn: &Connection, id: i64) -> rusqlite::Result<Option<Limousine>> {
    let result = conn.query_row(
        "SELECT id, model, available FROM limousines WHERE id = ?1",
        params![id],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, bool>(2)?)),
    );
    match result {
        Ok((id, model, available)) => Ok(Some(Limousine {
            id,
            model,
            available,
            rates: limousine_rates(conn, id)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn list_limousines(conn: &Connection) -> rusqlite::Result<Vec<Limousine>> {
    let ids: Vec<i64> = {
        let mut stmt =
            conn.prepare("SELECT id FROM limousines WHERE available = 1 ORDER BY model ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let mut limousines = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(limo) = get_limousine(conn, id)? {
            limousines.push(limo);
        }
    }
    Ok(limousines)
}

pub fn insert_package(
    conn: &Connection,
    category: SlotCategory,
    name: &str,
    price: Decimal,
    valet_price: Option<Decimal>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO service_packages (category, name, price, valet_price) VALUES (?1, ?2, ?3, ?4)",
        params![category.as_str(), name, money(price), valet_price.map(money)],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_package_row(row: &Row) -> rusqlite::Result<ServicePackage> {
    Ok(ServicePackage {
        id: row.get(0)?,
        category: enum_at(row, 1, SlotCategory::parse)?,
        name: row.get(2)?,
        price: decimal_at(row, 3)?,
        valet_price: opt_decimal_at(row, 4)?,
        active: row.get(5)?,
    })
}

pub fn get_package(conn: &Connection, id: i64) -> rusqlite::Result<Option<ServicePackage>> {
    let result = conn.query_row(
        "SELECT id, category, name, price, valet_price, active FROM service_packages WHERE id = ?1",
        params![id],
        parse_package_row,
    );
    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn list_packages(conn: &Connection, category: SlotCategory) -> rusqlite::Result<Vec<ServicePackage>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, name, price, valet_price, active FROM service_packages
         WHERE category = ?1 AND active = 1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![category.as_str()], parse_package_row)?;
    rows.collect()
}

// ── Slots ──

/// Returns the new slot id, or `None` if the (category, date, time) tuple already exists.
pub fn insert_slot(
    conn: &Connection,
    category: SlotCategory,
    date: NaiveDate,
    time: NaiveTime,
) -> rusqlite::Result<Option<i64>> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO slots (category, slot_date, slot_time) VALUES (?1, ?2, ?3)",
        params![
            category.as_str(),
            date.format(DATE_FORMAT).to_string(),
            time.format(TIME_FORMAT).to_string()
        ],
    )?;
    Ok((count > 0).then(|| conn.last_insert_rowid()))
}

fn parse_slot_row(row: &Row) -> rusqlite::Result<Slot> {
    let date: String = row.get(2)?;
    let time: String = row.get(3)?;
    Ok(Slot {
        id: row.get(0)?,
        category: enum_at(row, 1, SlotCategory::parse)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion_err(2, e))?,
        time: NaiveTime::parse_from_str(&time, TIME_FORMAT).map_err(|e| conversion_err(3, e))?,
        is_reserved: row.get(4)?,
        booking_id: row.get(5)?,
    })
}

pub fn get_slot(conn: &Connection, id: i64) -> rusqlite::Result<Option<Slot>> {
    let result = conn.query_row(
        "SELECT id, category, slot_date, slot_time, is_reserved, booking_id FROM slots WHERE id = ?1",
        params![id],
        parse_slot_row,
    );
    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn find_slot(
    conn: &Connection,
    category: SlotCategory,
    date: NaiveDate,
    time: NaiveTime,
) -> rusqlite::Result<Option<Slot>> {
    let result = conn.query_row(
        "SELECT id, category, slot_date, slot_time, is_reserved, booking_id FROM slots
         WHERE category = ?1 AND slot_date = ?2 AND slot_time = ?3",
        params![
            category.as_str(),
            date.format(DATE_FORMAT).to_string(),
            time.format(TIME_FORMAT).to_string()
        ],
        parse_slot_row,
    );
    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn list_slots(
    conn: &Connection,
    category: SlotCategory,
    date: NaiveDate,
) -> rusqlite::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, slot_date, slot_time, is_reserved, booking_id FROM slots
         WHERE category = ?1 AND slot_date = ?2 ORDER BY slot_time ASC",
    )?;
    let rows = stmt.query_map(
        params![category.as_str(), date.format(DATE_FORMAT).to_string()],
        parse_slot_row,
    )?;
    rows.collect()
}

/// Flips a free slot to reserved for `booking_id`. False if it was already taken.
pub fn reserve_slot(
    conn: &Connection,
    slot_id: i64,
    category: SlotCategory,
    booking_id: i64,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET is_reserved = 1, booking_id = ?1
         WHERE id = ?2 AND category = ?3 AND is_reserved = 0",
        params![booking_id, slot_id, category.as_str()],
    )?;
    Ok(count > 0)
}

/// Frees a slot only while it is still held by `booking_id`.
pub fn release_slot(conn: &Connection, slot_id: i64, booking_id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET is_reserved = 0, booking_id = NULL
         WHERE id = ?1 AND is_reserved = 1 AND booking_id = ?2",
        params![slot_id, booking_id],
    )?;
    Ok(count > 0)
}

// ── Clients ──

pub fn insert_client(
    conn: &Connection,
    client: &Client,
    category: ServiceCategory,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO clients (name, email, phone, category, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![client.name, client.email, client.phone, category.as_str(), now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_client(conn: &Connection, id: i64) -> rusqlite::Result<Option<Client>> {
    let result = conn.query_row(
        "SELECT name, email, phone FROM clients WHERE id = ?1",
        params![id],
        |row| {
            Ok(Client {
                name: row.get(0)?,
                email: row.get(1)?,
                phone: row.get(2)?,
            })
        },
    );
    match result {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn delete_client(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute("DELETE FROM clients WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, client_id, category, resource_id, slot_id, valet_slot_id, \
     valet_included, subtype, pickup_at, dropoff_at, duration_minutes, pickup_location, \
     dropoff_location, total_amount, payment_method, payment_status, status, refund_pending, \
     payment_request_id, payment_id, created_at, updated_at";

fn parse_booking_row(row: &Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        client_id: row.get(1)?,
        category: enum_at(row, 2, ServiceCategory::parse)?,
        resource_id: row.get(3)?,
        slot_id: row.get(4)?,
        valet_slot_id: row.get(5)?,
        valet_included: row.get(6)?,
        subtype: row.get(7)?,
        pickup_at: datetime_at(row, 8)?,
        dropoff_at: opt_datetime_at(row, 9)?,
        duration_minutes: row.get(10)?,
        pickup_location: row.get(11)?,
        dropoff_location: row.get(12)?,
        total_amount: decimal_at(row, 13)?,
        payment_method: enum_at(row, 14, PaymentMethod::parse)?,
        payment_status: enum_at(row, 15, PaymentStatus::parse)?,
        status: enum_at(row, 16, BookingStatus::parse)?,
        refund_pending: row.get(17)?,
        payment_request_id: row.get(18)?,
        payment_id: row.get(19)?,
        created_at: datetime_at(row, 20)?,
        updated_at: datetime_at(row, 21)?,
    })
}

pub fn insert_booking(conn: &Connection, booking: &NewBooking) -> rusqlite::Result<i64> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO bookings (client_id, category, resource_id, slot_id, valet_slot_id, valet_included,
             subtype, pickup_at, dropoff_at, duration_minutes, pickup_location, dropoff_location,
             total_amount, payment_method, payment_status, status, refund_pending, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 'pending', 'pending', 0, ?15, ?15)",
        params![
            booking.client_id,
            booking.category.as_str(),
            booking.resource_id,
            booking.slot_id,
            booking.valet_slot_id,
            booking.valet_included,
            booking.subtype,
            ts(&booking.pickup_at),
            booking.dropoff_at.as_ref().map(ts),
            booking.duration_minutes,
            booking.pickup_location,
            booking.dropoff_location,
            money(booking.total_amount),
            booking.payment_method.as_str(),
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking(conn: &Connection, id: i64) -> rusqlite::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], parse_booking_row);
    match result {
        Ok(b) => Ok(Some(b)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn delete_booking(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Typed filter for the admin booking list.
#[derive(Debug, Default, Clone)]
pub struct BookingFilter {
    pub category: Option<ServiceCategory>,
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub refund_pending: Option<bool>,
}

pub fn list_bookings(
    conn: &Connection,
    filter: &BookingFilter,
    limit: i64,
) -> rusqlite::Result<Vec<Booking>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(category) = filter.category {
        values.push(Box::new(category.as_str()));
        clauses.push(format!("category = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Box::new(status.as_str()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(payment_status) = filter.payment_status {
        values.push(Box::new(payment_status.as_str()));
        clauses.push(format!("payment_status = ?{}", values.len()));
    }
    if let Some(refund_pending) = filter.refund_pending {
        values.push(Box::new(refund_pending));
        clauses.push(format!("refund_pending = ?{}", values.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    values.push(Box::new(limit));
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_sql} ORDER BY id DESC LIMIT ?{}",
        values.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), parse_booking_row)?;
    rows.collect()
}

/// Number of live bookings on the resource whose `[pickup, dropoff)` meets `range`.
pub fn count_overlapping(
    conn: &Connection,
    category: FleetCategory,
    resource_id: i64,
    range: &TimeRange,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE category = ?1 AND resource_id = ?2 AND status != 'cancelled'
           AND dropoff_at IS NOT NULL AND pickup_at < ?4 AND dropoff_at > ?3",
        params![category.as_str(), resource_id, ts(&range.start), ts(&range.end)],
        |row| row.get(0),
    )
}

pub fn overlapping_ranges(
    conn: &Connection,
    category: FleetCategory,
    resource_id: i64,
    range: &TimeRange,
) -> rusqlite::Result<Vec<TimeRange>> {
    let mut stmt = conn.prepare(
        "SELECT pickup_at, dropoff_at FROM bookings
         WHERE category = ?1 AND resource_id = ?2 AND status != 'cancelled'
           AND dropoff_at IS NOT NULL AND pickup_at < ?4 AND dropoff_at > ?3
         ORDER BY pickup_at ASC",
    )?;
    let rows = stmt.query_map(
        params![category.as_str(), resource_id, ts(&range.start), ts(&range.end)],
        |row| Ok((datetime_at(row, 0)?, datetime_at(row, 1)?)),
    )?;

    let mut ranges = Vec::new();
    for row in rows {
        let (start, end) = row?;
        if let Some(r) = TimeRange::new(start, end) {
            ranges.push(r);
        }
    }
    Ok(ranges)
}

/// Records the gateway request created right after the reservation committed.
pub fn set_payment_request(
    conn: &Connection,
    id: i64,
    payment_request_id: &str,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_request_id = ?1, updated_at = ?2
         WHERE id = ?3 AND payment_status = 'pending' AND payment_request_id IS NULL",
        params![payment_request_id, now_ts(), id],
    )?;
    Ok(count > 0)
}

/// pending → completed for the matching gateway request.
pub fn mark_payment_completed(
    conn: &Connection,
    id: i64,
    payment_request_id: &str,
    payment_id: Option<&str>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = 'completed', payment_id = ?1, updated_at = ?2
         WHERE id = ?3 AND payment_request_id = ?4 AND payment_status = 'pending'",
        params![payment_id, now_ts(), id, payment_request_id],
    )?;
    Ok(count > 0)
}

/// pending → failed for the matching gateway request.
pub fn mark_payment_failed(
    conn: &Connection,
    id: i64,
    payment_request_id: &str,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = 'failed', updated_at = ?1
         WHERE id = ?2 AND payment_request_id = ?3 AND payment_status = 'pending'",
        params![now_ts(), id, payment_request_id],
    )?;
    Ok(count > 0)
}

/// pending → completed without a gateway event.
pub fn mark_payment_completed_manually(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = 'completed', updated_at = ?1
         WHERE id = ?2 AND payment_status = 'pending'",
        params![now_ts(), id],
    )?;
    Ok(count > 0)
}

/// Moves a paid booking to confirmed unless it is already completed or cancelled.
pub fn confirm_if_open(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'confirmed', updated_at = ?1
         WHERE id = ?2 AND status NOT IN ('completed', 'cancelled')",
        params![now_ts(), id],
    )?;
    Ok(count > 0)
}

/// Takes the refund lock. False if the booking is not refundable or a refund is in flight.
pub fn claim_refund(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET refund_pending = 1, updated_at = ?1
         WHERE id = ?2 AND payment_status = 'completed' AND refund_pending = 0
           AND status != 'cancelled'",
        params![now_ts(), id],
    )?;
    Ok(count > 0)
}

pub fn release_refund_claim(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET refund_pending = 0, updated_at = ?1
         WHERE id = ?2 AND payment_status = 'completed' AND refund_pending = 1",
        params![now_ts(), id],
    )?;
    Ok(count > 0)
}

/// Finds the booking an inbound refund event refers to.
pub fn find_refund_pending(
    conn: &Connection,
    booking_id: Option<i64>,
    payment_id: Option<&str>,
    payment_request_id: Option<&str>,
) -> rusqlite::Result<Option<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE refund_pending = 1
           AND (id = ?1 OR payment_id = ?2 OR payment_request_id = ?3)
         ORDER BY id ASC LIMIT 1"
    );
    let result = conn.query_row(
        &sql,
        params![booking_id, payment_id, payment_request_id],
        parse_booking_row,
    );
    match result {
        Ok(b) => Ok(Some(b)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// completed + refund lock → refunded, cancelled.
pub fn mark_refunded(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings
         SET payment_status = 'refunded', status = 'cancelled', refund_pending = 0, updated_at = ?1
         WHERE id = ?2 AND payment_status = 'completed' AND refund_pending = 1",
        params![now_ts(), id],
    )?;
    Ok(count > 0)
}

/// failed → pending with a fresh gateway request and amount.
pub fn restart_payment(
    conn: &Connection,
    id: i64,
    payment_request_id: &str,
    amount: Decimal,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings
         SET payment_request_id = ?1, payment_status = 'pending', total_amount = ?2, updated_at = ?3
         WHERE id = ?4 AND payment_status = 'failed' AND status != 'cancelled'",
        params![payment_request_id, money(amount), now_ts(), id],
    )?;
    Ok(count > 0)
}

/// Sets `status` unless the booking is already cancelled or already in that status.
pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    status: BookingStatus,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status != 'cancelled' AND status != ?1",
        params![status.as_str(), now_ts(), id],
    )?;
    Ok(count > 0)
}

/// Amounts counted as collected revenue.
pub fn collected_amounts(conn: &Connection) -> rusqlite::Result<Vec<Decimal>> {
    let mut stmt = conn.prepare(
        "SELECT total_amount FROM bookings WHERE payment_status = 'completed' AND refund_pending = 0",
    )?;
    let rows = stmt.query_map([], |row| decimal_at(row, 0))?;
    rows.collect()
}

// ── Settings ──

pub fn get_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    );
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

// ── Audit ──

pub fn insert_audit(
    conn: &Connection,
    action: &str,
    booking_id: Option<i64>,
    admin_id: Option<i64>,
) -> rusqlite::Result<AuditEntry> {
    let created_at = now_ts();
    conn.execute(
        "INSERT INTO audit_logs (action, booking_id, admin_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![action, booking_id, admin_id, created_at],
    )?;
    Ok(AuditEntry {
        id: conn.last_insert_rowid(),
        action: action.to_string(),
        booking_id,
        admin_id,
        created_at,
    })
}

fn parse_audit_row(row: &Row) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        booking_id: row.get(2)?,
        admin_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn list_audit(
    conn: &Connection,
    booking_id: Option<i64>,
    limit: i64,
) -> rusqlite::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, action, booking_id, admin_id, created_at FROM audit_logs
         WHERE ?1 IS NULL OR booking_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![booking_id, limit], parse_audit_row)?;
    rows.collect()
}

pub fn audit_since(conn: &Connection, last_id: i64) -> rusqlite::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, action, booking_id, admin_id, created_at FROM audit_logs
         WHERE id > ?1 ORDER BY id ASC LIMIT 500",
    )?;
    let rows = stmt.query_map(params![last_id], parse_audit_row)?;
    rows.collect()
}
