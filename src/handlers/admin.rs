use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use rusqlite::TransactionBehavior;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::availability::{parse_date, parse_time};
use crate::models::{
    AuditEntry, Booking, BookingStatus, PaymentStatus, ServiceCategory, SlotCategory,
};
use crate::services::audit::AuditBatch;
use crate::services::cutoff::{self, BookingPolicy};
use crate::services::{reconciliation, revenue};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Checks the bearer token and returns the acting admin's id, if one was sent.
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<Option<i64>, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }

    Ok(headers
        .get("x-admin-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok()))
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub refund_pending: Option<bool>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let filter = BookingFilter {
        category: query
            .category
            .as_deref()
            .map(|c| ServiceCategory::parse(c).ok_or_else(|| AppError::validation("Invalid service category.")))
            .transpose()?,
        status: query
            .status
            .as_deref()
            .map(|s| BookingStatus::parse(s).ok_or_else(|| AppError::validation("Invalid status.")))
            .transpose()?,
        payment_status: query
            .payment_status
            .as_deref()
            .map(|s| {
                PaymentStatus::parse(s).ok_or_else(|| AppError::validation("Invalid payment status."))
            })
            .transpose()?,
        refund_pending: query.refund_pending,
    };

    let db = state.conn()?;
    let bookings = queries::list_bookings(&db, &filter, clamp_limit(query.limit))?;
    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/status
#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Booking>, AppError> {
    let admin_id = check_auth(&headers, &state.config.admin_token)?;
    let status = BookingStatus::parse(&body.status)
        .ok_or_else(|| AppError::validation("Invalid status."))?;

    let booking = reconciliation::update_status(&state, id, status, admin_id).await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/confirm-payment
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    let admin_id = check_auth(&headers, &state.config.admin_token)?;
    let booking = reconciliation::confirm_payment(&state, id, admin_id).await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/refund
pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    let admin_id = check_auth(&headers, &state.config.admin_token)?;
    let booking = reconciliation::refund_payment(&state, id, admin_id).await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/retry-payment
#[derive(Serialize)]
pub struct RetryResponse {
    booking_id: i64,
    payment_url: String,
}

pub async fn retry_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<RetryResponse>, AppError> {
    let admin_id = check_auth(&headers, &state.config.admin_token)?;
    let retried = reconciliation::retry_payment(&state, id, admin_id).await?;
    Ok(Json(RetryResponse {
        booking_id: retried.booking_id,
        payment_url: retried.redirect_url,
    }))
}

// Cut-off flags
#[derive(Serialize)]
pub struct CutoffState {
    category: ServiceCategory,
    cut_off: bool,
}

pub async fn get_cutoffs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<CutoffState>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let policy = {
        let db = state.conn()?;
        BookingPolicy::load(&db)?
    };
    Ok(Json(
        ServiceCategory::ALL
            .into_iter()
            .map(|category| CutoffState {
                category,
                cut_off: !policy.accepts(category),
            })
            .collect(),
    ))
}

pub async fn toggle_cutoff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(category): Path<String>,
) -> Result<Json<CutoffState>, AppError> {
    let admin_id = check_auth(&headers, &state.config.admin_token)?;
    let category = ServiceCategory::parse(&category)
        .ok_or_else(|| AppError::validation("Invalid service category."))?;

    let mut audit = AuditBatch::new();
    let cut_off = {
        let mut db = state.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let cut_off = cutoff::toggle(&tx, category, admin_id, &mut audit)?;
        tx.commit()?;
        cut_off
    };
    audit.publish(&state);

    tracing::info!(category = %category, cut_off, ?admin_id, "cut-off toggled");
    Ok(Json(CutoffState { category, cut_off }))
}

// POST /api/admin/slots
#[derive(Deserialize)]
pub struct CreateSlots {
    pub category: String,
    pub date: String,
    pub times: Vec<String>,
}

#[derive(Serialize)]
pub struct CreateSlotsResponse {
    created: Vec<i64>,
    skipped: Vec<String>,
}

pub async fn create_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSlots>,
) -> Result<Json<CreateSlotsResponse>, AppError> {
    let admin_id = check_auth(&headers, &state.config.admin_token)?;

    let category = SlotCategory::parse(&body.category)
        .ok_or_else(|| AppError::validation("Invalid service category."))?;
    let date = parse_date(&body.date).ok_or_else(|| AppError::validation("Invalid date."))?;
    let times = body
        .times
        .iter()
        .map(|t| parse_time(t).ok_or_else(|| AppError::validation(format!("Invalid time: {t}"))))
        .collect::<Result<Vec<_>, _>>()?;

    let mut created = Vec::new();
    let mut skipped = Vec::new();
    let mut audit = AuditBatch::new();
    {
        let mut db = state.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for time in times {
            match queries::insert_slot(&tx, category, date, time)? {
                Some(id) => created.push(id),
                None => skipped.push(time.format("%H:%M").to_string()),
            }
        }
        let action = format!(
            "Admin created {} {} slots for {}",
            created.len(),
            category.as_str(),
            date
        );
        audit.write(&tx, &action, None, admin_id)?;
        tx.commit()?;
    }
    audit.publish(&state);

    Ok(Json(CreateSlotsResponse { created, skipped }))
}

// GET /api/admin/audit
#[derive(Deserialize)]
pub struct AuditQuery {
    pub booking_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn audit_log(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    let entries = queries::list_audit(&db, query.booking_id, clamp_limit(query.limit))?;
    Ok(Json(entries))
}

// GET /api/admin/revenue
#[derive(Serialize)]
pub struct RevenueResponse {
    total_revenue: Decimal,
    currency: String,
}

pub async fn revenue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RevenueResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let total_revenue = state.revenue.get_or_compute(|| -> Result<Decimal, AppError> {
        let db = state.conn()?;
        Ok(revenue::sum(&queries::collected_amounts(&db)?))
    })?;

    Ok(Json(RevenueResponse {
        total_revenue,
        currency: state.config.currency.clone(),
    }))
}

// GET /api/admin/events
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // EventSource cannot set headers, so the token comes in the query string
    let token = query.token.as_deref().unwrap_or("");
    if state.config.admin_token.is_empty() || token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    let last_id = query.last_id.unwrap_or(0);

    // Subscribe first so nothing committed during catch-up is missed
    let rx = state.audit_tx.subscribe();
    let catchup = {
        let db = state.conn()?;
        queries::audit_since(&db, last_id)?
    };
    let newest = catchup.last().map(|e| e.id).unwrap_or(last_id);

    let catchup_stream = tokio_stream::iter(catchup.into_iter().map(|entry| {
        let data = serde_json::to_string(&entry).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().id(entry.id.to_string()).data(data).event("audit"))
    }));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(entry) if entry.id > newest => {
            let data = serde_json::to_string(&entry).unwrap_or_default();
            Some(Ok(Event::default().id(entry.id.to_string()).data(data).event("audit")))
        }
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => None,
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let combined = catchup_stream.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}
