use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingStatus, PaymentStatus, ServiceCategory};
use crate::services::cutoff::BookingPolicy;
use crate::services::intake::BookingForm;
use crate::services::ledger;
use crate::state::AppState;

// POST /api/bookings
#[derive(Serialize)]
pub struct BookingResponse {
    booking_id: i64,
    redirect_url: String,
}

pub async fn submit_booking(
    State(state): State<Arc<AppState>>,
    Json(form): Json<BookingForm>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let now = state.config.local_now();
    let request = form.into_request(now)?;

    let policy = {
        let db = state.conn()?;
        BookingPolicy::load(&db)?
    };

    let created = ledger::create_booking(&state, request, &policy, now).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            booking_id: created.booking_id,
            redirect_url: created.redirect_url,
        }),
    ))
}

// GET /api/bookings/:id
#[derive(Serialize)]
pub struct BookingSummary {
    booking_id: i64,
    category: ServiceCategory,
    service: &'static str,
    subtype: Option<String>,
    pickup_at: NaiveDateTime,
    dropoff_at: Option<NaiveDateTime>,
    total_amount: Decimal,
    payment_status: PaymentStatus,
    status: BookingStatus,
}

pub async fn get_booking_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookingSummary>, AppError> {
    let booking = {
        let db = state.conn()?;
        queries::get_booking(&db, id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    Ok(Json(BookingSummary {
        booking_id: booking.id,
        category: booking.category,
        service: booking.category.display_name(),
        subtype: booking.subtype,
        pickup_at: booking.pickup_at,
        dropoff_at: booking.dropoff_at,
        total_amount: booking.total_amount,
        payment_status: booking.payment_status,
        status: booking.status,
    }))
}
