use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::availability::{parse_date, parse_datetime};
use crate::models::{FleetCategory, RentalMode, ServiceCategory, Slot, TimeRange};
use crate::services::availability;
use crate::services::catalog::{self, Listing};
use crate::state::AppState;

fn category(s: Option<&str>) -> Result<ServiceCategory, AppError> {
    s.and_then(ServiceCategory::parse)
        .ok_or_else(|| AppError::validation("Invalid service category."))
}

fn fleet_category(s: Option<&str>) -> Result<FleetCategory, AppError> {
    match category(s)? {
        ServiceCategory::Fleet(c) => Ok(c),
        ServiceCategory::Slot(_) => Err(AppError::validation("Invalid service category.")),
    }
}

fn resource_id(s: Option<&str>) -> Result<i64, AppError> {
    s.and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| AppError::validation("All fields are required."))
}

// GET /api/availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub category: Option<String>,
    pub resource_id: Option<String>,
    pub date: Option<String>,
    pub mode: Option<String>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    unavailable: Vec<String>,
    ranges: Vec<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slots: Option<Vec<Slot>>,
}

pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let category = category(query.category.as_deref())?;
    let date = query
        .date
        .as_deref()
        .and_then(parse_date)
        .ok_or_else(|| AppError::validation("Invalid date."))?;

    let db = state.conn()?;
    let response = match category {
        ServiceCategory::Slot(slot_category) => AvailabilityResponse {
            unavailable: availability::unavailable_slot_times(&db, slot_category, date)?,
            ranges: Vec::new(),
            slots: Some(crate::db::queries::list_slots(&db, slot_category, date)?),
        },
        ServiceCategory::Fleet(fleet_category) => {
            let resource_id = resource_id(query.resource_id.as_deref())?;
            let mode = match query.mode.as_deref() {
                None | Some("") => RentalMode::Hourly,
                Some(m) => RentalMode::parse(m)
                    .ok_or_else(|| AppError::validation("Invalid rental type."))?,
            };
            let ranges =
                availability::unavailable_ranges(&db, fleet_category, resource_id, date, mode)?;
            AvailabilityResponse {
                unavailable: availability::unavailable_labels(date, &ranges),
                ranges,
                slots: None,
            }
        }
    };

    Ok(Json(response))
}

// GET /api/overlap
#[derive(Deserialize)]
pub struct OverlapQuery {
    pub category: Option<String>,
    pub resource_id: Option<String>,
    pub pickup: Option<String>,
    pub dropoff: Option<String>,
}

#[derive(Serialize)]
pub struct OverlapResponse {
    has_overlap: bool,
}

pub async fn check_overlap(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OverlapQuery>,
) -> Result<Json<OverlapResponse>, AppError> {
    let category = fleet_category(query.category.as_deref())?;
    let resource_id = resource_id(query.resource_id.as_deref())?;

    let (Some(pickup), Some(dropoff)) = (
        query.pickup.as_deref().and_then(parse_datetime),
        query.dropoff.as_deref().and_then(parse_datetime),
    ) else {
        return Err(AppError::validation("Invalid date or time."));
    };
    let range = TimeRange::new(pickup, dropoff).ok_or_else(|| {
        AppError::validation("Drop-off date and time must be after the pickup date and time.")
    })?;

    let db = state.conn()?;
    let has_overlap = availability::has_overlap(&db, category, resource_id, &range)?;
    Ok(Json(OverlapResponse { has_overlap }))
}

// GET /api/catalog/:category
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Path(category_name): Path<String>,
) -> Result<Json<Listing>, AppError> {
    let category = category(Some(&category_name))?;
    let db = state.conn()?;
    Ok(Json(catalog::listing(&db, category)?))
}
