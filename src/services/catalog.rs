use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    FleetCategory, LimoService, Limousine, ServiceCategory, ServicePackage, SlotCategory, Vehicle,
};

/// A vehicle that can take new bookings.
pub fn vehicle(conn: &Connection, id: i64) -> Result<Vehicle, AppError> {
    match queries::get_vehicle(conn, id)? {
        Some(v) if v.available => Ok(v),
        _ => Err(AppError::validation("Selected car is not available for booking.")),
    }
}

/// Any vehicle, including ones withdrawn since a booking was made.
pub fn vehicle_any(conn: &Connection, id: i64) -> Result<Vehicle, AppError> {
    queries::get_vehicle(conn, id)?.ok_or_else(|| AppError::NotFound(format!("vehicle {id}")))
}

pub fn limousine(conn: &Connection, id: i64) -> Result<Limousine, AppError> {
    match queries::get_limousine(conn, id)? {
        Some(l) if l.available => Ok(l),
        _ => Err(AppError::validation("Selected limousine is not available for booking.")),
    }
}

pub fn limousine_any(conn: &Connection, id: i64) -> Result<Limousine, AppError> {
    queries::get_limousine(conn, id)?.ok_or_else(|| AppError::NotFound(format!("limousine {id}")))
}

pub fn limousine_rate(limousine: &Limousine, service: LimoService) -> Result<Decimal, AppError> {
    limousine.rate_for(service).ok_or_else(|| {
        AppError::validation(format!(
            "{} is not offered for this limousine.",
            service.as_str()
        ))
    })
}

pub fn package(conn: &Connection, category: SlotCategory, id: i64) -> Result<ServicePackage, AppError> {
    match queries::get_package(conn, id)? {
        Some(p) if p.category == category && p.active => Ok(p),
        _ => Err(AppError::validation("Invalid service type.")),
    }
}

pub fn package_any(conn: &Connection, category: SlotCategory, id: i64) -> Result<ServicePackage, AppError> {
    match queries::get_package(conn, id)? {
        Some(p) if p.category == category => Ok(p),
        _ => Err(AppError::NotFound(format!("service package {id}"))),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Listing {
    Packages(Vec<ServicePackage>),
    Vehicles(Vec<Vehicle>),
    Limousines(Vec<Limousine>),
}

/// Bookable resources and their prices for a category.
pub fn listing(conn: &Connection, category: ServiceCategory) -> Result<Listing, AppError> {
    Ok(match category {
        ServiceCategory::Slot(c) => Listing::Packages(queries::list_packages(conn, c)?),
        ServiceCategory::Fleet(FleetCategory::CarRental) => {
            Listing::Vehicles(queries::list_vehicles(conn)?)
        }
        ServiceCategory::Fleet(FleetCategory::Limousine) => {
            Listing::Limousines(queries::list_limousines(conn)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_withdrawn_vehicle_is_not_bookable_but_still_priced() {
        let conn = db::init_db(":memory:").unwrap();
        let id = queries::insert_vehicle(&conn, "Mini Cooper", Decimal::new(9, 0), Decimal::new(120, 0)).unwrap();
        queries::set_vehicle_available(&conn, id, false).unwrap();

        assert!(matches!(vehicle(&conn, id), Err(AppError::Validation(_))));
        assert_eq!(vehicle_any(&conn, id).unwrap().hourly_rate, Decimal::new(9, 0));
    }

    #[test]
    fn test_package_must_match_category() {
        let conn = db::init_db(":memory:").unwrap();
        let id = queries::insert_package(&conn, SlotCategory::Valet, "Event Valet", Decimal::new(80, 0), None).unwrap();

        assert!(package(&conn, SlotCategory::Valet, id).is_ok());
        let err = package(&conn, SlotCategory::CarDetailing, id).unwrap_err();
        assert_eq!(err.to_string(), "Invalid service type.");
    }

    #[test]
    fn test_limousine_rate_lookup() {
        let conn = db::init_db(":memory:").unwrap();
        let id = queries::insert_limousine(&conn, "Mercedes S-Class").unwrap();
        queries::set_limousine_rate(&conn, id, LimoService::Hourly, Decimal::new(120, 0)).unwrap();

        let limo = limousine(&conn, id).unwrap();
        assert_eq!(limousine_rate(&limo, LimoService::Hourly).unwrap(), Decimal::new(120, 0));
        assert!(limousine_rate(&limo, LimoService::Events).is_err());
    }

    #[test]
    fn test_seeded_detailing_listing() {
        let conn = db::init_db(":memory:").unwrap();
        let listing = listing(&conn, ServiceCategory::Slot(SlotCategory::CarDetailing)).unwrap();
        match listing {
            Listing::Packages(p) => {
                let names: Vec<_> = p.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["Basic Wash", "Premium Detail", "Ceramic Coating"]);
            }
            other => panic!("unexpected listing: {other:?}"),
        }
    }
}
