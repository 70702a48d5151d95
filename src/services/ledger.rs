use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{FleetCategory, NewBooking, RentalMode, ServiceCategory, SlotCategory};
use crate::services::audit::{self, AuditBatch};
use crate::services::availability;
use crate::services::catalog;
use crate::services::cutoff::BookingPolicy;
use crate::services::gateway::PaymentRequest;
use crate::services::intake::{BookingRequest, BookingTarget};
use crate::services::pricing::{self, Quote};
use crate::state::AppState;

pub const SLOT_TAKEN: &str = "Selected slot is no longer available.";
pub const CAR_TAKEN: &str = "The selected car is not available during the chosen period.";
pub const LIMOUSINE_TAKEN: &str = "This limousine is not available for the selected date and time.";

/// A committed reservation still waiting for its payment request.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub booking_id: i64,
    pub client_id: i64,
    pub category: ServiceCategory,
    pub amount: Decimal,
    pub held_slots: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub booking_id: i64,
    pub redirect_url: String,
    pub payment_request_id: String,
}

/// Everything about the booking row except the client, resolved against the catalog.
struct Draft {
    quote: Quote,
    resource_id: i64,
    holds: Vec<(i64, SlotCategory)>,
    booking: NewBooking,
}

fn draft(
    conn: &Connection,
    request: &BookingRequest,
    now: NaiveDateTime,
) -> Result<Draft, AppError> {
    let category = request.category();
    let mut booking = NewBooking {
        client_id: 0,
        category,
        resource_id: 0,
        slot_id: None,
        valet_slot_id: None,
        valet_included: false,
        subtype: None,
        pickup_at: now,
        dropoff_at: None,
        duration_minutes: 0,
        pickup_location: None,
        dropoff_location: None,
        total_amount: Decimal::ZERO,
        payment_method: request.payment_method,
    };

    let (quote, resource_id, holds) = match &request.target {
        BookingTarget::Slot {
            category: slot_category,
            package_id,
            slot_id,
            valet_included,
            valet_slot_id,
        } => {
            let package = catalog::package(conn, *slot_category, *package_id)?;
            let slot = queries::get_slot(conn, *slot_id)?
                .filter(|s| s.category == *slot_category)
                .ok_or_else(|| AppError::validation("Invalid time slot."))?;
            if slot.is_reserved {
                return Err(AppError::conflict(SLOT_TAKEN));
            }
            let starts_at = slot.date.and_time(slot.time);
            if starts_at <= now {
                return Err(AppError::validation("Pickup date and time must be in the future."));
            }

            let mut holds = vec![(slot.id, *slot_category)];
            if let Some(valet_slot_id) = valet_slot_id {
                let valet = queries::get_slot(conn, *valet_slot_id)?
                    .filter(|s| s.category == SlotCategory::Valet)
                    .ok_or_else(|| AppError::validation("Invalid valet time slot."))?;
                if valet.is_reserved {
                    return Err(AppError::conflict("Selected valet slot is no longer available."));
                }
                holds.push((valet.id, SlotCategory::Valet));
            }

            booking.slot_id = Some(slot.id);
            booking.valet_slot_id = *valet_slot_id;
            booking.valet_included = *valet_included;
            booking.subtype = Some(package.name.clone());
            booking.pickup_at = starts_at;
            (pricing::package_quote(&package, *valet_included), package.id, holds)
        }
        BookingTarget::Rental {
            vehicle_id,
            mode,
            range,
        } => {
            let vehicle = catalog::vehicle(conn, *vehicle_id)?;
            if availability::has_overlap(conn, FleetCategory::CarRental, vehicle.id, range)? {
                return Err(AppError::conflict(CAR_TAKEN));
            }

            booking.subtype = Some(mode.as_str().to_string());
            booking.pickup_at = range.start;
            booking.dropoff_at = Some(range.end);
            booking.duration_minutes = range.duration_minutes();
            let quote = match mode {
                RentalMode::Hourly => Quote::HourlyRental {
                    hourly_rate: vehicle.hourly_rate,
                    minutes: range.duration_minutes(),
                },
                RentalMode::Daily => Quote::DailyRental {
                    daily_rate: vehicle.daily_rate,
                    minutes: range.duration_minutes(),
                },
            };
            (quote, vehicle.id, Vec::new())
        }
        BookingTarget::Limousine {
            limousine_id,
            service,
            range,
            hours,
            pickup_location,
            dropoff_location,
        } => {
            let limousine = catalog::limousine(conn, *limousine_id)?;
            let rate = catalog::limousine_rate(&limousine, *service)?;
            if availability::has_overlap(conn, FleetCategory::Limousine, limousine.id, range)? {
                return Err(AppError::conflict(LIMOUSINE_TAKEN));
            }

            booking.subtype = Some(service.as_str().to_string());
            booking.pickup_at = range.start;
            booking.dropoff_at = Some(range.end);
            booking.duration_minutes = range.duration_minutes();
            booking.pickup_location = Some(pickup_location.clone());
            booking.dropoff_location = Some(dropoff_location.clone());
            let quote = if service.is_hourly() {
                Quote::LimousineHourly { rate, hours: *hours }
            } else {
                Quote::LimousineFlat { rate }
            };
            (quote, limousine.id, Vec::new())
        }
    };

    booking.resource_id = resource_id;
    Ok(Draft {
        quote,
        resource_id,
        holds,
        booking,
    })
}

/// Reserves the requested resource and writes the pending booking in one IMMEDIATE transaction.
///
/// The write lock is taken up front, so the availability re-check and the reservation
/// see the same committed state. Any error rolls the whole unit back.
pub fn reserve(
    conn: &mut Connection,
    request: &BookingRequest,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> Result<Reservation, AppError> {
    let category = request.category();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut draft = draft(&tx, request, now)?;

    let expected = pricing::expected_amount(&draft.quote)?;
    if let Err(e) = pricing::validate(expected, request.submitted_amount) {
        tracing::warn!(
            category = %category,
            resource_id = draft.resource_id,
            expected = %expected,
            submitted = %request.submitted_amount,
            "submitted amount does not match catalog price"
        );
        return Err(e);
    }

    let client_id = queries::insert_client(&tx, &request.client, category)?;
    draft.booking.client_id = client_id;
    draft.booking.total_amount = expected;
    let booking_id = queries::insert_booking(&tx, &draft.booking)?;

    for (slot_id, slot_category) in &draft.holds {
        if !queries::reserve_slot(&tx, *slot_id, *slot_category, booking_id)? {
            return Err(AppError::conflict(SLOT_TAKEN));
        }
    }

    // Checked last so a cut-off never leaves a half-reserved booking behind
    if !policy.accepts(category) {
        return Err(AppError::ServiceUnavailable(format!(
            "{} service is currently unavailable.",
            category.display_name()
        )));
    }

    tx.commit()?;

    Ok(Reservation {
        booking_id,
        client_id,
        category,
        amount: expected,
        held_slots: draft.holds.into_iter().map(|(id, _)| id).collect(),
    })
}

/// Undoes a reservation whose payment request could not be created.
pub fn abandon(conn: &mut Connection, reservation: &Reservation) -> Result<AuditBatch, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for slot_id in &reservation.held_slots {
        queries::release_slot(&tx, *slot_id, reservation.booking_id)?;
    }
    queries::delete_booking(&tx, reservation.booking_id)?;
    queries::delete_client(&tx, reservation.client_id)?;

    let mut audit = AuditBatch::new();
    let action = format!(
        "Payment setup failed, {} reservation rolled back",
        reservation.category.as_str()
    );
    // The booking row is gone, so the entry is not linked to it
    audit.write(&tx, &action, None, None)?;
    tx.commit()?;
    Ok(audit)
}

/// Reserves, then opens a payment request with the gateway.
///
/// Gateway failure runs [`abandon`] so no resource stays held by a booking the
/// customer can never pay for.
pub async fn create_booking(
    state: &Arc<AppState>,
    request: BookingRequest,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> Result<CreatedBooking, AppError> {
    let reservation = {
        let mut db = state.conn()?;
        reserve(&mut db, &request, policy, now)?
    };
    let booking_id = reservation.booking_id;
    tracing::info!(
        booking_id,
        category = %reservation.category,
        amount = %reservation.amount,
        "reservation committed"
    );

    let payment = PaymentRequest {
        amount: reservation.amount,
        currency: state.config.currency.clone(),
        reference_number: booking_id.to_string(),
        redirect_url: state.config.redirect_url(booking_id),
        webhook_url: state.config.webhook_url(),
        payment_method: request.payment_method,
        name: request.client.name.clone(),
        email: request.client.email.clone(),
        purpose: format!("{} booking #{booking_id}", reservation.category.display_name()),
    };

    let created = match state.gateway.create_payment_request(&payment).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(booking_id, error = %e, "payment request failed, rolling back reservation");
            let rollback = state
                .conn()
                .and_then(|mut db| abandon(&mut db, &reservation));
            match rollback {
                Ok(audit) => audit.publish(state),
                Err(rollback_err) => {
                    tracing::error!(booking_id, error = %rollback_err, "failed to roll back reservation");
                    // The hold stays on a pending booking with no payment request
                    let action = format!(
                        "Payment setup failed and rollback failed, {} reservation still held",
                        reservation.category.as_str()
                    );
                    audit::record(state, &action, Some(booking_id), None);
                }
            }
            return Err(AppError::Gateway(
                "Unable to set up payment, please try again.".to_string(),
            ));
        }
    };

    let mut audit = AuditBatch::new();
    {
        let db = state.conn()?;
        if !queries::set_payment_request(&db, booking_id, &created.id)? {
            return Err(AppError::Internal(format!(
                "booking {booking_id} changed before its payment request was stored"
            )));
        }
        audit.write(&db, "Booking created, awaiting payment", Some(booking_id), None)?;
    }
    audit.publish(state);

    tracing::info!(booking_id, payment_request_id = %created.id, "payment request attached");

    Ok(CreatedBooking {
        booking_id,
        redirect_url: created.url,
        payment_request_id: created.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::models::{BookingStatus, Client, LimoService, PaymentMethod, PaymentStatus, TimeRange};
    use crate::services::gateway::{CreatedPaymentRequest, PaymentGateway, RefundResult};
    use crate::services::notify::LogNotifier;
    use crate::services::release;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Mutex;
    use std::time::Duration;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn now() -> NaiveDateTime {
        dt("2030-06-01 12:00")
    }

    fn client() -> Client {
        Client {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: "+6591234567".to_string(),
        }
    }

    fn rental(vehicle_id: i64, pickup: &str, dropoff: &str, amount: Decimal) -> BookingRequest {
        BookingRequest {
            client: client(),
            payment_method: PaymentMethod::Card,
            submitted_amount: amount,
            target: BookingTarget::Rental {
                vehicle_id,
                mode: RentalMode::Hourly,
                range: TimeRange::new(dt(pickup), dt(dropoff)).unwrap(),
            },
        }
    }

    fn detailing(slot_id: i64) -> BookingRequest {
        BookingRequest {
            client: client(),
            payment_method: PaymentMethod::Paynow,
            submitted_amount: Decimal::new(4999, 2),
            target: BookingTarget::Slot {
                category: SlotCategory::CarDetailing,
                package_id: 1,
                slot_id,
                valet_included: false,
                valet_slot_id: None,
            },
        }
    }

    fn setup() -> (Connection, i64) {
        let conn = db::init_db(":memory:").unwrap();
        let vehicle =
            queries::insert_vehicle(&conn, "Toyota Corolla", Decimal::new(10, 0), Decimal::new(150, 0))
                .unwrap();
        (conn, vehicle)
    }

    fn detailing_slot(conn: &Connection) -> i64 {
        let date = NaiveDate::from_ymd_opt(2030, 6, 16).unwrap();
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        queries::insert_slot(conn, SlotCategory::CarDetailing, date, time)
            .unwrap()
            .unwrap()
    }

    fn limousine(limousine_id: i64, service: LimoService, pickup: &str, dropoff: &str, hours: u32, amount: Decimal) -> BookingRequest {
        BookingRequest {
            client: client(),
            payment_method: PaymentMethod::Card,
            submitted_amount: amount,
            target: BookingTarget::Limousine {
                limousine_id,
                service,
                range: TimeRange::new(dt(pickup), dt(dropoff)).unwrap(),
                hours,
                pickup_location: "Changi Airport T3".to_string(),
                dropoff_location: "Marina Bay Sands".to_string(),
            },
        }
    }

    /// Package 6 is "Basic" servicing at 100.00 with a 50.00 valet add-on.
    fn servicing_with_valet(slot_id: i64, valet_slot_id: i64) -> BookingRequest {
        BookingRequest {
            client: client(),
            payment_method: PaymentMethod::Card,
            submitted_amount: Decimal::new(15000, 2),
            target: BookingTarget::Slot {
                category: SlotCategory::CarServicing,
                package_id: 6,
                slot_id,
                valet_included: true,
                valet_slot_id: Some(valet_slot_id),
            },
        }
    }

    fn slot_at(conn: &Connection, category: SlotCategory, hour: u32) -> i64 {
        let date = NaiveDate::from_ymd_opt(2030, 6, 16).unwrap();
        let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap();
        queries::insert_slot(conn, category, date, time).unwrap().unwrap()
    }

    fn booking_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM bookings", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_reserve_rental_stores_catalog_price() {
        let (mut conn, vehicle) = setup();
        let request = rental(vehicle, "2030-06-16 10:00", "2030-06-16 13:00", Decimal::new(3000, 2));
        let reservation = reserve(&mut conn, &request, &BookingPolicy::default(), now()).unwrap();

        let booking = queries::get_booking(&conn, reservation.booking_id).unwrap().unwrap();
        assert_eq!(booking.total_amount, Decimal::new(3000, 2));
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.subtype.as_deref(), Some("hourly"));
        assert_eq!(booking.duration_minutes, 180);
    }

    #[test]
    fn test_reserve_rejects_tampered_amount() {
        let (mut conn, vehicle) = setup();
        let request = rental(vehicle, "2030-06-16 10:00", "2030-06-16 13:00", Decimal::new(3002, 2));
        let err = reserve(&mut conn, &request, &BookingPolicy::default(), now()).unwrap_err();
        assert!(matches!(err, AppError::PricingMismatch { .. }));
        assert_eq!(booking_count(&conn), 0);
    }

    #[test]
    fn test_overlapping_rental_rejected_back_to_back_allowed() {
        let (mut conn, vehicle) = setup();
        let policy = BookingPolicy::default();
        let first = rental(vehicle, "2030-06-16 10:00", "2030-06-16 13:00", Decimal::new(3000, 2));
        reserve(&mut conn, &first, &policy, now()).unwrap();

        let overlapping = rental(vehicle, "2030-06-16 12:00", "2030-06-16 14:00", Decimal::new(2000, 2));
        let err = reserve(&mut conn, &overlapping, &policy, now()).unwrap_err();
        assert_eq!(err.to_string(), CAR_TAKEN);

        let adjacent = rental(vehicle, "2030-06-16 13:00", "2030-06-16 15:00", Decimal::new(2000, 2));
        assert!(reserve(&mut conn, &adjacent, &policy, now()).is_ok());
    }

    #[test]
    fn test_cutoff_rolls_back_everything() {
        let (mut conn, _) = setup();
        let slot = detailing_slot(&conn);
        let policy = BookingPolicy::default()
            .with_cutoff(ServiceCategory::Slot(SlotCategory::CarDetailing));

        let err = reserve(&mut conn, &detailing(slot), &policy, now()).unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
        assert_eq!(err.to_string(), "Car detailing service is currently unavailable.");

        assert_eq!(booking_count(&conn), 0);
        let clients: i64 = conn.query_row("SELECT COUNT(*) FROM clients", [], |r| r.get(0)).unwrap();
        assert_eq!(clients, 0);
        assert!(!queries::get_slot(&conn, slot).unwrap().unwrap().is_reserved);
    }

    #[test]
    fn test_slot_reserved_once() {
        let (mut conn, _) = setup();
        let slot = detailing_slot(&conn);
        let policy = BookingPolicy::default();

        let reservation = reserve(&mut conn, &detailing(slot), &policy, now()).unwrap();
        assert_eq!(reservation.held_slots, vec![slot]);
        let stored = queries::get_slot(&conn, slot).unwrap().unwrap();
        assert!(stored.is_reserved);
        assert_eq!(stored.booking_id, Some(reservation.booking_id));

        let err = reserve(&mut conn, &detailing(slot), &policy, now()).unwrap_err();
        assert_eq!(err.to_string(), SLOT_TAKEN);
    }

    #[test]
    fn test_abandon_releases_and_deletes() {
        let (mut conn, _) = setup();
        let slot = detailing_slot(&conn);
        let reservation = reserve(&mut conn, &detailing(slot), &BookingPolicy::default(), now()).unwrap();

        let audit = abandon(&mut conn, &reservation).unwrap();
        assert_eq!(audit.entries().len(), 1);
        assert_eq!(audit.entries()[0].booking_id, None);
        assert_eq!(booking_count(&conn), 0);
        assert!(!queries::get_slot(&conn, slot).unwrap().unwrap().is_reserved);

        // The slot can be booked again
        assert!(reserve(&mut conn, &detailing(slot), &BookingPolicy::default(), now()).is_ok());
    }

    #[test]
    fn test_concurrent_slot_reservations_on_shared_connection() {
        let (conn, _) = setup();
        let slot = detailing_slot(&conn);
        let shared = Arc::new(Mutex::new(conn));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let mut db = shared.lock().unwrap();
                    reserve(&mut db, &detailing(slot), &BookingPolicy::default(), now())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert_eq!(err.to_string(), SLOT_TAKEN);
        }
    }

    #[test]
    fn test_concurrent_rentals_across_connections() {
        let path = std::env::temp_dir().join(format!("slotbook-{}.db", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();
        let vehicle = {
            let conn = db::open_db(&path, Duration::from_secs(10)).unwrap();
            queries::insert_vehicle(&conn, "Honda Civic", Decimal::new(10, 0), Decimal::new(150, 0)).unwrap()
        };

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut conn = db::open_db(&path, Duration::from_secs(10)).unwrap();
                    let request =
                        rental(vehicle, "2030-06-16 10:00", "2030-06-16 13:00", Decimal::new(3000, 2));
                    reserve(&mut conn, &request, &BookingPolicy::default(), now())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert_eq!(err.to_string(), CAR_TAKEN);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_limousine_overlap_rejected_back_to_back_allowed() {
        let (mut conn, _) = setup();
        let limo = queries::insert_limousine(&conn, "Mercedes S-Class").unwrap();
        queries::set_limousine_rate(&conn, limo, LimoService::Hourly, Decimal::new(120, 0)).unwrap();
        queries::set_limousine_rate(&conn, limo, LimoService::PointToPoint, Decimal::new(80, 0)).unwrap();
        let policy = BookingPolicy::default();

        let hourly = limousine(limo, LimoService::Hourly, "2030-06-16 10:00", "2030-06-16 13:00", 3, Decimal::new(36000, 2));
        let first = reserve(&mut conn, &hourly, &policy, now()).unwrap();
        assert_eq!(first.amount, Decimal::new(36000, 2));
        let stored = queries::get_booking(&conn, first.booking_id).unwrap().unwrap();
        assert_eq!(stored.subtype.as_deref(), Some("Hourly"));
        assert_eq!(stored.pickup_location.as_deref(), Some("Changi Airport T3"));

        let clash = limousine(limo, LimoService::PointToPoint, "2030-06-16 12:00", "2030-06-16 14:00", 2, Decimal::new(80, 0));
        let err = reserve(&mut conn, &clash, &policy, now()).unwrap_err();
        assert_eq!(err.to_string(), LIMOUSINE_TAKEN);

        let adjacent = limousine(limo, LimoService::PointToPoint, "2030-06-16 13:00", "2030-06-16 15:00", 2, Decimal::new(80, 0));
        let second = reserve(&mut conn, &adjacent, &policy, now()).unwrap();
        assert_eq!(second.amount, Decimal::new(8000, 2));
        assert_eq!(booking_count(&conn), 2);
    }

    #[test]
    fn test_servicing_with_valet_holds_both_slots() {
        let (mut conn, _) = setup();
        let servicing = slot_at(&conn, SlotCategory::CarServicing, 10);
        let later_servicing = slot_at(&conn, SlotCategory::CarServicing, 11);
        let valet = slot_at(&conn, SlotCategory::Valet, 10);
        let policy = BookingPolicy::default();

        let reservation = reserve(&mut conn, &servicing_with_valet(servicing, valet), &policy, now()).unwrap();
        assert_eq!(reservation.amount, Decimal::new(15000, 2));
        assert_eq!(reservation.held_slots, vec![servicing, valet]);
        for slot in [servicing, valet] {
            let stored = queries::get_slot(&conn, slot).unwrap().unwrap();
            assert!(stored.is_reserved);
            assert_eq!(stored.booking_id, Some(reservation.booking_id));
        }

        let err = reserve(&mut conn, &servicing_with_valet(later_servicing, valet), &policy, now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Selected valet slot is no longer available.");
        assert!(!queries::get_slot(&conn, later_servicing).unwrap().unwrap().is_reserved);

        let booking = queries::get_booking(&conn, reservation.booking_id).unwrap().unwrap();
        assert!(booking.valet_included);
        let mut audit = AuditBatch::new();
        let outcome = release::release(&conn, &booking, None, &mut audit).unwrap();
        assert_eq!(outcome.released_slots, vec![servicing, valet]);
        assert!(!queries::get_slot(&conn, servicing).unwrap().unwrap().is_reserved);
        assert!(!queries::get_slot(&conn, valet).unwrap().unwrap().is_reserved);
    }

    struct DownGateway;

    #[async_trait]
    impl PaymentGateway for DownGateway {
        async fn create_payment_request(
            &self,
            _request: &PaymentRequest,
        ) -> anyhow::Result<CreatedPaymentRequest> {
            anyhow::bail!("connection reset")
        }

        async fn refund(&self, _payment_id: &str, _amount: Decimal) -> anyhow::Result<RefundResult> {
            anyhow::bail!("connection reset")
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_leaves_audited_hold() {
        let (conn, _) = setup();
        let slot = detailing_slot(&conn);
        conn.execute_batch(
            "CREATE TRIGGER keep_bookings BEFORE DELETE ON bookings
             BEGIN SELECT RAISE(ABORT, 'bookings are locked'); END;",
        )
        .unwrap();
        let state = Arc::new(AppState::new(
            conn,
            AppConfig::from_env(),
            Box::new(DownGateway),
            Box::new(LogNotifier),
        ));

        let err = create_booking(&state, detailing(slot), &BookingPolicy::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Gateway(_)));

        let db = state.conn().unwrap();
        let booking_id: i64 = db.query_row("SELECT id FROM bookings", [], |r| r.get(0)).unwrap();
        let stored = queries::get_slot(&db, slot).unwrap().unwrap();
        assert!(stored.is_reserved);
        assert_eq!(stored.booking_id, Some(booking_id));

        let entries = queries::list_audit(&db, Some(booking_id), 10).unwrap();
        assert!(entries.iter().any(|e| e.action
            == "Payment setup failed and rollback failed, car_detailing reservation still held"));
    }
}
