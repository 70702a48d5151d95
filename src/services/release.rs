use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Booking, ServiceCategory};
use crate::services::audit::AuditBatch;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub released_slots: Vec<i64>,
}

/// Frees whatever `booking` holds. Safe to call more than once.
///
/// Slots are released only while still held by this booking, so a slot that was
/// already freed (and possibly re-booked by someone else) is left alone. Fleet
/// bookings hold nothing: the overlap query ignores cancelled rows.
pub fn release(
    conn: &Connection,
    booking: &Booking,
    admin_id: Option<i64>,
    audit: &mut AuditBatch,
) -> rusqlite::Result<ReleaseOutcome> {
    let mut outcome = ReleaseOutcome::default();

    if let Some(slot_id) = booking.slot_id {
        if queries::release_slot(conn, slot_id, booking.id)? {
            audit.write(conn, "Slot released for cancelled booking", Some(booking.id), admin_id)?;
            outcome.released_slots.push(slot_id);
        }
    }

    if let Some(valet_slot_id) = booking.valet_slot_id {
        if queries::release_slot(conn, valet_slot_id, booking.id)? {
            audit.write(
                conn,
                "Valet slot released for cancelled booking",
                Some(booking.id),
                admin_id,
            )?;
            outcome.released_slots.push(valet_slot_id);
        }
    }

    let did_work = match booking.category {
        ServiceCategory::Slot(_) => !outcome.released_slots.is_empty(),
        ServiceCategory::Fleet(_) => true,
    };
    if did_work {
        let action = format!(
            "Resources released for cancelled {} booking",
            booking.category.as_str()
        );
        audit.write(conn, &action, Some(booking.id), admin_id)?;
    }

    tracing::info!(
        booking_id = booking.id,
        released = outcome.released_slots.len(),
        "resources released"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Client, NewBooking, PaymentMethod, SlotCategory};
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    fn servicing_booking(conn: &Connection) -> Booking {
        let date = NaiveDate::from_ymd_opt(2030, 6, 16).unwrap();
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let slot = queries::insert_slot(conn, SlotCategory::CarServicing, date, time)
            .unwrap()
            .unwrap();
        let valet_slot = queries::insert_slot(conn, SlotCategory::Valet, date, time)
            .unwrap()
            .unwrap();

        let category = ServiceCategory::Slot(SlotCategory::CarServicing);
        let client = Client {
            name: "Carol".to_string(),
            email: "carol@example.com".to_string(),
            phone: "+6590000000".to_string(),
        };
        let client_id = queries::insert_client(conn, &client, category).unwrap();
        let id = queries::insert_booking(
            conn,
            &NewBooking {
                client_id,
                category,
                resource_id: 6,
                slot_id: Some(slot),
                valet_slot_id: Some(valet_slot),
                valet_included: true,
                subtype: Some("Basic".to_string()),
                pickup_at: date.and_time(time),
                dropoff_at: None,
                duration_minutes: 0,
                pickup_location: None,
                dropoff_location: None,
                total_amount: Decimal::new(150, 0),
                payment_method: PaymentMethod::Card,
            },
        )
        .unwrap();
        queries::reserve_slot(conn, slot, SlotCategory::CarServicing, id).unwrap();
        queries::reserve_slot(conn, valet_slot, SlotCategory::Valet, id).unwrap();
        queries::get_booking(conn, id).unwrap().unwrap()
    }

    #[test]
    fn test_release_frees_both_slots_once() {
        let conn = db::init_db(":memory:").unwrap();
        let booking = servicing_booking(&conn);

        let mut audit = AuditBatch::new();
        let first = release(&conn, &booking, Some(1), &mut audit).unwrap();
        assert_eq!(first.released_slots, booking.held_slots());
        assert_eq!(audit.entries().len(), 3);

        let mut again = AuditBatch::new();
        let second = release(&conn, &booking, Some(1), &mut again).unwrap();
        assert!(second.released_slots.is_empty());
        assert!(again.entries().is_empty());

        for slot_id in booking.held_slots() {
            let slot = queries::get_slot(&conn, slot_id).unwrap().unwrap();
            assert!(!slot.is_reserved);
            assert_eq!(slot.booking_id, None);
        }
    }

    #[test]
    fn test_release_leaves_slot_rebooked_by_someone_else() {
        let conn = db::init_db(":memory:").unwrap();
        let booking = servicing_booking(&conn);
        let slot_id = booking.slot_id.unwrap();

        release(&conn, &booking, None, &mut AuditBatch::new()).unwrap();
        assert!(queries::reserve_slot(&conn, slot_id, SlotCategory::CarServicing, booking.id + 100).unwrap());

        release(&conn, &booking, None, &mut AuditBatch::new()).unwrap();
        let slot = queries::get_slot(&conn, slot_id).unwrap().unwrap();
        assert!(slot.is_reserved);
        assert_eq!(slot.booking_id, Some(booking.id + 100));
    }
}
