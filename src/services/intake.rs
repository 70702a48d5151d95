use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::availability::{is_on_grid, parse_date, parse_time, window_close, window_open};
use crate::models::{
    Client, FleetCategory, LimoService, PaymentMethod, RentalMode, ServiceCategory, SlotCategory,
    TimeRange,
};
use crate::services::pricing::MIN_HOURLY_MINUTES;

const ALL_FIELDS_REQUIRED: &str = "All fields are required.";
const MAX_LIMOUSINE_HOURS: u32 = 12;

/// Accepts strings, numbers and booleans so HTML forms and JSON clients both work.
pub(crate) fn lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Raw booking submission. Checked by [`BookingForm::into_request`] before any
/// storage is touched; its messages are shown to the customer verbatim.
#[derive(Debug, Default, Deserialize)]
pub struct BookingForm {
    #[serde(default, deserialize_with = "lenient")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_amount: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub service_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub slot_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub valet_included: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub valet_slot_id: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub resource_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub rental_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub service_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub hours: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub pickup_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub pickup_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub dropoff_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub dropoff_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub pickup_location: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub dropoff_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub client: Client,
    pub payment_method: PaymentMethod,
    pub submitted_amount: Decimal,
    pub target: BookingTarget,
}

#[derive(Debug, Clone)]
pub enum BookingTarget {
    Slot {
        category: SlotCategory,
        package_id: i64,
        slot_id: i64,
        valet_included: bool,
        valet_slot_id: Option<i64>,
    },
    Rental {
        vehicle_id: i64,
        mode: RentalMode,
        range: TimeRange,
    },
    Limousine {
        limousine_id: i64,
        service: LimoService,
        range: TimeRange,
        hours: u32,
        pickup_location: String,
        dropoff_location: String,
    },
}

impl BookingRequest {
    pub fn category(&self) -> ServiceCategory {
        match &self.target {
            BookingTarget::Slot { category, .. } => ServiceCategory::Slot(*category),
            BookingTarget::Rental { .. } => ServiceCategory::Fleet(FleetCategory::CarRental),
            BookingTarget::Limousine { .. } => ServiceCategory::Fleet(FleetCategory::Limousine),
        }
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(field: &'a Option<String>) -> Result<&'a str, AppError> {
    present(field).ok_or_else(|| AppError::validation(ALL_FIELDS_REQUIRED))
}

fn parse_id(s: &str) -> Result<i64, AppError> {
    s.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::validation("Invalid booking details."))
}

fn parse_flag(field: &Option<String>) -> bool {
    matches!(present(field), Some("1" | "true" | "on" | "yes"))
}

pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

fn date_time(date: &str, time: &str) -> Result<(NaiveDateTime, NaiveTime), AppError> {
    match (parse_date(date), parse_time(time)) {
        (Some(d), Some(t)) => Ok((d.and_time(t), t)),
        _ => Err(AppError::validation("Invalid date or time.")),
    }
}

impl BookingForm {
    pub fn into_request(self, now: NaiveDateTime) -> Result<BookingRequest, AppError> {
        let category = ServiceCategory::parse(required(&self.category)?)
            .ok_or_else(|| AppError::validation("Invalid service category."))?;

        let name = required(&self.name)?;
        let email = required(&self.email)?;
        let phone = required(&self.phone)?;
        let method = required(&self.payment_method)?;
        let amount = required(&self.total_amount)?;
        self.require_category_fields(category)?;

        if !is_valid_email(email) {
            return Err(AppError::validation("Invalid email address."));
        }
        let payment_method = PaymentMethod::parse(method)
            .ok_or_else(|| AppError::validation("Invalid payment method."))?;
        let submitted_amount = amount
            .parse::<Decimal>()
            .ok()
            .filter(|a| *a > Decimal::ZERO)
            .ok_or_else(|| AppError::validation("Invalid total amount."))?;

        let target = match category {
            ServiceCategory::Slot(c) => self.slot_target(c)?,
            ServiceCategory::Fleet(FleetCategory::CarRental) => self.rental_target(now)?,
            ServiceCategory::Fleet(FleetCategory::Limousine) => self.limousine_target(now)?,
        };

        Ok(BookingRequest {
            client: Client {
                name: name.to_string(),
                email: email.to_string(),
                phone: phone.to_string(),
            },
            payment_method,
            submitted_amount,
            target,
        })
    }

    fn require_category_fields(&self, category: ServiceCategory) -> Result<(), AppError> {
        let fields: Vec<&Option<String>> = match category {
            ServiceCategory::Slot(_) => vec![&self.service_id, &self.slot_id],
            ServiceCategory::Fleet(FleetCategory::CarRental) => vec![
                &self.resource_id,
                &self.rental_type,
                &self.pickup_date,
                &self.pickup_time,
                &self.dropoff_date,
                &self.dropoff_time,
            ],
            ServiceCategory::Fleet(FleetCategory::Limousine) => vec![
                &self.resource_id,
                &self.service_type,
                &self.pickup_date,
                &self.pickup_time,
                &self.pickup_location,
                &self.dropoff_location,
            ],
        };
        for field in fields {
            required(field)?;
        }
        Ok(())
    }

    fn slot_target(&self, category: SlotCategory) -> Result<BookingTarget, AppError> {
        let package_id = parse_id(required(&self.service_id)?)?;
        let slot_id = parse_id(required(&self.slot_id)?)?;
        let valet_included = parse_flag(&self.valet_included);
        let valet_slot_id = present(&self.valet_slot_id).map(parse_id).transpose()?;

        if valet_included && category != SlotCategory::CarServicing {
            return Err(AppError::validation(
                "The valet add-on is only available with car servicing.",
            ));
        }
        if valet_slot_id.is_some() && !valet_included {
            return Err(AppError::validation("A valet slot requires the valet add-on."));
        }

        Ok(BookingTarget::Slot {
            category,
            package_id,
            slot_id,
            valet_included,
            valet_slot_id,
        })
    }

    fn rental_target(&self, now: NaiveDateTime) -> Result<BookingTarget, AppError> {
        let vehicle_id = parse_id(required(&self.resource_id)?)?;
        let mode = RentalMode::parse(required(&self.rental_type)?)
            .ok_or_else(|| AppError::validation("Invalid rental type."))?;

        let (pickup, pickup_time) =
            date_time(required(&self.pickup_date)?, required(&self.pickup_time)?)?;
        let (dropoff, dropoff_time) =
            date_time(required(&self.dropoff_date)?, required(&self.dropoff_time)?)?;

        match mode {
            RentalMode::Daily => {
                if pickup_time != window_open() || dropoff_time != window_close() {
                    return Err(AppError::validation(
                        "Daily rentals must have pickup at 7:00 AM and drop-off at 11:00 PM.",
                    ));
                }
            }
            RentalMode::Hourly => {
                if !is_on_grid(pickup_time) || !is_on_grid(dropoff_time) {
                    return Err(AppError::validation(
                        "Hourly rental times must be between 7:00 AM and 11:00 PM.",
                    ));
                }
            }
        }

        if pickup <= now {
            return Err(AppError::validation("Pickup date and time must be in the future."));
        }
        let range = TimeRange::new(pickup, dropoff).ok_or_else(|| {
            AppError::validation("Drop-off date and time must be after the pickup date and time.")
        })?;
        if mode == RentalMode::Hourly && range.duration_minutes() < MIN_HOURLY_MINUTES {
            return Err(AppError::validation("Minimum hourly rental duration is 2 hours."));
        }

        Ok(BookingTarget::Rental {
            vehicle_id,
            mode,
            range,
        })
    }

    fn limousine_target(&self, now: NaiveDateTime) -> Result<BookingTarget, AppError> {
        let limousine_id = parse_id(required(&self.resource_id)?)?;
        let service = LimoService::parse(required(&self.service_type)?)
            .ok_or_else(|| AppError::validation("Invalid service type."))?;

        let (pickup, pickup_time) =
            date_time(required(&self.pickup_date)?, required(&self.pickup_time)?)?;
        if !is_on_grid(pickup_time) || pickup_time == window_close() {
            return Err(AppError::validation(
                "Limousine pickup time must be between 7:00 AM and 10:30 PM.",
            ));
        }
        if pickup <= now {
            return Err(AppError::validation("Pickup date and time must be in the future."));
        }

        let hours = if service.is_hourly() {
            let hours = required(&self.hours)?
                .parse::<u32>()
                .map_err(|_| AppError::validation("Invalid number of hours."))?;
            if hours < 2 {
                return Err(AppError::validation("Hourly service requires a minimum of 2 hours."));
            }
            if hours > MAX_LIMOUSINE_HOURS {
                return Err(AppError::validation(format!(
                    "Hourly service is limited to {MAX_LIMOUSINE_HOURS} hours."
                )));
            }
            hours
        } else {
            LimoService::DEFAULT_BLOCK_HOURS
        };

        let range = TimeRange::starting_at(pickup, i64::from(hours) * 60)
            .ok_or_else(|| AppError::validation("Invalid number of hours."))?;

        Ok(BookingTarget::Limousine {
            limousine_id,
            service,
            range,
            hours,
            pickup_location: required(&self.pickup_location)?.to_string(),
            dropoff_location: required(&self.dropoff_location)?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2030-06-01 12:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn rental_form() -> BookingForm {
        serde_json::from_value(serde_json::json!({
            "category": "car_rental",
            "name": "Alice Tan",
            "email": "alice@example.com",
            "phone": "+6591234567",
            "payment_method": "card",
            "total_amount": "30.00",
            "resource_id": 1,
            "rental_type": "hourly",
            "pickup_date": "2030-06-16",
            "pickup_time": "10:00",
            "dropoff_date": "2030-06-16",
            "dropoff_time": "13:00"
        }))
        .unwrap()
    }

    fn err(form: BookingForm) -> String {
        form.into_request(now()).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_hourly_rental() {
        let request = rental_form().into_request(now()).unwrap();
        assert_eq!(request.submitted_amount, Decimal::new(3000, 2));
        match request.target {
            BookingTarget::Rental { vehicle_id, mode, range } => {
                assert_eq!(vehicle_id, 1);
                assert_eq!(mode, RentalMode::Hourly);
                assert_eq!(range.duration_minutes(), 180);
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn test_missing_field() {
        let mut form = rental_form();
        form.phone = Some("   ".to_string());
        assert_eq!(err(form), "All fields are required.");

        let mut form = rental_form();
        form.dropoff_time = None;
        assert_eq!(err(form), "All fields are required.");
    }

    #[test]
    fn test_invalid_email_checked_before_payment_method() {
        let mut form = rental_form();
        form.email = Some("not-an-email".to_string());
        form.payment_method = Some("cash".to_string());
        assert_eq!(err(form), "Invalid email address.");
    }

    #[test]
    fn test_invalid_payment_method() {
        let mut form = rental_form();
        form.payment_method = Some("cash".to_string());
        assert_eq!(err(form), "Invalid payment method.");
    }

    #[test]
    fn test_invalid_rental_type() {
        let mut form = rental_form();
        form.rental_type = Some("weekly".to_string());
        assert_eq!(err(form), "Invalid rental type.");
    }

    #[test]
    fn test_daily_rental_fixed_window() {
        let mut form = rental_form();
        form.rental_type = Some("daily".to_string());
        form.pickup_time = Some("08:00".to_string());
        form.dropoff_time = Some("23:00".to_string());
        assert_eq!(
            err(form),
            "Daily rentals must have pickup at 7:00 AM and drop-off at 11:00 PM."
        );

        let mut form = rental_form();
        form.rental_type = Some("daily".to_string());
        form.pickup_time = Some("07:00".to_string());
        form.dropoff_date = Some("2030-06-18".to_string());
        form.dropoff_time = Some("23:00".to_string());
        assert!(form.into_request(now()).is_ok());
    }

    #[test]
    fn test_hourly_grid() {
        let mut form = rental_form();
        form.pickup_time = Some("06:30".to_string());
        assert_eq!(err(form), "Hourly rental times must be between 7:00 AM and 11:00 PM.");

        let mut form = rental_form();
        form.pickup_time = Some("10:15".to_string());
        assert_eq!(err(form), "Hourly rental times must be between 7:00 AM and 11:00 PM.");
    }

    #[test]
    fn test_pickup_in_past() {
        let mut form = rental_form();
        form.pickup_date = Some("2030-05-01".to_string());
        assert_eq!(err(form), "Pickup date and time must be in the future.");
    }

    #[test]
    fn test_dropoff_before_pickup() {
        let mut form = rental_form();
        form.dropoff_time = Some("09:00".to_string());
        assert_eq!(
            err(form),
            "Drop-off date and time must be after the pickup date and time."
        );
    }

    #[test]
    fn test_minimum_hourly_duration() {
        let mut form = rental_form();
        form.dropoff_time = Some("11:30".to_string());
        assert_eq!(err(form), "Minimum hourly rental duration is 2 hours.");
    }

    #[test]
    fn test_slot_form_with_valet_addon() {
        let form: BookingForm = serde_json::from_value(serde_json::json!({
            "category": "car_servicing",
            "name": "Ben",
            "email": "ben@example.com",
            "phone": "+6590000001",
            "payment_method": "paynow",
            "total_amount": 150,
            "service_id": "6",
            "slot_id": 3,
            "valet_included": true,
            "valet_slot_id": 4
        }))
        .unwrap();
        let request = form.into_request(now()).unwrap();
        assert_eq!(request.category(), ServiceCategory::Slot(SlotCategory::CarServicing));
        match request.target {
            BookingTarget::Slot { valet_included, valet_slot_id, .. } => {
                assert!(valet_included);
                assert_eq!(valet_slot_id, Some(4));
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn test_valet_addon_only_for_servicing() {
        let form: BookingForm = serde_json::from_value(serde_json::json!({
            "category": "car_detailing",
            "name": "Ben",
            "email": "ben@example.com",
            "phone": "+6590000001",
            "payment_method": "card",
            "total_amount": "49.99",
            "service_id": "1",
            "slot_id": "3",
            "valet_included": "1"
        }))
        .unwrap();
        assert_eq!(
            err(form),
            "The valet add-on is only available with car servicing."
        );
    }

    #[test]
    fn test_limousine_non_hourly_blocks_two_hours() {
        let form: BookingForm = serde_json::from_value(serde_json::json!({
            "category": "limousine",
            "name": "Dana",
            "email": "dana@example.com",
            "phone": "+6590000002",
            "payment_method": "card",
            "total_amount": "90.00",
            "resource_id": "2",
            "service_type": "Airport Arrival",
            "pickup_date": "2030-06-16",
            "pickup_time": "21:30",
            "pickup_location": "Changi T3",
            "dropoff_location": "Orchard Road"
        }))
        .unwrap();
        match form.into_request(now()).unwrap().target {
            BookingTarget::Limousine { range, hours, .. } => {
                assert_eq!(hours, 2);
                assert_eq!(range.duration_minutes(), 120);
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn test_limousine_hourly_minimum() {
        let form: BookingForm = serde_json::from_value(serde_json::json!({
            "category": "limousine",
            "name": "Dana",
            "email": "dana@example.com",
            "phone": "+6590000002",
            "payment_method": "card",
            "total_amount": "120.00",
            "resource_id": "2",
            "service_type": "Hourly",
            "hours": "1",
            "pickup_date": "2030-06-16",
            "pickup_time": "10:00",
            "pickup_location": "Marina Bay",
            "dropoff_location": "Sentosa"
        }))
        .unwrap();
        assert_eq!(err(form), "Hourly service requires a minimum of 2 hours.");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a.b@example.com.sg"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@@example.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@example..com"));
    }
}
