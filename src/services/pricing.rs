use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::errors::AppError;
use crate::models::{
    Booking, FleetCategory, LimoService, RentalMode, ServiceCategory, ServicePackage,
};
use crate::services::catalog;

/// Largest accepted difference between expected and submitted amounts.
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub const MIN_HOURLY_MINUTES: i64 = 120;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Pricing inputs for one booking.
#[derive(Debug, Clone, PartialEq)]
pub enum Quote {
    HourlyRental { hourly_rate: Decimal, minutes: i64 },
    DailyRental { daily_rate: Decimal, minutes: i64 },
    LimousineHourly { rate: Decimal, hours: u32 },
    LimousineFlat { rate: Decimal },
    Package { price: Decimal, valet_surcharge: Option<Decimal> },
}

/// Charge for a quote, from catalog prices, rounded to cents.
pub fn expected_amount(quote: &Quote) -> Result<Decimal, AppError> {
    let amount = match quote {
        Quote::HourlyRental { hourly_rate, minutes } => {
            if *minutes < MIN_HOURLY_MINUTES {
                return Err(AppError::validation("Minimum hourly rental duration is 2 hours."));
            }
            hours(*minutes) * *hourly_rate
        }
        Quote::DailyRental { daily_rate, minutes } => {
            if rental_days(*minutes) < 1 {
                return Err(AppError::validation(
                    "Drop-off date and time must be after the pickup date and time.",
                ));
            }
            // Flat per booking regardless of the number of days spanned
            *daily_rate
        }
        Quote::LimousineHourly { rate, hours } => {
            if *hours < 2 {
                return Err(AppError::validation("Hourly service requires a minimum of 2 hours."));
            }
            Decimal::from(*hours) * *rate
        }
        Quote::LimousineFlat { rate } => *rate,
        Quote::Package { price, valet_surcharge } => *price + valet_surcharge.unwrap_or_default(),
    };
    Ok(amount.round_dp(2))
}

pub fn validate(expected: Decimal, submitted: Decimal) -> Result<(), AppError> {
    if (expected - submitted).abs() > MONEY_TOLERANCE {
        return Err(AppError::PricingMismatch { expected, submitted });
    }
    Ok(())
}

fn hours(minutes: i64) -> Decimal {
    Decimal::from(minutes) / Decimal::from(60)
}

/// Whole days touched by a rental, rounded up.
pub fn rental_days(minutes: i64) -> i64 {
    if minutes <= 0 {
        return 0;
    }
    (minutes + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY
}

/// Rebuilds the quote for a stored booking from the current catalog.
pub fn quote_for_booking(conn: &Connection, booking: &Booking) -> Result<Quote, AppError> {
    let subtype = booking.subtype.as_deref().unwrap_or_default();
    match booking.category {
        ServiceCategory::Fleet(FleetCategory::CarRental) => {
            let vehicle = catalog::vehicle_any(conn, booking.resource_id)?;
            match RentalMode::parse(subtype) {
                Some(RentalMode::Hourly) => Ok(Quote::HourlyRental {
                    hourly_rate: vehicle.hourly_rate,
                    minutes: booking.duration_minutes,
                }),
                Some(RentalMode::Daily) => Ok(Quote::DailyRental {
                    daily_rate: vehicle.daily_rate,
                    minutes: booking.duration_minutes,
                }),
                None => Err(AppError::Internal(format!(
                    "booking {} has unknown rental type {subtype:?}",
                    booking.id
                ))),
            }
        }
        ServiceCategory::Fleet(FleetCategory::Limousine) => {
            let limousine = catalog::limousine_any(conn, booking.resource_id)?;
            let service = LimoService::parse(subtype).ok_or_else(|| {
                AppError::Internal(format!(
                    "booking {} has unknown limousine service {subtype:?}",
                    booking.id
                ))
            })?;
            let rate = catalog::limousine_rate(&limousine, service)?;
            if service.is_hourly() {
                let hours = u32::try_from(booking.duration_minutes / 60).unwrap_or(0);
                Ok(Quote::LimousineHourly { rate, hours })
            } else {
                Ok(Quote::LimousineFlat { rate })
            }
        }
        ServiceCategory::Slot(category) => {
            let package = catalog::package_any(conn, category, booking.resource_id)?;
            Ok(package_quote(&package, booking.valet_included))
        }
    }
}

pub fn package_quote(package: &ServicePackage, valet_included: bool) -> Quote {
    Quote::Package {
        price: package.price,
        valet_surcharge: if valet_included { package.valet_price } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sgd(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn test_hourly_rental_three_hours() {
        let quote = Quote::HourlyRental {
            hourly_rate: sgd(1000),
            minutes: 180,
        };
        let expected = expected_amount(&quote).unwrap();
        assert_eq!(expected, sgd(3000));
        assert!(validate(expected, sgd(3000)).is_ok());
        assert!(matches!(
            validate(expected, sgd(3002)),
            Err(AppError::PricingMismatch { .. })
        ));
    }

    #[test]
    fn test_tolerance_boundary() {
        assert!(validate(sgd(3000), sgd(3001)).is_ok());
        assert!(validate(sgd(3000), sgd(2999)).is_ok());
        assert!(validate(sgd(3000), sgd(2998)).is_err());
    }

    #[test]
    fn test_hourly_rental_half_hours() {
        let quote = Quote::HourlyRental {
            hourly_rate: sgd(1250),
            minutes: 150,
        };
        assert_eq!(expected_amount(&quote).unwrap(), sgd(3125));
    }

    #[test]
    fn test_hourly_rental_minimum() {
        let quote = Quote::HourlyRental {
            hourly_rate: sgd(1000),
            minutes: 90,
        };
        let err = expected_amount(&quote).unwrap_err();
        assert_eq!(err.to_string(), "Minimum hourly rental duration is 2 hours.");
    }

    #[test]
    fn test_daily_rental_is_flat() {
        let one_day = Quote::DailyRental {
            daily_rate: sgd(15000),
            minutes: 16 * 60,
        };
        let three_days = Quote::DailyRental {
            daily_rate: sgd(15000),
            minutes: 2 * 24 * 60 + 16 * 60,
        };
        assert_eq!(expected_amount(&one_day).unwrap(), sgd(15000));
        assert_eq!(expected_amount(&three_days).unwrap(), sgd(15000));
    }

    #[test]
    fn test_rental_days_rounds_up() {
        assert_eq!(rental_days(16 * 60), 1);
        assert_eq!(rental_days(24 * 60), 1);
        assert_eq!(rental_days(24 * 60 + 1), 2);
        assert_eq!(rental_days(0), 0);
    }

    #[test]
    fn test_limousine_pricing() {
        let hourly = Quote::LimousineHourly {
            rate: sgd(12000),
            hours: 3,
        };
        assert_eq!(expected_amount(&hourly).unwrap(), sgd(36000));

        let short = Quote::LimousineHourly {
            rate: sgd(12000),
            hours: 1,
        };
        assert_eq!(
            expected_amount(&short).unwrap_err().to_string(),
            "Hourly service requires a minimum of 2 hours."
        );

        let transfer = Quote::LimousineFlat { rate: sgd(9000) };
        assert_eq!(expected_amount(&transfer).unwrap(), sgd(9000));
    }

    #[test]
    fn test_servicing_valet_surcharge() {
        let with_valet = Quote::Package {
            price: sgd(10000),
            valet_surcharge: Some(sgd(5000)),
        };
        let without = Quote::Package {
            price: sgd(10000),
            valet_surcharge: None,
        };
        assert_eq!(expected_amount(&with_valet).unwrap(), sgd(15000));
        assert_eq!(expected_amount(&without).unwrap(), sgd(10000));
    }

    #[test]
    fn test_expected_amount_is_deterministic() {
        let quote = Quote::HourlyRental {
            hourly_rate: sgd(1999),
            minutes: 330,
        };
        let first = expected_amount(&quote).unwrap();
        for _ in 0..10 {
            assert_eq!(expected_amount(&quote).unwrap(), first);
        }
    }
}
