use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ServiceCategory;

#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub id: i64,
    pub client_id: i64,
    pub category: ServiceCategory,
    pub resource_id: i64,
    pub slot_id: Option<i64>,
    pub valet_slot_id: Option<i64>,
    pub valet_included: bool,
    pub subtype: Option<String>,
    pub pickup_at: NaiveDateTime,
    pub dropoff_at: Option<NaiveDateTime>,
    pub duration_minutes: i64,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,
    pub refund_pending: bool,
    pub payment_request_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Slots held by this booking, primary slot first.
    pub fn held_slots(&self) -> Vec<i64> {
        self.slot_id.into_iter().chain(self.valet_slot_id).collect()
    }
}

/// Row written by the ledger. Status fields always start as pending.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub client_id: i64,
    pub category: ServiceCategory,
    pub resource_id: i64,
    pub slot_id: Option<i64>,
    pub valet_slot_id: Option<i64>,
    pub valet_included: bool,
    pub subtype: Option<String>,
    pub pickup_at: NaiveDateTime,
    pub dropoff_at: Option<NaiveDateTime>,
    pub duration_minutes: i64,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Paynow,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paynow => "paynow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(PaymentMethod::Card),
            "paynow" => Some(PaymentMethod::Paynow),
            _ => None,
        }
    }

    /// Method name understood by the payment gateway.
    pub fn gateway_method(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paynow => "paynow_online",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!(BookingStatus::parse("completed"), Some(BookingStatus::Completed));
        assert_eq!(BookingStatus::parse("done"), None);
        assert_eq!(PaymentStatus::parse("refunded"), Some(PaymentStatus::Refunded));
        assert_eq!(PaymentStatus::parse(""), None);
    }

    #[test]
    fn test_only_cancelled_is_terminal() {
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Completed.is_terminal());
    }

    #[test]
    fn test_paynow_gateway_method() {
        assert_eq!(PaymentMethod::Paynow.gateway_method(), "paynow_online");
        assert_eq!(PaymentMethod::parse("cash"), None);
    }
}
