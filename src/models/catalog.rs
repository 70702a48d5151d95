use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{LimoService, SlotCategory};

#[derive(Debug, Clone, Serialize)]
pub struct Vehicle {
    pub id: i64,
    pub model: String,
    pub hourly_rate: Decimal,
    pub daily_rate: Decimal,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimousineRate {
    pub service: LimoService,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Limousine {
    pub id: i64,
    pub model: String,
    pub available: bool,
    pub rates: Vec<LimousineRate>,
}

impl Limousine {
    pub fn rate_for(&self, service: LimoService) -> Option<Decimal> {
        self.rates
            .iter()
            .find(|r| r.service == service)
            .map(|r| r.rate)
    }
}

/// A priced service offered against the slot table.
#[derive(Debug, Clone, Serialize)]
pub struct ServicePackage {
    pub id: i64,
    pub category: SlotCategory,
    pub name: String,
    pub price: Decimal,
    pub valet_price: Option<Decimal>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Slot {
    pub id: i64,
    pub category: SlotCategory,
    pub date: NaiveDate,
    #[serde(serialize_with = "serialize_hhmm")]
    pub time: NaiveTime,
    pub is_reserved: bool,
    pub booking_id: Option<i64>,
}

fn serialize_hhmm<S: serde::Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%H:%M").to_string())
}
