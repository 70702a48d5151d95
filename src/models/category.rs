use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Categories booked against a fixed slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCategory {
    CarDetailing,
    Valet,
    CarServicing,
}

/// Categories booked as continuous intervals against a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetCategory {
    CarRental,
    Limousine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCategory {
    Slot(SlotCategory),
    Fleet(FleetCategory),
}

impl SlotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotCategory::CarDetailing => "car_detailing",
            SlotCategory::Valet => "valet",
            SlotCategory::CarServicing => "car_servicing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "car_detailing" => Some(SlotCategory::CarDetailing),
            "valet" => Some(SlotCategory::Valet),
            "car_servicing" => Some(SlotCategory::CarServicing),
            _ => None,
        }
    }
}

impl FleetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetCategory::CarRental => "car_rental",
            FleetCategory::Limousine => "limousine",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "car_rental" => Some(FleetCategory::CarRental),
            "limousine" => Some(FleetCategory::Limousine),
            _ => None,
        }
    }
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 5] = [
        ServiceCategory::Slot(SlotCategory::CarDetailing),
        ServiceCategory::Fleet(FleetCategory::CarRental),
        ServiceCategory::Slot(SlotCategory::Valet),
        ServiceCategory::Slot(SlotCategory::CarServicing),
        ServiceCategory::Fleet(FleetCategory::Limousine),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Slot(c) => c.as_str(),
            ServiceCategory::Fleet(c) => c.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        SlotCategory::parse(s)
            .map(ServiceCategory::Slot)
            .or_else(|| FleetCategory::parse(s).map(ServiceCategory::Fleet))
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceCategory::Slot(SlotCategory::CarDetailing) => "Car detailing",
            ServiceCategory::Slot(SlotCategory::Valet) => "Valet",
            ServiceCategory::Slot(SlotCategory::CarServicing) => "Car servicing",
            ServiceCategory::Fleet(FleetCategory::CarRental) => "Car rental",
            ServiceCategory::Fleet(FleetCategory::Limousine) => "Limousine",
        }
    }

    /// Settings key holding the cut-off flag for this category.
    pub fn cutoff_key(&self) -> String {
        format!("{}_cutoff", self.as_str())
    }
}

impl From<SlotCategory> for ServiceCategory {
    fn from(c: SlotCategory) -> Self {
        ServiceCategory::Slot(c)
    }
}

impl From<FleetCategory> for ServiceCategory {
    fn from(c: FleetCategory) -> Self {
        ServiceCategory::Fleet(c)
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServiceCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServiceCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ServiceCategory::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown service category: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalMode {
    Hourly,
    Daily,
}

impl RentalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalMode::Hourly => "hourly",
            RentalMode::Daily => "daily",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(RentalMode::Hourly),
            "daily" => Some(RentalMode::Daily),
            _ => None,
        }
    }
}

/// Limousine service types. Only `Hourly` is priced by duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimoService {
    Hourly,
    PointToPoint,
    AirportDeparture,
    AirportArrival,
    Corporate,
    Events,
}

impl LimoService {
    pub const ALL: [LimoService; 6] = [
        LimoService::Hourly,
        LimoService::PointToPoint,
        LimoService::AirportDeparture,
        LimoService::AirportArrival,
        LimoService::Corporate,
        LimoService::Events,
    ];

    /// Hours blocked by a non-hourly service.
    pub const DEFAULT_BLOCK_HOURS: u32 = 2;

    pub fn as_str(&self) -> &'static str {
        match self {
            LimoService::Hourly => "Hourly",
            LimoService::PointToPoint => "Point-to-Point Transfer",
            LimoService::AirportDeparture => "Airport Departure",
            LimoService::AirportArrival => "Airport Arrival",
            LimoService::Corporate => "Corporate",
            LimoService::Events => "Events",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        LimoService::ALL.into_iter().find(|svc| svc.as_str() == s)
    }

    pub fn is_hourly(&self) -> bool {
        matches!(self, LimoService::Hourly)
    }
}

impl Serialize for LimoService {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_wire_name() {
        for category in ServiceCategory::ALL {
            assert_eq!(ServiceCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(ServiceCategory::parse("car_wash"), None);
    }

    #[test]
    fn test_cutoff_key() {
        let c = ServiceCategory::Fleet(FleetCategory::CarRental);
        assert_eq!(c.cutoff_key(), "car_rental_cutoff");
    }

    #[test]
    fn test_category_json() {
        let c: ServiceCategory = serde_json::from_str("\"valet\"").unwrap();
        assert_eq!(c, ServiceCategory::Slot(SlotCategory::Valet));
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"valet\"");
        assert!(serde_json::from_str::<ServiceCategory>("\"boat\"").is_err());
    }

    #[test]
    fn test_limo_service_labels() {
        assert_eq!(
            LimoService::parse("Point-to-Point Transfer"),
            Some(LimoService::PointToPoint)
        );
        assert_eq!(LimoService::parse("hourly"), None);
        assert!(LimoService::Hourly.is_hourly());
        assert!(!LimoService::Events.is_hourly());
    }
}
