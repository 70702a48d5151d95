pub mod audit;
pub mod availability;
pub mod booking;
pub mod catalog;
pub mod category;

pub use audit::AuditEntry;
pub use availability::TimeRange;
pub use booking::{Booking, BookingStatus, Client, NewBooking, PaymentMethod, PaymentStatus};
pub use catalog::{Limousine, LimousineRate, ServicePackage, Slot, Vehicle};
pub use category::{FleetCategory, LimoService, RentalMode, ServiceCategory, SlotCategory};
