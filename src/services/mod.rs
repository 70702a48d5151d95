pub mod audit;
pub mod availability;
pub mod catalog;
pub mod cutoff;
pub mod gateway;
pub mod intake;
pub mod ledger;
pub mod notify;
pub mod pricing;
pub mod reconciliation;
pub mod release;
pub mod revenue;
