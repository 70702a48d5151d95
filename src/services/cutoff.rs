use std::collections::HashSet;

use rusqlite::Connection;

use crate::db::queries;
use crate::models::ServiceCategory;
use crate::services::audit::AuditBatch;

/// Per-category booking cut-off flags, read once at the start of a booking attempt.
#[derive(Debug, Clone, Default)]
pub struct BookingPolicy {
    cut_off: HashSet<ServiceCategory>,
}

impl BookingPolicy {
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let mut cut_off = HashSet::new();
        for category in ServiceCategory::ALL {
            if queries::get_setting(conn, &category.cutoff_key())?.as_deref() == Some("1") {
                cut_off.insert(category);
            }
        }
        Ok(Self { cut_off })
    }

    pub fn with_cutoff(mut self, category: ServiceCategory) -> Self {
        self.cut_off.insert(category);
        self
    }

    pub fn accepts(&self, category: ServiceCategory) -> bool {
        !self.cut_off.contains(&category)
    }

    pub fn cut_off_categories(&self) -> Vec<ServiceCategory> {
        ServiceCategory::ALL
            .into_iter()
            .filter(|c| self.cut_off.contains(c))
            .collect()
    }
}

/// Flips the cut-off flag for a category and returns the new value.
pub fn toggle(
    conn: &Connection,
    category: ServiceCategory,
    admin_id: Option<i64>,
    audit: &mut AuditBatch,
) -> rusqlite::Result<bool> {
    let key = category.cutoff_key();
    let enabled = queries::get_setting(conn, &key)?.as_deref() != Some("1");
    queries::set_setting(conn, &key, if enabled { "1" } else { "0" })?;

    let action = format!(
        "Admin {} {} bookings",
        if enabled { "cut off" } else { "reopened" },
        category.as_str()
    );
    // Category-wide actions are not tied to a booking
    audit.write(conn, &action, None, admin_id)?;
    Ok(enabled)
}
