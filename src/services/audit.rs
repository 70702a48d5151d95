use std::sync::Arc;

use rusqlite::Connection;

use crate::db::queries;
use crate::models::AuditEntry;
use crate::state::AppState;

/// Audit entries written inside a transaction, published once it commits.
#[derive(Debug, Default)]
pub struct AuditBatch {
    entries: Vec<AuditEntry>,
}

impl AuditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(
        &mut self,
        conn: &Connection,
        action: &str,
        booking_id: Option<i64>,
        admin_id: Option<i64>,
    ) -> rusqlite::Result<()> {
        let entry = queries::insert_audit(conn, action, booking_id, admin_id)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn extend(&mut self, other: AuditBatch) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Call only after the transaction holding these rows has committed.
    pub fn publish(self, state: &AppState) {
        for entry in self.entries {
            // No subscribers is fine
            let _ = state.audit_tx.send(entry);
        }
    }
}

/// Writes a standalone audit entry outside any transaction. Failures are logged, not returned.
pub fn record(state: &Arc<AppState>, action: &str, booking_id: Option<i64>, admin_id: Option<i64>) {
    let entry = match state.conn() {
        Ok(db) => queries::insert_audit(&db, action, booking_id, admin_id).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match entry {
        Ok(entry) => {
            let _ = state.audit_tx.send(entry);
        }
        Err(e) => {
            tracing::error!(error = %e, action, "failed to record audit entry");
        }
    }
}
