use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub booking_id: Option<i64>,
    pub admin_id: Option<i64>,
    pub created_at: String,
}
