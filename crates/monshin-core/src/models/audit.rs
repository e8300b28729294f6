use serde::{Deserialize, Serialize};

/// One append-only audit record. Application code never updates or deletes
/// these; `id` is assigned by the store on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub at: jiff::Timestamp,
    /// Event kind, e.g. `"login"`, `"template_deleted"`.
    pub kind: String,
    pub username: String,
    pub note: String,
}
