//! History model: append-only verification audit log.

use serde::{Deserialize, Serialize};

/// One history entry as served to the client, newest first.
///
/// Entries reference bags by name with no foreign-key enforcement: renaming
/// a bag rewrites its entries, deleting a bag (or its category) leaves them
/// in place as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Display timestamp, DD/MM/YYYY HH:MM.
    pub date_str: String,
    pub name: String,
    pub verifier: String,
    /// Serialized form answers plus optional expired-item and elapsed-time
    /// annotations.
    pub details: String,
}
