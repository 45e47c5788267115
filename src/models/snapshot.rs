//! Bootstrap snapshot: the single consolidated read-model served to the
//! client UI, plus the global option and mail template blobs it embeds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Bag, FormTemplates, HistoryEntry, MileageRecord};

/// Feature switches stored as one JSON blob and interpreted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOptions {
    pub enable_expiry: bool,
    pub enable_qr: bool,
    pub enable_verifier: bool,
    pub enable_photos: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            enable_expiry: true,
            enable_qr: true,
            enable_verifier: true,
            enable_photos: true,
        }
    }
}

/// Subject and body templates for the alert mails. Bodies substitute
/// `{nom}`, `{categorie}`, `{date}` and `{echeance}`; subjects `{nom}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailTemplates {
    pub orange_subject: String,
    pub orange_body: String,
    pub red_subject: String,
    pub red_body: String,
}

impl Default for MailTemplates {
    fn default() -> Self {
        Self {
            orange_subject: "ALERTE ORANGE".to_string(),
            orange_body: "Matériel bientot périmé.".to_string(),
            red_subject: "ALERTE ROUGE".to_string(),
            red_body: "Matériel périmé.".to_string(),
        }
    }
}

/// Aggregate traffic-light counts over in-service bags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub ok: i64,
    pub orange: i64,
    pub red: i64,
    pub expired_items: i64,
}

/// The consolidated read-model. Rebuilt wholesale from the source tables;
/// served from a short-lived cache with a durable fallback copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    pub inventory: Vec<Bag>,
    /// Bags grouped by category for the dashboard.
    pub dashboard: BTreeMap<String, Vec<Bag>>,
    /// Categories in config-row order.
    pub categories_order: Vec<String>,
    pub frequencies: BTreeMap<String, i64>,
    pub forms: FormTemplates,
    /// Most recent 500 entries, newest first.
    pub history: Vec<HistoryEntry>,
    pub options: GlobalOptions,
    pub mail_templates: MailTemplates,
    pub stats: InventoryStats,
    /// Sanitized photo key -> "at least one photo exists".
    pub photo_presence: BTreeMap<String, bool>,
    /// Sanitized bag name -> latest mileage record.
    pub mileages: BTreeMap<String, MileageRecord>,
    pub generated_at: String,
}
