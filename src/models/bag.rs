//! Bag model: one inventory row per physical kit.

use serde::{Deserialize, Serialize};

/// Traffic-light verification status of a bag.
///
/// `Purple` means a contained item has passed its expiry date; it overrides
/// the control-date classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BagStatus {
    Green,
    Orange,
    Red,
    Purple,
}

impl BagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BagStatus::Green => "green",
            BagStatus::Orange => "orange",
            BagStatus::Red => "red",
            BagStatus::Purple => "purple",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "green" => Some(BagStatus::Green),
            "orange" => Some(BagStatus::Orange),
            "red" => Some(BagStatus::Red),
            "purple" => Some(BagStatus::Purple),
            _ => None,
        }
    }
}

/// Operational state of a bag. `Hs` (hors service) bags keep their stored
/// status but are excluded from aggregate counts and alert mails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BagState {
    #[serde(rename = "Actif")]
    Actif,
    #[serde(rename = "HS")]
    Hs,
}

impl BagState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BagState::Actif => "Actif",
            BagState::Hs => "HS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Actif" => Some(BagState::Actif),
            "HS" => Some(BagState::Hs),
            _ => None,
        }
    }
}

/// One inventory row. `name` is unique across the table and is the sole
/// lookup key used by every mutation.
///
/// Dates are ISO `YYYY-MM-DD` strings; an empty string means "not set".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bag {
    pub category: String,
    pub name: String,
    pub last_control: String,
    pub next_control: String,
    pub status: BagStatus,
    pub last_verifier: String,
    pub next_item_name: String,
    pub next_item_expiry: String,
    pub mail_orange: String,
    pub mail_red: String,
    pub state: BagState,
    pub location: String,
    pub display_order: i64,
}

/// Request body for registering a new bag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBagRequest {
    pub category: String,
    pub name: String,
}

/// Request body for renaming a bag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub new_name: String,
}

/// Request body for flipping a bag in or out of service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBagStateRequest {
    pub state: BagState,
}

/// Request body for the alert recipient addresses of a bag.
///
/// A `None` field leaves the stored address untouched; an empty string
/// clears it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAlertRecipientsRequest {
    #[serde(default)]
    pub mail_orange: Option<String>,
    #[serde(default)]
    pub mail_red: Option<String>,
}

/// One entry of a batch location update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

/// One entry of a batch display-order update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub name: String,
    pub order: i64,
}

/// Result of a best-effort batch update: unmatched names are skipped
/// rather than rejected, but the caller can see which ones were.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub matched: Vec<String>,
    pub unmatched: Vec<String>,
}

/// Request body for recording a completed verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCheckRequest {
    pub bag_name: String,
    /// Form answers as submitted by the client, stored verbatim in history.
    pub answers: serde_json::Value,
    #[serde(default)]
    pub next_item_name: String,
    /// Soonest expiry among contained items, ISO or DD/MM/YYYY.
    #[serde(default)]
    pub next_item_expiry: String,
    #[serde(default)]
    pub verifier: String,
    /// Elapsed verification time as reported by the client, e.g. "12min".
    #[serde(default)]
    pub elapsed: String,
}
