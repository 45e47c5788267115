//! Mileage model for vehicle-mounted kits.

use serde::{Deserialize, Serialize};

/// One mileage record per bag, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MileageRecord {
    pub km: f64,
    /// Odometer reading date as entered by the verifier.
    pub date: String,
    /// When the record was captured, unix milliseconds.
    pub captured_at: i64,
}

/// Request body for recording a mileage reading.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMileageRequest {
    pub bag_name: String,
    pub km: f64,
    #[serde(default)]
    pub date: String,
}
