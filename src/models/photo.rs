//! Photo models: blob metadata, presence map keys and the photo event log.
//!
//! Each photo blob has a proper metadata record in the database; the
//! filename convention (`PHOTO_<key>_<millis>.jpg`) is kept only so a
//! directory listing still sorts naturally, never parsed back.

use serde::{Deserialize, Serialize};

/// The two photo families. Check photos are keyed by
/// {category, bag, section}; impact photos by bag name alone and carry a
/// free-text comment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFamily {
    Check,
    Impact,
}

impl PhotoFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoFamily::Check => "check",
            PhotoFamily::Impact => "impact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "check" => Some(PhotoFamily::Check),
            "impact" => Some(PhotoFamily::Impact),
            _ => None,
        }
    }

    /// Filename prefix of the family.
    pub fn prefix(&self) -> &'static str {
        match self {
            PhotoFamily::Check => "PHOTO",
            PhotoFamily::Impact => "IMPACT",
        }
    }
}

/// Metadata record of one stored photo blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub family: PhotoFamily,
    pub category: String,
    pub bag_name: String,
    pub section: String,
    pub comment: String,
    pub file_name: String,
    /// Capture timestamp, unix milliseconds.
    pub taken_at: i64,
    pub trashed: bool,
}

impl PhotoRecord {
    /// The presence-map key of a check photo.
    pub fn presence_key(&self) -> String {
        sanitize_key(&photo_key(&self.category, &self.bag_name, &self.section))
    }
}

/// A photo as returned to the client: metadata plus the blob re-encoded as
/// a data URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    pub file_id: String,
    pub file_name: String,
    pub timestamp: i64,
    pub date_str: String,
    pub data_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// Result of a photo save.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSaved {
    pub file_id: String,
    pub file_name: String,
    pub timestamp: i64,
}

/// Newest photo for a key, or the explicit absence of one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPhotoMeta {
    pub has_photo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

/// What happened to a photo, as recorded in the append-only event log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhotoAction {
    Add,
    Modify,
    Delete,
}

/// One entry of the photo event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoEvent {
    pub action: PhotoAction,
    pub bag_name: String,
    pub category: String,
    pub file_id: String,
    pub file_name: String,
    pub timestamp: i64,
}

/// Query parameters addressing one check-photo key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoKeyQuery {
    pub category: String,
    pub bag: String,
    pub section: String,
}

/// Request body for uploading a check photo.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePhotoRequest {
    pub category: String,
    pub bag: String,
    pub section: String,
    /// Base64 payload, with or without a `data:image/...;base64,` header.
    pub data: String,
}

/// Request body for uploading an impact photo.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveImpactRequest {
    pub bag: String,
    pub data: String,
    #[serde(default)]
    pub comment: String,
}

/// Request body for editing an impact photo comment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub comment: String,
}

/// Composite key of a check photo.
pub fn photo_key(category: &str, bag: &str, section: &str) -> String {
    format!("{}||{}||{}", category, bag, section)
}

/// Filesystem-safe token: every non-alphanumeric character becomes `_`.
pub fn sanitize_key(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Blob filename for a photo: family prefix, sanitized key, capture millis.
/// The millis suffix guarantees uniqueness and a natural newest-first sort.
pub fn blob_file_name(family: PhotoFamily, sanitized_key: &str, taken_at: i64) -> String {
    format!("{}_{}_{}.jpg", family.prefix(), sanitized_key, taken_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_alphanumerics() {
        assert_eq!(
            sanitize_key("VLI||VLI 1||Pochette (rouge)"),
            "VLI__VLI_1__Pochette__rouge_"
        );
    }

    #[test]
    fn file_names_carry_family_prefix() {
        assert_eq!(
            blob_file_name(PhotoFamily::Check, "VLI__VLI_1__Haut", 1700000000000),
            "PHOTO_VLI__VLI_1__Haut_1700000000000.jpg"
        );
        assert_eq!(
            blob_file_name(PhotoFamily::Impact, "VLI_1", 1700000000000),
            "IMPACT_VLI_1_1700000000000.jpg"
        );
    }

    #[test]
    fn presence_key_is_sanitized_composite() {
        let record = PhotoRecord {
            id: "x".into(),
            family: PhotoFamily::Check,
            category: "VLI".into(),
            bag_name: "VLI 1".into(),
            section: "Haut".into(),
            comment: String::new(),
            file_name: String::new(),
            taken_at: 0,
            trashed: false,
        };
        assert_eq!(record.presence_key(), "VLI__VLI_1__Haut");
    }
}
