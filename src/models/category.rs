//! Category model: a class of bags sharing a verification frequency and a
//! form template.

use serde::{Deserialize, Serialize};

/// Default verification frequency for a freshly created category.
pub const DEFAULT_FREQUENCY_DAYS: i64 = 30;

/// One configuration row: category name and verification frequency in days.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConfig {
    pub name: String,
    pub frequency_days: i64,
}

/// Request body for creating a category.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub frequency_days: Option<i64>,
}

/// Request body replacing the whole frequency table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceFrequenciesRequest {
    pub categories: Vec<CategoryConfig>,
}

/// Canonical form of a category name: trimmed, inner whitespace collapsed,
/// uppercased. "Sac ISP" and "sac  isp" both map to "SAC ISP".
///
/// Category names are canonicalized before being used as keys anywhere;
/// duplicate config rows collapsing to the same canonical name are merged,
/// keeping one.
pub fn canonical_category(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_case_and_whitespace() {
        assert_eq!(canonical_category("Sac ISP"), "SAC ISP");
        assert_eq!(canonical_category("  sac   isp "), "SAC ISP");
        assert_eq!(canonical_category("VLI"), "VLI");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(canonical_category("   "), "");
    }
}
