//! Form template model: the checklist structure verifiers fill out.
//!
//! Templates are built from per-category content rows, grouped into sections
//! and persisted as a single serialized map. Any edit regenerates the whole
//! map; there are no partial updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Input kind of a checklist item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Checkbox,
    Number,
    Text,
    Date,
}

impl FieldKind {
    /// Parse a kind token. Legacy French tokens from the original content
    /// sheets ("case", "nombre", "texte") are accepted; anything unknown
    /// degrades to `Text`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "checkbox" | "case" => FieldKind::Checkbox,
            "number" | "nombre" => FieldKind::Number,
            "date" => FieldKind::Date,
            _ => FieldKind::Text,
        }
    }
}

/// One checklist item inside a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormItem {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub default: String,
}

/// One section of a form template, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSection {
    pub section: String,
    /// Physical position label ("Latéral droit", "Poche principale", ...).
    #[serde(default)]
    pub position: String,
    pub items: Vec<FormItem>,
}

/// The full template map, category -> ordered sections.
pub type FormTemplates = BTreeMap<String, Vec<FormSection>>;

/// One editable template row, as stored in the form content table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRow {
    pub section: String,
    #[serde(default)]
    pub item: String,
    #[serde(default = "default_kind_token")]
    pub kind: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub position: String,
}

fn default_kind_token() -> String {
    "text".to_string()
}

/// Request body replacing one category's template rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub rows: Vec<FormRow>,
}

/// Group flat content rows into ordered sections. Rows with an empty section
/// or item name are skipped; a later row may still set the position label of
/// an already-opened section.
pub fn group_rows(rows: &[FormRow]) -> Vec<FormSection> {
    let mut sections: Vec<FormSection> = Vec::new();

    for row in rows {
        let section_name = row.section.trim();
        let item_name = row.item.trim();
        if section_name.is_empty() || item_name.is_empty() {
            continue;
        }

        let idx = match sections.iter().position(|s| s.section == section_name) {
            Some(idx) => idx,
            None => {
                sections.push(FormSection {
                    section: section_name.to_string(),
                    position: row.position.trim().to_string(),
                    items: Vec::new(),
                });
                sections.len() - 1
            }
        };
        let section = &mut sections[idx];

        if section.position.is_empty() && !row.position.trim().is_empty() {
            section.position = row.position.trim().to_string();
        }

        section.items.push(FormItem {
            name: item_name.to_string(),
            kind: FieldKind::parse(&row.kind),
            default: row.default.trim().to_string(),
        });
    }

    sections
}
