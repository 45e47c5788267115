//! Database repository for CRUD operations.
//!
//! Every mutation bumps the revision counter; bag names are the sole lookup
//! key for inventory mutations and not-found is always an explicit error,
//! never a panic.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    canonical_category, group_rows, sanitize_key, Bag, BagState, BagStatus, BatchOutcome,
    CategoryConfig, FormRow, FormTemplates, GlobalOptions, HistoryEntry, LocationUpdate,
    MailTemplates, MileageRecord, OrderUpdate, PhotoEvent, PhotoFamily, PhotoRecord,
    SnapshotData, DEFAULT_FREQUENCY_DAYS,
};
use crate::status;

/// kv entry holding the serialized form-template map.
pub const KV_FORMS: &str = "forms_json";
/// kv entry holding the global option switches.
pub const KV_OPTIONS: &str = "global_options";
/// kv entry holding the mail templates.
pub const KV_MAIL: &str = "mail_templates";
/// kv entry holding the photo presence map.
pub const KV_PRESENCE: &str = "photo_presence";
/// kv entry holding the append-only photo event log.
pub const KV_PHOTO_EVENTS: &str = "photo_events";
/// kv entry holding the durable bootstrap snapshot.
pub const KV_SNAPSHOT: &str = "bootstrap_snapshot_v1";
/// kv prefix for per-bag mileage records.
pub const KV_MILEAGE_PREFIX: &str = "mileage:";

/// How many history entries the snapshot carries.
pub const HISTORY_LIMIT: i64 = 500;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    // ==================== KEY-VALUE STORE ====================

    /// Read a JSON kv entry. A corrupt blob is treated as absent so the
    /// caller falls back to a rebuild-from-source path.
    pub async fn get_kv<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.get("value");
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Corrupt kv blob {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Write a JSON kv entry.
    pub async fn put_kv<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)?;
        sqlx::query("INSERT INTO kv (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(&raw)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== INVENTORY OPERATIONS ====================

    /// List all bags, grouped by category in display order.
    pub async fn list_bags(&self) -> Result<Vec<Bag>, AppError> {
        let rows = sqlx::query(
            "SELECT category, name, last_control, next_control, status, last_verifier, next_item_name, next_item_expiry, mail_orange, mail_red, state, location, display_order FROM inventory ORDER BY category, display_order, rowid"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(bag_from_row).collect())
    }

    /// Get a bag by name.
    pub async fn get_bag(&self, name: &str) -> Result<Option<Bag>, AppError> {
        let row = sqlx::query(
            "SELECT category, name, last_control, next_control, status, last_verifier, next_item_name, next_item_expiry, mail_orange, mail_red, state, location, display_order FROM inventory WHERE name = ?"
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(bag_from_row))
    }

    /// Register a new bag with the next free display rank of its category.
    pub async fn add_bag(&self, category: &str, name: &str) -> Result<Bag, AppError> {
        let category = canonical_category(category);
        if self.get_bag(name).await?.is_some() {
            return Err(AppError::Validation(format!(
                "Bag {} already exists",
                name
            )));
        }

        let row = sqlx::query(
            "SELECT COALESCE(MAX(display_order), 0) AS max_order FROM inventory WHERE category = ?",
        )
        .bind(&category)
        .fetch_one(&self.pool)
        .await?;
        let next_order: i64 = row.get::<i64, _>("max_order") + 1;

        sqlx::query(
            "INSERT INTO inventory (category, name, status, state, display_order) VALUES (?, ?, 'green', 'Actif', ?)",
        )
        .bind(&category)
        .bind(name)
        .bind(next_order)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        Ok(Bag {
            category,
            name: name.to_string(),
            last_control: String::new(),
            next_control: String::new(),
            status: BagStatus::Green,
            last_verifier: String::new(),
            next_item_name: String::new(),
            next_item_expiry: String::new(),
            mail_orange: String::new(),
            mail_red: String::new(),
            state: BagState::Actif,
            location: String::new(),
            display_order: next_order,
        })
    }

    /// Delete a bag. History and photos survive as orphaned references.
    pub async fn delete_bag(&self, name: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM inventory WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Bag {} not found", name)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Rename a bag in the inventory and in every history row that
    /// references it. Returns the bag's category for the photo re-keying
    /// step that follows.
    pub async fn rename_bag_rows(&self, old_name: &str, new_name: &str) -> Result<String, AppError> {
        let existing = self
            .get_bag(old_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bag {} not found", old_name)))?;

        if self.get_bag(new_name).await?.is_some() {
            return Err(AppError::Validation(format!(
                "Bag {} already exists",
                new_name
            )));
        }

        sqlx::query("UPDATE inventory SET name = ? WHERE name = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE history SET bag_name = ? WHERE bag_name = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;
        Ok(existing.category)
    }

    /// Flip a bag in or out of service.
    pub async fn set_bag_state(&self, name: &str, state: BagState) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE inventory SET state = ? WHERE name = ?")
            .bind(state.as_str())
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Bag {} not found", name)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Update the alert recipient addresses of a bag. `None` leaves a
    /// stored address untouched.
    pub async fn set_bag_alert_recipients(
        &self,
        name: &str,
        mail_orange: Option<&str>,
        mail_red: Option<&str>,
    ) -> Result<(), AppError> {
        let existing = self
            .get_bag(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bag {} not found", name)))?;

        let orange = mail_orange.unwrap_or(&existing.mail_orange);
        let red = mail_red.unwrap_or(&existing.mail_red);

        sqlx::query("UPDATE inventory SET mail_orange = ?, mail_red = ? WHERE name = ?")
            .bind(orange)
            .bind(red)
            .bind(name)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;
        Ok(())
    }

    /// Best-effort batch location update: unmatched names are skipped,
    /// and reported back.
    pub async fn update_locations(
        &self,
        updates: &[LocationUpdate],
    ) -> Result<BatchOutcome, AppError> {
        let mut outcome = BatchOutcome::default();

        for update in updates {
            let result = sqlx::query("UPDATE inventory SET location = ? WHERE name = ?")
                .bind(&update.location)
                .bind(&update.name)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() > 0 {
                outcome.matched.push(update.name.clone());
            } else {
                outcome.unmatched.push(update.name.clone());
            }
        }

        self.increment_revision().await?;
        Ok(outcome)
    }

    /// Best-effort batch display-order update.
    pub async fn update_orders(&self, updates: &[OrderUpdate]) -> Result<BatchOutcome, AppError> {
        let mut outcome = BatchOutcome::default();

        for update in updates {
            let result = sqlx::query("UPDATE inventory SET display_order = ? WHERE name = ?")
                .bind(update.order)
                .bind(&update.name)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() > 0 {
                outcome.matched.push(update.name.clone());
            } else {
                outcome.unmatched.push(update.name.clone());
            }
        }

        self.increment_revision().await?;
        Ok(outcome)
    }

    /// Write the result of a completed verification onto the bag row.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_check(
        &self,
        name: &str,
        last_control: &str,
        next_control: &str,
        new_status: BagStatus,
        verifier: &str,
        next_item_name: &str,
        next_item_expiry: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE inventory SET last_control = ?, next_control = ?, status = ?, last_verifier = ?, next_item_name = ?, next_item_expiry = ? WHERE name = ?",
        )
        .bind(last_control)
        .bind(next_control)
        .bind(new_status.as_str())
        .bind(verifier)
        .bind(next_item_name)
        .bind(next_item_expiry)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Bag {} not found", name)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Re-derive every bag's status from its stored dates. Bags with
    /// neither a next control date nor an item expiry keep their stored
    /// status. Returns how many rows changed.
    pub async fn recompute_statuses(&self, today: NaiveDate) -> Result<usize, AppError> {
        let bags = self.list_bags().await?;
        let mut changed = 0;

        for bag in &bags {
            let next_control = status::parse_date(&bag.next_control);
            let item_expiry = status::parse_date(&bag.next_item_expiry);
            let Some(new_status) = status::classify(today, next_control, item_expiry) else {
                continue;
            };
            if new_status == bag.status {
                continue;
            }
            sqlx::query("UPDATE inventory SET status = ? WHERE name = ?")
                .bind(new_status.as_str())
                .bind(&bag.name)
                .execute(&self.pool)
                .await?;
            changed += 1;
        }

        if changed > 0 {
            self.increment_revision().await?;
        }
        Ok(changed)
    }

    /// Give a display rank to every bag that has none, counting up per
    /// category in physical row order.
    pub async fn assign_missing_display_orders(&self) -> Result<(), AppError> {
        let rows = sqlx::query(
            "SELECT name, category, display_order FROM inventory ORDER BY category, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counters: BTreeMap<String, i64> = BTreeMap::new();
        for row in rows {
            let name: String = row.get("name");
            let category: String = row.get("category");
            let order: i64 = row.get("display_order");

            let counter = counters.entry(category).or_insert(0);
            *counter += 1;
            if order <= 0 {
                sqlx::query("UPDATE inventory SET display_order = ? WHERE name = ?")
                    .bind(*counter)
                    .bind(&name)
                    .execute(&self.pool)
                    .await?;
            } else if order > *counter {
                *counter = order;
            }
        }

        Ok(())
    }

    // ==================== CATEGORY OPERATIONS ====================

    /// List category config rows in stored order.
    pub async fn list_categories(&self) -> Result<Vec<CategoryConfig>, AppError> {
        let rows =
            sqlx::query("SELECT name, frequency_days FROM categories ORDER BY seq, rowid")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryConfig {
                name: row.get("name"),
                frequency_days: row.get("frequency_days"),
            })
            .collect())
    }

    /// Create a category with the default frequency unless one is given.
    pub async fn create_category(
        &self,
        name: &str,
        frequency_days: Option<i64>,
    ) -> Result<CategoryConfig, AppError> {
        let name = canonical_category(name);
        if name.is_empty() {
            return Err(AppError::Validation("Category name is required".to_string()));
        }

        let exists = sqlx::query("SELECT 1 FROM categories WHERE name = ?")
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            return Err(AppError::Validation(format!(
                "Category {} already exists",
                name
            )));
        }

        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) AS max_seq FROM categories")
            .fetch_one(&self.pool)
            .await?;
        let seq: i64 = row.get::<i64, _>("max_seq") + 1;
        let frequency = frequency_days.unwrap_or(DEFAULT_FREQUENCY_DAYS);

        sqlx::query("INSERT INTO categories (name, frequency_days, seq) VALUES (?, ?, ?)")
            .bind(&name)
            .bind(frequency)
            .bind(seq)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;
        Ok(CategoryConfig {
            name,
            frequency_days: frequency,
        })
    }

    /// Verification frequency of a category, defaulting when unknown.
    pub async fn category_frequency(&self, category: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT frequency_days FROM categories WHERE name = ?")
            .bind(category)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.get("frequency_days"))
            .unwrap_or(DEFAULT_FREQUENCY_DAYS))
    }

    /// Replace the whole frequency table. Names are canonicalized and
    /// duplicates collapse keeping the first occurrence.
    pub async fn replace_frequencies(
        &self,
        categories: &[CategoryConfig],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM categories").execute(&mut *tx).await?;

        let mut seen: Vec<String> = Vec::new();
        let mut seq = 0i64;
        for config in categories {
            let name = canonical_category(&config.name);
            if name.is_empty() || seen.contains(&name) {
                continue;
            }
            seq += 1;
            sqlx::query("INSERT INTO categories (name, frequency_days, seq) VALUES (?, ?, ?)")
                .bind(&name)
                .bind(config.frequency_days)
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            seen.push(name);
        }

        tx.commit().await?;
        self.increment_revision().await?;
        Ok(())
    }

    /// Rename a category in the config, the inventory, the form content
    /// rows and the template map. History rows do not store the category
    /// and are untouched.
    pub async fn rename_category(&self, old_name: &str, new_name: &str) -> Result<(), AppError> {
        let new_name = canonical_category(new_name);
        if new_name.is_empty() {
            return Err(AppError::Validation("Category name is required".to_string()));
        }

        let result = sqlx::query("UPDATE categories SET name = ? WHERE name = ?")
            .bind(&new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Category {} not found",
                old_name
            )));
        }

        sqlx::query("UPDATE inventory SET category = ? WHERE category = ?")
            .bind(&new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE form_rows SET category = ? WHERE category = ?")
            .bind(&new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await?;

        if let Some(mut forms) = self.get_kv::<FormTemplates>(KV_FORMS).await? {
            if let Some(sections) = forms.remove(old_name) {
                forms.insert(new_name.clone(), sections);
                self.put_kv(KV_FORMS, &forms).await?;
            }
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Delete a category, its inventory rows and its form template.
    /// History and photos survive untouched.
    pub async fn delete_category(&self, name: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM categories WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category {} not found", name)));
        }

        sqlx::query("DELETE FROM inventory WHERE category = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM form_rows WHERE category = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if let Some(mut forms) = self.get_kv::<FormTemplates>(KV_FORMS).await? {
            if forms.remove(name).is_some() {
                self.put_kv(KV_FORMS, &forms).await?;
            }
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Collapse config rows whose names canonicalize to the same category,
    /// keeping one row per canonical name, and re-key inventory rows, form
    /// rows and the template map accordingly.
    pub async fn normalize_categories(&self) -> Result<(), AppError> {
        let rows = sqlx::query("SELECT rowid, name, frequency_days FROM categories ORDER BY seq, rowid")
            .fetch_all(&self.pool)
            .await?;

        let mut kept: Vec<String> = Vec::new();
        for row in rows {
            let rowid: i64 = row.get("rowid");
            let raw: String = row.get("name");
            let canonical = canonical_category(&raw);

            if canonical.is_empty() || kept.contains(&canonical) {
                sqlx::query("DELETE FROM categories WHERE rowid = ?")
                    .bind(rowid)
                    .execute(&self.pool)
                    .await?;
                continue;
            }
            if raw != canonical {
                sqlx::query("UPDATE categories SET name = ? WHERE rowid = ?")
                    .bind(&canonical)
                    .bind(rowid)
                    .execute(&self.pool)
                    .await?;
            }
            kept.push(canonical);
        }

        // Re-key inventory and form content rows to canonical names.
        let inv_rows = sqlx::query("SELECT DISTINCT category FROM inventory")
            .fetch_all(&self.pool)
            .await?;
        for row in inv_rows {
            let raw: String = row.get("category");
            let canonical = canonical_category(&raw);
            if raw != canonical {
                sqlx::query("UPDATE inventory SET category = ? WHERE category = ?")
                    .bind(&canonical)
                    .bind(&raw)
                    .execute(&self.pool)
                    .await?;
            }
        }

        let form_cats = sqlx::query("SELECT DISTINCT category FROM form_rows")
            .fetch_all(&self.pool)
            .await?;
        for row in form_cats {
            let raw: String = row.get("category");
            let canonical = canonical_category(&raw);
            if raw != canonical {
                sqlx::query("UPDATE form_rows SET category = ? WHERE category = ?")
                    .bind(&canonical)
                    .bind(&raw)
                    .execute(&self.pool)
                    .await?;
            }
        }

        // Merge template map entries under canonical keys; the first
        // non-empty template for a canonical name wins.
        if let Some(forms) = self.get_kv::<FormTemplates>(KV_FORMS).await? {
            let mut merged = FormTemplates::new();
            for (key, sections) in forms {
                let canonical = canonical_category(&key);
                let slot = merged.entry(canonical).or_insert_with(Vec::new);
                if slot.is_empty() {
                    *slot = sections;
                }
            }
            self.put_kv(KV_FORMS, &merged).await?;
        }

        Ok(())
    }

    // ==================== HISTORY OPERATIONS ====================

    /// Append a history entry.
    pub async fn append_history(
        &self,
        bag_name: &str,
        verifier: &str,
        details: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO history (logged_at, bag_name, verifier, details) VALUES (?, ?, ?, ?)",
        )
        .bind(&now)
        .bind(bag_name)
        .bind(verifier)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent entries, newest first.
    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT logged_at, bag_name, verifier, details FROM history ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let logged_at: String = row.get("logged_at");
                HistoryEntry {
                    date_str: format_timestamp(&logged_at),
                    name: row.get("bag_name"),
                    verifier: row.get("verifier"),
                    details: row.get("details"),
                }
            })
            .collect())
    }

    /// Delete the n-th entry counting from the newest (0 = most recent),
    /// matching how the history panel displays them.
    pub async fn delete_history_entry(&self, index_from_newest: i64) -> Result<(), AppError> {
        let row = sqlx::query("SELECT id FROM history ORDER BY id DESC LIMIT 1 OFFSET ?")
            .bind(index_from_newest)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound("History entry not found".to_string()));
        };
        let id: i64 = row.get("id");

        sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.increment_revision().await?;
        Ok(())
    }

    // ==================== FORM TEMPLATE OPERATIONS ====================

    /// Rebuild the template map from the content rows and persist it as a
    /// single blob. Returns the fresh map.
    pub async fn load_form_templates(&self) -> Result<FormTemplates, AppError> {
        let rows = sqlx::query(
            "SELECT category, section, item, kind, def_value, position FROM form_rows ORDER BY category, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut per_category: BTreeMap<String, Vec<FormRow>> = BTreeMap::new();
        for row in rows {
            let category: String = row.get("category");
            per_category.entry(category).or_default().push(FormRow {
                section: row.get("section"),
                item: row.get("item"),
                kind: row.get("kind"),
                default: row.get("def_value"),
                position: row.get("position"),
            });
        }

        let mut templates = FormTemplates::new();
        for (category, rows) in per_category {
            let sections = group_rows(&rows);
            if !sections.is_empty() {
                templates.insert(category, sections);
            }
        }

        self.put_kv(KV_FORMS, &templates).await?;
        Ok(templates)
    }

    /// The current template map, rebuilt from content rows when the stored
    /// blob is absent or corrupt.
    pub async fn form_templates(&self) -> Result<FormTemplates, AppError> {
        match self.get_kv::<FormTemplates>(KV_FORMS).await? {
            Some(templates) => Ok(templates),
            None => self.load_form_templates().await,
        }
    }

    /// Replace one category's content rows and regenerate the template map
    /// wholesale.
    pub async fn replace_category_rows(
        &self,
        category: &str,
        rows: &[FormRow],
    ) -> Result<(), AppError> {
        let category = canonical_category(category);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM form_rows WHERE category = ?")
            .bind(&category)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO form_rows (category, section, item, kind, def_value, position) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&category)
            .bind(&row.section)
            .bind(&row.item)
            .bind(&row.kind)
            .bind(&row.default)
            .bind(&row.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.load_form_templates().await?;
        self.increment_revision().await?;
        Ok(())
    }

    // ==================== PHOTO METADATA OPERATIONS ====================

    pub async fn insert_photo(&self, record: &PhotoRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO photos (id, family, category, bag_name, section, comment, file_name, taken_at, trashed) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&record.id)
        .bind(record.family.as_str())
        .bind(&record.category)
        .bind(&record.bag_name)
        .bind(&record.section)
        .bind(&record.comment)
        .bind(&record.file_name)
        .bind(record.taken_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn photo_by_id(&self, id: &str) -> Result<Option<PhotoRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, family, category, bag_name, section, comment, file_name, taken_at, trashed FROM photos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(photo_from_row))
    }

    /// Live check photos of one composite key, newest first.
    pub async fn photos_for_check_key(
        &self,
        category: &str,
        bag: &str,
        section: &str,
    ) -> Result<Vec<PhotoRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, family, category, bag_name, section, comment, file_name, taken_at, trashed FROM photos WHERE family = 'check' AND category = ? AND bag_name = ? AND section = ? AND trashed = 0 ORDER BY taken_at DESC",
        )
        .bind(category)
        .bind(bag)
        .bind(section)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    /// Live impact photos of one bag, newest first.
    pub async fn photos_for_impact(&self, bag: &str) -> Result<Vec<PhotoRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, family, category, bag_name, section, comment, file_name, taken_at, trashed FROM photos WHERE family = 'impact' AND bag_name = ? AND trashed = 0 ORDER BY taken_at DESC",
        )
        .bind(bag)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    /// Every live photo referencing a bag, both families.
    pub async fn photos_for_bag(&self, bag: &str) -> Result<Vec<PhotoRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, family, category, bag_name, section, comment, file_name, taken_at, trashed FROM photos WHERE bag_name = ? AND trashed = 0",
        )
        .bind(bag)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    /// Every live check photo, for presence map rebuilds.
    pub async fn active_check_photos(&self) -> Result<Vec<PhotoRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, family, category, bag_name, section, comment, file_name, taken_at, trashed FROM photos WHERE family = 'check' AND trashed = 0",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    /// Soft-delete: the metadata row is flagged, the blob goes to the
    /// trash folder, both recoverable.
    pub async fn mark_photo_trashed(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE photos SET trashed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_photo_comment(&self, id: &str, comment: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE photos SET comment = ? WHERE id = ?")
            .bind(comment)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Photo {} not found", id)));
        }
        Ok(())
    }

    pub async fn rename_photo_row(
        &self,
        id: &str,
        new_bag: &str,
        new_file_name: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE photos SET bag_name = ?, file_name = ? WHERE id = ?")
            .bind(new_bag)
            .bind(new_file_name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== PRESENCE MAP & PHOTO EVENTS ====================

    pub async fn photo_presence(&self) -> Result<Option<BTreeMap<String, bool>>, AppError> {
        self.get_kv(KV_PRESENCE).await
    }

    pub async fn put_photo_presence(
        &self,
        map: &BTreeMap<String, bool>,
    ) -> Result<(), AppError> {
        self.put_kv(KV_PRESENCE, map).await
    }

    /// The append-only photo event log, oldest first as stored.
    pub async fn photo_events(&self) -> Result<Vec<PhotoEvent>, AppError> {
        Ok(self.get_kv(KV_PHOTO_EVENTS).await?.unwrap_or_default())
    }

    pub async fn append_photo_event(&self, event: PhotoEvent) -> Result<(), AppError> {
        let mut events = self.photo_events().await?;
        events.push(event);
        self.put_kv(KV_PHOTO_EVENTS, &events).await
    }

    // ==================== OPTIONS, MAIL, MILEAGE ====================

    pub async fn global_options(&self) -> Result<GlobalOptions, AppError> {
        Ok(self.get_kv(KV_OPTIONS).await?.unwrap_or_default())
    }

    pub async fn save_global_options(&self, options: &GlobalOptions) -> Result<(), AppError> {
        self.put_kv(KV_OPTIONS, options).await?;
        self.increment_revision().await?;
        Ok(())
    }

    pub async fn mail_templates(&self) -> Result<MailTemplates, AppError> {
        Ok(self.get_kv(KV_MAIL).await?.unwrap_or_default())
    }

    pub async fn save_mail_templates(&self, templates: &MailTemplates) -> Result<(), AppError> {
        self.put_kv(KV_MAIL, templates).await?;
        self.increment_revision().await?;
        Ok(())
    }

    /// One mileage record per bag, last write wins.
    pub async fn save_mileage(&self, bag_name: &str, record: &MileageRecord) -> Result<(), AppError> {
        let key = format!("{}{}", KV_MILEAGE_PREFIX, sanitize_key(bag_name));
        self.put_kv(&key, record).await?;
        self.increment_revision().await?;
        Ok(())
    }

    /// All mileage records keyed by sanitized bag name.
    pub async fn all_mileages(&self) -> Result<BTreeMap<String, MileageRecord>, AppError> {
        let pattern = format!("{}%", KV_MILEAGE_PREFIX);
        let rows = sqlx::query("SELECT key, value FROM kv WHERE key LIKE ?")
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;

        let mut result = BTreeMap::new();
        for row in rows {
            let key: String = row.get("key");
            let raw: String = row.get("value");
            match serde_json::from_str::<MileageRecord>(&raw) {
                Ok(record) => {
                    result.insert(key[KV_MILEAGE_PREFIX.len()..].to_string(), record);
                }
                Err(e) => tracing::warn!("Corrupt mileage record {}: {}", key, e),
            }
        }
        Ok(result)
    }

    // ==================== DURABLE SNAPSHOT ====================

    pub async fn durable_snapshot(&self) -> Result<Option<SnapshotData>, AppError> {
        self.get_kv(KV_SNAPSHOT).await
    }

    pub async fn put_durable_snapshot(&self, snapshot: &SnapshotData) -> Result<(), AppError> {
        self.put_kv(KV_SNAPSHOT, snapshot).await
    }
}

// Helper functions for row conversion

fn bag_from_row(row: &sqlx::sqlite::SqliteRow) -> Bag {
    let status: String = row.get("status");
    let state: String = row.get("state");
    Bag {
        category: row.get("category"),
        name: row.get("name"),
        last_control: row.get("last_control"),
        next_control: row.get("next_control"),
        status: BagStatus::parse(&status).unwrap_or(BagStatus::Green),
        last_verifier: row.get("last_verifier"),
        next_item_name: row.get("next_item_name"),
        next_item_expiry: row.get("next_item_expiry"),
        mail_orange: row.get("mail_orange"),
        mail_red: row.get("mail_red"),
        state: BagState::parse(&state).unwrap_or(BagState::Actif),
        location: row.get("location"),
        display_order: row.get("display_order"),
    }
}

fn photo_from_row(row: &sqlx::sqlite::SqliteRow) -> PhotoRecord {
    let family: String = row.get("family");
    let trashed: i64 = row.get("trashed");
    PhotoRecord {
        id: row.get("id"),
        family: PhotoFamily::parse(&family).unwrap_or(PhotoFamily::Check),
        category: row.get("category"),
        bag_name: row.get("bag_name"),
        section: row.get("section"),
        comment: row.get("comment"),
        file_name: row.get("file_name"),
        taken_at: row.get("taken_at"),
        trashed: trashed != 0,
    }
}

/// DD/MM/YYYY HH:MM display form of a stored RFC 3339 timestamp; anything
/// unparsable passes through unchanged.
fn format_timestamp(rfc3339: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
        Err(_) => rfc3339.to_string(),
    }
}
