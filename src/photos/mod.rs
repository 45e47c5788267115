//! Photo attachment index.
//!
//! Blob bytes live on the filesystem; each blob has a metadata record in
//! the `photos` table. The presence map (sanitized key -> true) is a
//! derived cache over the metadata, updated on every mutation and
//! rebuildable by a full scan, so it is never left stale after a mutating
//! call returns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    blob_file_name, photo_key, sanitize_key, LatestPhotoMeta, PhotoAction, PhotoEvent,
    PhotoFamily, PhotoRecord, PhotoSaved, PhotoView,
};

/// Filesystem blob store. Deleted blobs move to a trash subfolder and stay
/// recoverable.
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    /// Open the store, creating the photo and trash directories.
    pub fn open(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root.join("trash"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), AppError> {
        tokio::fs::write(self.root.join(file_name), bytes).await?;
        Ok(())
    }

    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(self.root.join(file_name)).await?)
    }

    /// Soft-delete: move the blob into the trash folder.
    pub async fn trash(&self, file_name: &str) -> Result<(), AppError> {
        tokio::fs::rename(self.root.join(file_name), self.root.join("trash").join(file_name))
            .await?;
        Ok(())
    }

    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<(), AppError> {
        tokio::fs::rename(self.root.join(old_name), self.root.join(new_name)).await?;
        Ok(())
    }
}

/// Coordinates the blob store, the metadata rows, the presence map and the
/// photo event log.
pub struct PhotoIndex {
    repo: Repository,
    store: PhotoStore,
}

impl PhotoIndex {
    pub fn new(repo: Repository, store: PhotoStore) -> Self {
        Self { repo, store }
    }

    /// Store a check photo. Always appends a new blob; the event is logged
    /// as "add" or "modify" depending on whether the key already had one.
    pub async fn save_check_photo(
        &self,
        category: &str,
        bag: &str,
        section: &str,
        data: &str,
    ) -> Result<PhotoSaved, AppError> {
        let bytes = decode_photo_payload(data)?;
        let taken_at = Utc::now().timestamp_millis();
        let sanitized = sanitize_key(&photo_key(category, bag, section));
        let file_name = blob_file_name(PhotoFamily::Check, &sanitized, taken_at);

        let existing = self.repo.photos_for_check_key(category, bag, section).await?;
        let action = if existing.is_empty() {
            PhotoAction::Add
        } else {
            PhotoAction::Modify
        };

        self.store.write(&file_name, &bytes).await?;

        let record = PhotoRecord {
            id: uuid::Uuid::new_v4().to_string(),
            family: PhotoFamily::Check,
            category: category.to_string(),
            bag_name: bag.to_string(),
            section: section.to_string(),
            comment: String::new(),
            file_name: file_name.clone(),
            taken_at,
            trashed: false,
        };
        self.repo.insert_photo(&record).await?;

        self.log_event(action, &record).await;

        let mut presence = self.presence_map().await?;
        presence.insert(sanitized, true);
        self.repo.put_photo_presence(&presence).await?;

        tracing::info!("Photo saved for {}: {}", bag, file_name);
        Ok(PhotoSaved {
            file_id: record.id,
            file_name,
            timestamp: taken_at,
        })
    }

    /// All live check photos of a key, newest first, blobs re-encoded as
    /// data URLs. A blob that cannot be read back is skipped with a log
    /// line rather than failing the whole listing.
    pub async fn list_check_photos(
        &self,
        category: &str,
        bag: &str,
        section: &str,
    ) -> Result<Vec<PhotoView>, AppError> {
        let records = self.repo.photos_for_check_key(category, bag, section).await?;
        self.views_for(records).await
    }

    /// Newest photo of a key, or an explicit "no photo" marker.
    pub async fn latest_check_photo_meta(
        &self,
        category: &str,
        bag: &str,
        section: &str,
    ) -> Result<LatestPhotoMeta, AppError> {
        let photos = self.list_check_photos(category, bag, section).await?;
        Ok(match photos.into_iter().next() {
            Some(photo) => LatestPhotoMeta {
                has_photo: true,
                file_id: Some(photo.file_id),
                timestamp: Some(photo.timestamp),
                data_url: Some(photo.data_url),
            },
            None => LatestPhotoMeta {
                has_photo: false,
                file_id: None,
                timestamp: None,
                data_url: None,
            },
        })
    }

    /// Soft-delete a photo of either family and bring the presence map back
    /// in line with the remaining blobs for that key. If the metadata row
    /// has gone missing the whole map is rebuilt from a full scan.
    pub async fn delete_photo(&self, file_id: &str) -> Result<(), AppError> {
        let Some(record) = self.repo.photo_by_id(file_id).await? else {
            // No metadata to recover the key from; rebuild wholesale.
            self.rebuild_presence().await?;
            return Err(AppError::NotFound(format!("Photo {} not found", file_id)));
        };

        self.repo.mark_photo_trashed(file_id).await?;
        if let Err(e) = self.store.trash(&record.file_name).await {
            tracing::warn!("Could not move blob {} to trash: {}", record.file_name, e);
        }

        self.log_event(PhotoAction::Delete, &record).await;

        if record.family == PhotoFamily::Check {
            let remaining = self
                .repo
                .photos_for_check_key(&record.category, &record.bag_name, &record.section)
                .await?;
            let mut presence = self.presence_map().await?;
            if remaining.is_empty() {
                presence.remove(&record.presence_key());
            } else {
                presence.insert(record.presence_key(), true);
            }
            self.repo.put_photo_presence(&presence).await?;
        }

        tracing::info!("Photo deleted: {}", file_id);
        Ok(())
    }

    /// Store an impact photo, keyed by bag name alone with a free-text
    /// comment.
    pub async fn save_impact_photo(
        &self,
        bag: &str,
        data: &str,
        comment: &str,
    ) -> Result<PhotoSaved, AppError> {
        let bytes = decode_photo_payload(data)?;
        let taken_at = Utc::now().timestamp_millis();
        let file_name = blob_file_name(PhotoFamily::Impact, &sanitize_key(bag), taken_at);

        self.store.write(&file_name, &bytes).await?;

        let record = PhotoRecord {
            id: uuid::Uuid::new_v4().to_string(),
            family: PhotoFamily::Impact,
            category: String::new(),
            bag_name: bag.to_string(),
            section: String::new(),
            comment: comment.to_string(),
            file_name: file_name.clone(),
            taken_at,
            trashed: false,
        };
        self.repo.insert_photo(&record).await?;
        self.log_event(PhotoAction::Add, &record).await;

        Ok(PhotoSaved {
            file_id: record.id,
            file_name,
            timestamp: taken_at,
        })
    }

    /// All live impact photos of a bag, newest first.
    pub async fn list_impact_photos(&self, bag: &str) -> Result<Vec<PhotoView>, AppError> {
        let records = self.repo.photos_for_impact(bag).await?;
        self.views_for(records).await
    }

    pub async fn update_impact_comment(
        &self,
        file_id: &str,
        comment: &str,
    ) -> Result<(), AppError> {
        self.repo.update_photo_comment(file_id, comment).await
    }

    /// Re-key every photo of a renamed bag, both families: metadata rows
    /// and blob file names. The presence map cannot be patched incrementally
    /// because the key itself changed, so it is rebuilt afterwards.
    pub async fn rename_bag(&self, old_name: &str, new_name: &str) -> Result<(), AppError> {
        let records = self.repo.photos_for_bag(old_name).await?;

        for record in &records {
            let sanitized = match record.family {
                PhotoFamily::Check => {
                    sanitize_key(&photo_key(&record.category, new_name, &record.section))
                }
                PhotoFamily::Impact => sanitize_key(new_name),
            };
            let new_file_name = blob_file_name(record.family, &sanitized, record.taken_at);

            if let Err(e) = self.store.rename(&record.file_name, &new_file_name).await {
                tracing::warn!("Could not rename blob {}: {}", record.file_name, e);
            }
            self.repo
                .rename_photo_row(&record.id, new_name, &new_file_name)
                .await?;
        }

        self.rebuild_presence().await?;
        Ok(())
    }

    /// The presence map, rebuilt from metadata when the cached copy is
    /// absent or corrupt.
    pub async fn presence_map(&self) -> Result<BTreeMap<String, bool>, AppError> {
        match self.repo.photo_presence().await? {
            Some(map) => Ok(map),
            None => self.rebuild_presence().await,
        }
    }

    /// Full-scan rebuild of the presence map from live check-photo
    /// metadata.
    pub async fn rebuild_presence(&self) -> Result<BTreeMap<String, bool>, AppError> {
        let mut map = BTreeMap::new();
        for record in self.repo.active_check_photos().await? {
            map.insert(record.presence_key(), true);
        }
        self.repo.put_photo_presence(&map).await?;
        Ok(map)
    }

    /// The photo event log, newest first.
    pub async fn events_newest_first(&self) -> Result<Vec<PhotoEvent>, AppError> {
        let mut events = self.repo.photo_events().await?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    async fn views_for(&self, records: Vec<PhotoRecord>) -> Result<Vec<PhotoView>, AppError> {
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let bytes = match self.store.read(&record.file_name).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Unreadable blob {}: {}", record.file_name, e);
                    continue;
                }
            };
            views.push(PhotoView {
                file_id: record.id,
                file_name: record.file_name,
                timestamp: record.taken_at,
                date_str: format_millis(record.taken_at),
                data_url: format!("data:image/jpeg;base64,{}", BASE64.encode(&bytes)),
                comment: record.comment,
            });
        }
        Ok(views)
    }

    /// Event log writes are best effort; a failure must not fail the photo
    /// operation itself.
    async fn log_event(&self, action: PhotoAction, record: &PhotoRecord) {
        let category = if record.category.is_empty() {
            match self.repo.get_bag(&record.bag_name).await {
                Ok(Some(bag)) => bag.category,
                _ => String::new(),
            }
        } else {
            record.category.clone()
        };

        let event = PhotoEvent {
            action,
            bag_name: record.bag_name.clone(),
            category,
            file_id: record.id.clone(),
            file_name: record.file_name.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.repo.append_photo_event(event).await {
            tracing::warn!("Could not log photo event: {}", e);
        }
    }
}

/// Decode a base64 photo payload, with or without its data-URL header.
pub fn decode_photo_payload(data: &str) -> Result<Vec<u8>, AppError> {
    let raw = match data.split_once(',') {
        Some((header, rest)) if header.starts_with("data:") => rest,
        _ => data,
    };
    BASE64
        .decode(raw.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid photo payload: {}", e)))
}

fn format_millis(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
        None => String::new(),
    }
}
