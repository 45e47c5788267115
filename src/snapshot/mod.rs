//! Bootstrap snapshot cache.
//!
//! A three-tier read-through cache over the consolidated read-model:
//!
//! 1. a fast in-process copy with a short TTL;
//! 2. a durable copy persisted in the kv store, which re-seeds tier 1;
//! 3. a full rebuild from the source tables, which persists both tiers.
//!
//! The invalidation contract is deliberately eager: `invalidate` clears
//! tier 1 and synchronously rebuilds and re-persists tier 2 before
//! returning, so a read issued after a completed mutation never sees stale
//! data. Writes pay the full rebuild cost; reads are always fresh.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::{Repository, HISTORY_LIMIT};
use crate::errors::AppError;
use crate::models::{BagState, BagStatus, InventoryStats, SnapshotData};
use crate::photos::PhotoIndex;

/// How long a tier-1 entry stays valid.
pub const FAST_CACHE_TTL: Duration = Duration::from_secs(5);

struct FastEntry {
    stored_at: Instant,
    data: SnapshotData,
}

/// The snapshot cache. Cheap to share behind an `Arc`.
pub struct SnapshotCache {
    repo: Repository,
    photos: Arc<PhotoIndex>,
    ttl: Duration,
    fast: RwLock<Option<FastEntry>>,
}

impl SnapshotCache {
    pub fn new(repo: Repository, photos: Arc<PhotoIndex>) -> Self {
        Self {
            repo,
            photos,
            ttl: FAST_CACHE_TTL,
            fast: RwLock::new(None),
        }
    }

    /// The consolidated read-model: fast cache, then durable copy, then
    /// full rebuild. A rebuild failure is returned as an error value for
    /// the caller to render a degraded view, never a panic.
    pub async fn get(&self) -> Result<SnapshotData, AppError> {
        {
            let fast = self.fast.read().await;
            if let Some(entry) = fast.as_ref() {
                if entry.stored_at.elapsed() < self.ttl {
                    return Ok(entry.data.clone());
                }
            }
        }

        if let Some(snapshot) = self.repo.durable_snapshot().await? {
            self.seed_fast(snapshot.clone()).await;
            return Ok(snapshot);
        }

        self.rebuild().await
    }

    /// Drop the fast copy and synchronously recompute and re-persist the
    /// durable one. Called by every mutating operation before it returns.
    pub async fn invalidate(&self) -> Result<(), AppError> {
        {
            let mut fast = self.fast.write().await;
            *fast = None;
        }
        self.rebuild().await?;
        Ok(())
    }

    /// Full rebuild from the source tables. Persists the durable copy and
    /// re-seeds the fast cache.
    pub async fn rebuild(&self) -> Result<SnapshotData, AppError> {
        let categories = self.repo.list_categories().await?;
        let mut categories_order = Vec::with_capacity(categories.len());
        let mut frequencies = BTreeMap::new();
        for config in &categories {
            categories_order.push(config.name.clone());
            frequencies.insert(config.name.clone(), config.frequency_days);
        }

        let inventory = self.repo.list_bags().await?;

        let mut dashboard: BTreeMap<String, Vec<_>> = BTreeMap::new();
        let mut stats = InventoryStats::default();
        for bag in &inventory {
            dashboard
                .entry(bag.category.clone())
                .or_default()
                .push(bag.clone());

            // HS bags keep their stored status but never count.
            if bag.state == BagState::Hs {
                continue;
            }
            match bag.status {
                BagStatus::Green => stats.ok += 1,
                BagStatus::Orange => stats.orange += 1,
                BagStatus::Red => stats.red += 1,
                BagStatus::Purple => stats.expired_items += 1,
            }
        }

        let snapshot = SnapshotData {
            inventory,
            dashboard,
            categories_order,
            frequencies,
            forms: self.repo.form_templates().await?,
            history: self.repo.recent_history(HISTORY_LIMIT).await?,
            options: self.repo.global_options().await?,
            mail_templates: self.repo.mail_templates().await?,
            stats,
            photo_presence: self.photos.presence_map().await?,
            mileages: self.repo.all_mileages().await?,
            generated_at: Utc::now().to_rfc3339(),
        };

        self.repo.put_durable_snapshot(&snapshot).await?;
        self.seed_fast(snapshot.clone()).await;
        Ok(snapshot)
    }

    async fn seed_fast(&self, data: SnapshotData) {
        let mut fast = self.fast.write().await;
        *fast = Some(FastEntry {
            stored_at: Instant::now(),
            data,
        });
    }
}
