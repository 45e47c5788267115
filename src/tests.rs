//! Integration tests for the kitcheck backend.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::errors::AppError;
use crate::mailer::Mailer;
use crate::models::BagStatus;
use crate::photos::{PhotoIndex, PhotoStore};
use crate::snapshot::SnapshotCache;
use crate::{create_router, AppState};

/// A mail captured by the recording transport.
struct SentMail {
    to: String,
    subject: String,
    body: String,
}

/// Test transport: records every mail, and can be told to refuse one
/// recipient to exercise per-item failure isolation.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail_recipient: Mutex<Option<String>>,
}

impl RecordingMailer {
    fn fail_for(&self, recipient: &str) {
        *self.fail_recipient.lock().unwrap() = Some(recipient.to_string());
    }

    fn sent_to(&self, recipient: &str) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to == recipient)
            .map(|m| (m.subject.clone(), m.body.clone()))
            .collect()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        if let Some(bad) = self.fail_recipient.lock().unwrap().as_deref() {
            if to == bad {
                return Err(AppError::Mail("transport refused".to_string()));
            }
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Repository,
    pool: SqlitePool,
    mailer: Arc<RecordingMailer>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let photo_dir = temp_dir.path().join("photos");
        let psk = "test-api-key".to_string();

        // Initialize database and services
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Repository::new(pool.clone());
        let store = PhotoStore::open(&photo_dir).expect("Failed to init photo store");
        let photos = Arc::new(PhotoIndex::new(repo.clone(), store));
        let cache = Arc::new(SnapshotCache::new(repo.clone(), photos.clone()));
        let mailer = Arc::new(RecordingMailer::default());

        // Create config
        let config = Config {
            api_psk: Some(psk.clone()),
            db_path,
            photo_dir,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            alert_hour: 7,
        };

        let state = AppState {
            repo: Arc::new(repo.clone()),
            photos,
            cache,
            mailer: mailer.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", psk.parse().unwrap());
        let client = Client::builder().default_headers(headers).build().unwrap();

        TestFixture {
            client,
            base_url,
            repo,
            pool,
            mailer,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a category (default frequency) and one bag in it.
    async fn create_bag(&self, category: &str, name: &str) {
        self.client
            .post(self.url("/api/categories"))
            .json(&json!({ "name": category }))
            .send()
            .await
            .unwrap();

        let resp = self
            .client
            .post(self.url("/api/bags"))
            .json(&json!({ "category": category, "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    async fn bootstrap(&self) -> Value {
        let resp = self
            .client
            .get(self.url("/api/bootstrap"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        body["data"].clone()
    }
}

/// 1x1 pixel, enough for a blob round trip.
const PHOTO_PAYLOAD: &str = "data:image/jpeg;base64,aGVsbG8ta2l0Y2hlY2s=";

fn today_iso() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_rejects_missing_and_wrong_key() {
    let fixture = TestFixture::new().await;

    // No key at all
    let bare = Client::new();
    let resp = bare
        .get(fixture.url("/api/bootstrap"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Wrong key
    let resp = bare
        .get(fixture.url("/api/bootstrap"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_bootstrap_shape() {
    let fixture = TestFixture::new().await;

    let data = fixture.bootstrap().await;
    assert!(data["inventory"].is_array());
    assert!(data["dashboard"].is_object());
    assert!(data["categoriesOrder"].is_array());
    assert!(data["frequencies"].is_object());
    assert!(data["forms"].is_object());
    assert!(data["history"].is_array());
    assert!(data["options"]["enableExpiry"].is_boolean());
    assert!(data["mailTemplates"]["redSubject"].is_string());
    assert!(data["stats"]["ok"].is_number());
    assert!(data["photoPresence"].is_object());
    assert!(data["mileages"].is_object());
    assert!(data["generatedAt"].is_string());
}

#[tokio::test]
async fn test_save_check_green_lifecycle() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .post(fixture.url("/api/checks"))
        .json(&json!({
            "bagName": "VLI 1",
            "answers": { "Stéthoscope (1)": true },
            "verifier": "Jean"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "green");
    assert_eq!(body["data"]["lastControl"], today_iso());
    assert_eq!(body["data"]["lastVerifier"], "Jean");

    // Default frequency is 30 days
    let expected_next = (Utc::now().date_naive() + chrono::Duration::days(30))
        .format("%Y-%m-%d")
        .to_string();
    assert_eq!(body["data"]["nextControl"], expected_next);

    // The history entry landed and the snapshot is already fresh
    let data = fixture.bootstrap().await;
    assert_eq!(data["history"][0]["name"], "VLI 1");
    assert_eq!(data["history"][0]["verifier"], "Jean");
    assert_eq!(data["stats"]["ok"], 1);
}

#[tokio::test]
async fn test_save_check_expired_item_goes_purple() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .post(fixture.url("/api/checks"))
        .json(&json!({
            "bagName": "VLI 1",
            "answers": { "Adrénaline 1 mg / 1 ml": false },
            "nextItemName": "Adrénaline",
            "nextItemExpiry": "2025-01-01",
            "verifier": "Jean",
            "elapsed": "12min"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "purple");
    assert_eq!(body["data"]["nextItemExpiry"], "2025-01-01");

    let data = fixture.bootstrap().await;
    let details = data["history"][0]["details"].as_str().unwrap();
    assert!(details.contains("OBJET PÉRIMÉ : Adrénaline"));
    assert!(details.contains("[⏱️ 12min]"));
    assert_eq!(data["stats"]["expiredItems"], 1);
}

#[tokio::test]
async fn test_save_check_unknown_bag_is_not_found() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/checks"))
        .json(&json!({
            "bagName": "Ghost",
            "answers": {},
            "verifier": "Jean"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_rename_bag_propagates_everywhere() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    // One history entry and one photo under the old name
    fixture
        .client
        .post(fixture.url("/api/checks"))
        .json(&json!({ "bagName": "VLI 1", "answers": {}, "verifier": "Jean" }))
        .send()
        .await
        .unwrap();
    fixture
        .client
        .post(fixture.url("/api/photos"))
        .json(&json!({
            "category": "VLI",
            "bag": "VLI 1",
            "section": "Haut",
            "data": PHOTO_PAYLOAD
        }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .put(fixture.url("/api/bags/VLI 1/rename"))
        .json(&json!({ "newName": "VLI A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;

    // Inventory row renamed
    let names: Vec<&str> = data["inventory"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"VLI A"));
    assert!(!names.contains(&"VLI 1"));

    // History followed, count preserved
    let entries: Vec<&Value> = data["history"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|h| h["name"] == "VLI A")
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(data["history"]
        .as_array()
        .unwrap()
        .iter()
        .all(|h| h["name"] != "VLI 1"));

    // Presence map re-keyed to the new name
    assert_eq!(data["photoPresence"]["VLI__VLI_A__Haut"], true);
    assert!(data["photoPresence"].get("VLI__VLI_1__Haut").is_none());

    // The photo is listed under the new name
    let resp = fixture
        .client
        .get(fixture.url("/api/photos?category=VLI&bag=VLI A&section=Haut"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_category_scoping() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;
    fixture.create_bag("SAC ISP", "Sac ISP 1").await;

    // History for the soon-to-be-deleted bag
    fixture
        .client
        .post(fixture.url("/api/checks"))
        .json(&json!({ "bagName": "VLI 1", "answers": {}, "verifier": "Jean" }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .delete(fixture.url("/api/categories/VLI"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;

    // The category, its frequency and its bags are gone
    assert!(!data["categoriesOrder"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c == "VLI"));
    assert!(data["frequencies"].get("VLI").is_none());
    assert!(data["inventory"]
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["category"] != "VLI"));

    // The other category survives
    assert_eq!(data["inventory"].as_array().unwrap().len(), 1);
    assert_eq!(data["inventory"][0]["category"], "SAC ISP");

    // History is an audit log: orphaned entries stay
    assert_eq!(data["history"][0]["name"], "VLI 1");
}

#[tokio::test]
async fn test_duplicate_categories_collapse_to_canonical() {
    let fixture = TestFixture::new().await;

    // Seed duplicate spellings directly, as legacy data would have them
    sqlx::query("INSERT INTO categories (name, frequency_days, seq) VALUES ('Sac ISP', 30, 1), ('SAC ISP', 45, 2)")
        .execute(&fixture.pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO form_rows (category, section, item, kind) VALUES ('Sac ISP', 'Dessus', 'Ampoulier (1)', 'case')")
        .execute(&fixture.pool)
        .await
        .unwrap();

    fixture.repo.normalize_categories().await.unwrap();

    let categories = fixture.repo.list_categories().await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "SAC ISP");
    // The first row wins the merge
    assert_eq!(categories[0].frequency_days, 30);

    // Form rows were re-keyed and the template landed under the canonical name
    let templates = fixture.repo.load_form_templates().await.unwrap();
    assert!(templates.contains_key("SAC ISP"));
    assert!(!templates.contains_key("Sac ISP"));
}

#[tokio::test]
async fn test_batch_updates_report_unmatched_names() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .put(fixture.url("/api/bags/locations"))
        .json(&json!([
            { "name": "VLI 1", "location": "Garage Nord" },
            { "name": "Ghost", "location": "Nulle part" }
        ]))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["matched"], json!(["VLI 1"]));
    assert_eq!(body["data"]["unmatched"], json!(["Ghost"]));

    let data = fixture.bootstrap().await;
    assert_eq!(data["inventory"][0]["location"], "Garage Nord");

    // Same semantics for display orders
    let resp = fixture
        .client
        .put(fixture.url("/api/bags/orders"))
        .json(&json!([
            { "name": "VLI 1", "order": 5 },
            { "name": "Ghost", "order": 1 }
        ]))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["matched"], json!(["VLI 1"]));
    assert_eq!(body["data"]["unmatched"], json!(["Ghost"]));
}

#[tokio::test]
async fn test_photo_presence_follows_add_and_delete() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    // Two photos on the same key
    let mut ids = Vec::new();
    for _ in 0..2 {
        let resp = fixture
            .client
            .post(fixture.url("/api/photos"))
            .json(&json!({
                "category": "VLI",
                "bag": "VLI 1",
                "section": "Haut",
                "data": PHOTO_PAYLOAD
            }))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        ids.push(body["data"]["fileId"].as_str().unwrap().to_string());
    }

    let data = fixture.bootstrap().await;
    assert_eq!(data["photoPresence"]["VLI__VLI_1__Haut"], true);

    // Deleting one photo keeps the key present
    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/photos/{}", ids[0])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let data = fixture.bootstrap().await;
    assert_eq!(data["photoPresence"]["VLI__VLI_1__Haut"], true);

    // Deleting the last one clears it
    fixture
        .client
        .delete(fixture.url(&format!("/api/photos/{}", ids[1])))
        .send()
        .await
        .unwrap();
    let data = fixture.bootstrap().await;
    assert!(data["photoPresence"].get("VLI__VLI_1__Haut").is_none());

    // The event log kept the whole story: add, modify, two deletes
    let resp = fixture
        .client
        .get(fixture.url("/api/photos/events"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let actions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions.iter().filter(|a| **a == "delete").count(), 2);
    assert!(actions.contains(&"add"));
    assert!(actions.contains(&"modify"));
}

#[tokio::test]
async fn test_latest_photo_meta() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .get(fixture.url("/api/photos/latest?category=VLI&bag=VLI 1&section=Haut"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["hasPhoto"], false);

    fixture
        .client
        .post(fixture.url("/api/photos"))
        .json(&json!({
            "category": "VLI",
            "bag": "VLI 1",
            "section": "Haut",
            "data": PHOTO_PAYLOAD
        }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .get(fixture.url("/api/photos/latest?category=VLI&bag=VLI 1&section=Haut"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["hasPhoto"], true);
    assert!(body["data"]["dataUrl"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_impact_photo_lifecycle() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .post(fixture.url("/api/impacts"))
        .json(&json!({
            "bag": "VLI 1",
            "data": PHOTO_PAYLOAD,
            "comment": "Rayure portière"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let file_id = body["data"]["fileId"].as_str().unwrap().to_string();

    let resp = fixture
        .client
        .get(fixture.url("/api/impacts/VLI 1"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["comment"], "Rayure portière");

    // Edit the comment
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/impacts/{}/comment", file_id)))
        .json(&json!({ "comment": "Rayure réparée" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url("/api/impacts/VLI 1"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["comment"], "Rayure réparée");

    // Delete it
    fixture
        .client
        .delete(fixture.url(&format!("/api/impacts/{}", file_id)))
        .send()
        .await
        .unwrap();
    let resp = fixture
        .client
        .get(fixture.url("/api/impacts/VLI 1"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_mileage_last_write_wins() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    for km in [12500.0, 12780.5] {
        let resp = fixture
            .client
            .put(fixture.url("/api/mileage"))
            .json(&json!({ "bagName": "VLI 1", "km": km, "date": "2026-08-01" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let data = fixture.bootstrap().await;
    assert_eq!(data["mileages"]["VLI_1"]["km"], 12780.5);
    assert_eq!(data["mileages"]["VLI_1"]["date"], "2026-08-01");
}

#[tokio::test]
async fn test_delete_history_entry_by_newest_index() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;
    fixture.create_bag("VLI", "VLI 2").await;

    for bag in ["VLI 1", "VLI 2"] {
        fixture
            .client
            .post(fixture.url("/api/checks"))
            .json(&json!({ "bagName": bag, "answers": {}, "verifier": "Jean" }))
            .send()
            .await
            .unwrap();
    }

    // Newest first: index 0 is the VLI 2 check
    let data = fixture.bootstrap().await;
    assert_eq!(data["history"][0]["name"], "VLI 2");

    let resp = fixture
        .client
        .delete(fixture.url("/api/history/0"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;
    assert_eq!(data["history"].as_array().unwrap().len(), 1);
    assert_eq!(data["history"][0]["name"], "VLI 1");

    // Out of range is an explicit not-found
    let resp = fixture
        .client
        .delete(fixture.url("/api/history/5"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_alert_sweep_routes_and_isolates_failures() {
    let fixture = TestFixture::new().await;
    for name in ["Rouge", "Orange", "Vert", "Panne", "Muet", "Périmé"] {
        fixture.create_bag("VLI", name).await;
    }

    // Templates with placeholders so substitution is observable
    fixture
        .client
        .put(fixture.url("/api/mail-templates"))
        .json(&json!({
            "orangeSubject": "ORANGE {nom}",
            "orangeBody": "{nom} à vérifier avant le {echeance}",
            "redSubject": "ROUGE {nom}",
            "redBody": "{nom} ({categorie}) en retard depuis le {echeance}"
        }))
        .send()
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let past = "2020-01-31";
    let soon = (today + chrono::Duration::days(10))
        .format("%Y-%m-%d")
        .to_string();
    let far = (today + chrono::Duration::days(90))
        .format("%Y-%m-%d")
        .to_string();

    // Overdue control date -> red
    fixture
        .repo
        .apply_check("Rouge", "2020-01-01", past, BagStatus::Green, "Jean", "", "")
        .await
        .unwrap();
    // Control due in 10 days -> orange
    fixture
        .repo
        .apply_check("Orange", &today_iso(), &soon, BagStatus::Green, "Jean", "", "")
        .await
        .unwrap();
    // Far away -> green, never mailed
    fixture
        .repo
        .apply_check("Vert", &today_iso(), &far, BagStatus::Green, "Jean", "", "")
        .await
        .unwrap();
    // Overdue but out of service -> ignored
    fixture
        .repo
        .apply_check("Panne", "2020-01-01", past, BagStatus::Green, "Jean", "", "")
        .await
        .unwrap();
    // Overdue with no recipient -> silently skipped
    fixture
        .repo
        .apply_check("Muet", "2020-01-01", past, BagStatus::Green, "Jean", "", "")
        .await
        .unwrap();
    // Expired item -> purple, mailed through the red channel
    fixture
        .repo
        .apply_check("Périmé", &today_iso(), &far, BagStatus::Green, "Jean", "Adrénaline", "2020-06-01")
        .await
        .unwrap();

    for (bag, body) in [
        ("Rouge", json!({ "mailRed": "rouge@example.com" })),
        ("Orange", json!({ "mailOrange": "orange@example.com" })),
        ("Panne", json!({ "mailRed": "panne@example.com" })),
        ("Périmé", json!({ "mailRed": "perime@example.com" })),
    ] {
        fixture
            .client
            .put(fixture.url(&format!("/api/bags/{}/alert-recipients", bag)))
            .json(&body)
            .send()
            .await
            .unwrap();
    }
    fixture
        .client
        .put(fixture.url("/api/bags/Panne/state"))
        .json(&json!({ "state": "HS" }))
        .send()
        .await
        .unwrap();

    // One recipient refuses delivery; the rest of the batch must go out
    fixture.mailer.fail_for("perime@example.com");

    let resp = fixture
        .client
        .post(fixture.url("/api/alerts/run"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["sent"], 2);
    assert_eq!(body["data"]["skipped"], 1);
    assert_eq!(body["data"]["failed"], 1);

    // Red template with substituted placeholders went to the red address
    let red = fixture.mailer.sent_to("rouge@example.com");
    assert_eq!(red.len(), 1);
    assert_eq!(red[0].0, "ROUGE Rouge");
    assert_eq!(red[0].1, "Rouge (VLI) en retard depuis le 31/01/2020");

    let orange = fixture.mailer.sent_to("orange@example.com");
    assert_eq!(orange.len(), 1);
    assert_eq!(orange[0].0, "ORANGE Orange");

    // Out-of-service and failing recipients got nothing
    assert!(fixture.mailer.sent_to("panne@example.com").is_empty());
    assert!(fixture.mailer.sent_to("perime@example.com").is_empty());

    // The sweep reclassified the bags and refreshed the snapshot
    let data = fixture.bootstrap().await;
    let by_name = |name: &str| {
        data["inventory"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["name"] == name)
            .unwrap()
            .clone()
    };
    assert_eq!(by_name("Rouge")["status"], "red");
    assert_eq!(by_name("Orange")["status"], "orange");
    assert_eq!(by_name("Vert")["status"], "green");
    assert_eq!(by_name("Périmé")["status"], "purple");
}

#[tokio::test]
async fn test_read_after_write_is_never_stale() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    // Warm the fast cache
    let data = fixture.bootstrap().await;
    assert_eq!(data["inventory"].as_array().unwrap().len(), 1);

    // Mutate and read back immediately, well inside the cache TTL
    fixture.create_bag("VLI", "VLI 2").await;
    let data = fixture.bootstrap().await;
    assert_eq!(data["inventory"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_bootstrap_rebuild_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .post(fixture.url("/api/bootstrap/rebuild"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["inventory"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_template_regenerates_forms() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;

    let resp = fixture
        .client
        .put(fixture.url("/api/categories/VLI/template"))
        .json(&json!({
            "rows": [
                { "section": "Solutés", "item": "NaCl 0.9% 500ml (1)", "kind": "case", "default": "true", "position": "Poche principale" },
                { "section": "Solutés", "item": "Kit Perfalgan (1)", "kind": "case", "default": "true" },
                { "section": "Péremptions", "item": "Adrénaline 1 mg", "kind": "date", "default": "2027-07-31" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;
    let sections = data["forms"]["VLI"].as_array().unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0]["section"], "Solutés");
    assert_eq!(sections[0]["position"], "Poche principale");
    assert_eq!(sections[0]["items"].as_array().unwrap().len(), 2);
    assert_eq!(sections[1]["items"][0]["kind"], "date");

    // Replacing the rows regenerates the whole template
    fixture
        .client
        .put(fixture.url("/api/categories/VLI/template"))
        .json(&json!({
            "rows": [
                { "section": "Unique", "item": "Stéthoscope (1)", "kind": "case", "default": "true" }
            ]
        }))
        .send()
        .await
        .unwrap();

    let data = fixture.bootstrap().await;
    let sections = data["forms"]["VLI"].as_array().unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0]["section"], "Unique");
}

#[tokio::test]
async fn test_rename_category_rekeys_templates_and_inventory() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("SAC IADE", "Sac IADE 1").await;

    fixture
        .client
        .put(fixture.url("/api/categories/SAC IADE/template"))
        .json(&json!({
            "rows": [
                { "section": "Contenu général", "item": "À définir", "kind": "case", "default": "true" }
            ]
        }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .put(fixture.url("/api/categories/SAC IADE/rename"))
        .json(&json!({ "newName": "SAC ANESTH" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;
    assert!(data["frequencies"].get("SAC IADE").is_none());
    assert!(data["frequencies"].get("SAC ANESTH").is_some());
    assert_eq!(data["inventory"][0]["category"], "SAC ANESTH");
    assert!(data["forms"].get("SAC ANESTH").is_some());
    assert!(data["forms"].get("SAC IADE").is_none());
}

#[tokio::test]
async fn test_set_bag_state_excludes_from_stats() {
    let fixture = TestFixture::new().await;
    fixture.create_bag("VLI", "VLI 1").await;
    fixture.create_bag("VLI", "VLI 2").await;

    let resp = fixture
        .client
        .put(fixture.url("/api/bags/VLI 2/state"))
        .json(&json!({ "state": "HS" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;
    // The HS bag keeps its stored status but no longer counts
    assert_eq!(data["stats"]["ok"], 1);
    let hs = data["inventory"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["name"] == "VLI 2")
        .unwrap();
    assert_eq!(hs["state"], "HS");
    assert_eq!(hs["status"], "green");
}

#[tokio::test]
async fn test_save_options_roundtrip() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.url("/api/options"))
        .json(&json!({
            "enableExpiry": true,
            "enableQr": false,
            "enableVerifier": true,
            "enablePhotos": false
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = fixture.bootstrap().await;
    assert_eq!(data["options"]["enableQr"], false);
    assert_eq!(data["options"]["enablePhotos"], false);
    assert_eq!(data["options"]["enableExpiry"], true);
}
