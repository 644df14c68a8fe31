use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use tally::config::PortabilityConfig;
use tally::database::entities::{categories, currencies, fields, files, settings, transactions};
use tally::database::test_utils::{create_test_user, setup_test_db};
use tally::errors::{CoreErrorKind, ImportExportResult};
use tally::registry::{ModelDescriptor, ModelRegistry};
use tally::services::{NoopProgress, ProgressReporter, RestoreService};
use tally::storage::AttachmentStorage;
use tally::AppContext;

struct Env {
    db: DatabaseConnection,
    app: AppContext,
    _uploads: TempDir,
}

async fn env_with(tenant: &str, config: PortabilityConfig) -> Result<Env> {
    let uploads = TempDir::new()?;
    let db = setup_test_db().await?;
    create_test_user(&db, tenant).await?;
    let app = AppContext::new(db.clone(), config.with_uploads_root(uploads.path()));
    Ok(Env {
        db,
        app,
        _uploads: uploads,
    })
}

async fn env(tenant: &str) -> Result<Env> {
    env_with(tenant, PortabilityConfig::default()).await
}

/// Settings, lookups, fields, two attachments on disk and one transaction
/// referencing both.
async fn seed_account(env: &Env, tenant: &str) -> Result<()> {
    let db = &env.db;
    settings::ActiveModel::from_json(json!({
        "user_id": tenant, "code": "default_currency", "value": "EUR"
    }))?
    .insert(db)
    .await?;
    currencies::ActiveModel::from_json(json!({
        "user_id": tenant, "code": "EUR", "name": "Euro"
    }))?
    .insert(db)
    .await?;
    categories::ActiveModel::from_json(json!({
        "user_id": tenant, "code": "food", "name": "Food", "color": "#ff8800",
        "llm_prompt": null, "created_at": "2024-01-01T00:00:00Z"
    }))?
    .insert(db)
    .await?;
    env.app.field_service().seed_default_fields(tenant).await?;
    fields::ActiveModel::from_json(json!({
        "user_id": tenant, "code": "vat", "name": "VAT", "type": "number",
        "llm_prompt": null, "options": null, "position": 20,
        "is_visible_in_list": false, "is_visible_in_analysis": false,
        "is_required": false, "is_extra": true, "created_at": "2024-01-01T00:00:00Z"
    }))?
    .insert(db)
    .await?;

    env.app
        .storage()
        .write(tenant, "2024/01/receipt.pdf", b"%PDF-1.4 receipt")
        .await?;
    env.app
        .storage()
        .write(tenant, "2024/01/photo.png", &[0x89, 0x50, 0x4e, 0x47, 0, 1, 2, 3])
        .await?;
    for (id, path, filename) in [
        ("f1", "/uploads/2024/01/receipt.pdf", "receipt.pdf"),
        ("f2", "2024/01/photo.png", "photo.png"),
    ] {
        files::ActiveModel::from_json(json!({
            "id": id, "user_id": tenant, "filename": filename, "path": path,
            "mimetype": "application/octet-stream", "metadata": {"pages": 1},
            "is_reviewed": true, "is_splitted": false, "cached_parse_result": null,
            "created_at": "2024-01-05T10:00:00Z"
        }))?
        .insert(db)
        .await?;
    }

    transactions::ActiveModel::from_json(json!({
        "id": "t1", "user_id": tenant, "name": "Coffee", "note": "12345",
        "type": "expense", "total": 550, "currency_code": "EUR",
        "issued_at": "2024-01-05T09:30:00Z", "category_code": "food",
        "files": ["f1", "f2"], "extra": {"vat": 19, "retired": "gone"},
        "created_at": "2024-01-05T10:00:00Z", "updated_at": "2024-01-05T10:00:00Z"
    }))?
    .insert(db)
    .await?;
    Ok(())
}

async fn row_counts(db: &DatabaseConnection, tenant: &str) -> Result<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    for descriptor in ModelRegistry::standard().descriptors() {
        let rows = descriptor
            .write_dump(db, tenant, 100, &mut Vec::new())
            .await?;
        counts.insert(descriptor.filename().to_string(), rows);
    }
    Ok(counts)
}

fn container(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, bytes) in entries {
        zip.start_file(*path, FileOptions::default())?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

#[tokio::test]
async fn backup_restores_into_an_empty_tenant() -> Result<()> {
    let source = env("u1").await?;
    seed_account(&source, "u1").await?;
    let progress = source.app.progress().create(Some("u1"), "backup").await?;

    let (bytes, report) = source
        .app
        .backup_service()
        .export_to_vec("u1", Some(&progress.id))
        .await?;
    assert_eq!(report.files_included, 2);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.models["transactions.json"], 1);
    let progress = source.app.progress().get(&progress.id).await?;
    assert_eq!((progress.total, progress.current), (2, 2));

    let mut archive = ZipArchive::new(Cursor::new(bytes.clone()))?;
    let mut metadata = String::new();
    archive
        .by_name("data/metadata.json")?
        .read_to_string(&mut metadata)?;
    let metadata: Value = serde_json::from_str(&metadata)?;
    assert_eq!(metadata["version"], "1.0");
    assert_eq!(metadata["models"].as_array().map(Vec::len), Some(7));
    assert!(archive.by_name("data/uploads/2024/01/receipt.pdf").is_ok());

    let target = env("u2").await?;
    let restored = target
        .app
        .restore_service()
        .restore_bytes("u2", bytes, false, None)
        .await?;
    assert!(!restored.legacy);
    assert_eq!(restored.files.restored, 2);
    assert_eq!(restored.files.skipped, 0);

    assert_eq!(
        row_counts(&source.db, "u1").await?,
        row_counts(&target.db, "u2").await?
    );

    let source_files = source.app.storage().list_files("u1").await?;
    let target_files = target.app.storage().list_files("u2").await?;
    assert_eq!(source_files, target_files);
    for file in &source_files {
        assert_eq!(
            source.app.storage().read("u1", &file.relative_path).await?,
            target.app.storage().read("u2", &file.relative_path).await?
        );
    }

    let transaction = transactions::Entity::find_by_id(("t1".to_string(), "u2".to_string()))
        .one(&target.db)
        .await?
        .expect("restored transaction");
    assert_eq!(transaction.user_id, "u2");
    // All-digit free text survives the untyped dump
    assert_eq!(transaction.note.as_deref(), Some("12345"));
    assert_eq!(transaction.total, Some(550));
    assert_eq!(transaction.file_ids(), vec!["f1", "f2"]);
    // Only extra fields defined for the tenant are kept
    assert_eq!(transaction.extra, Some(json!({"vat": 19})));

    let receipt = files::Entity::find_by_id(("f1".to_string(), "u2".to_string()))
        .one(&target.db)
        .await?
        .expect("restored file");
    assert_eq!(receipt.path, "2024/01/receipt.pdf");
    assert_eq!(receipt.metadata, Some(json!({"pages": 1})));
    Ok(())
}

#[tokio::test]
async fn restoring_twice_creates_no_duplicates() -> Result<()> {
    let source = env("u1").await?;
    seed_account(&source, "u1").await?;
    let (bytes, _) = source.app.backup_service().export_to_vec("u1", None).await?;

    let target = env("u1").await?;
    let restore = target.app.restore_service();
    restore.restore_bytes("u1", bytes.clone(), false, None).await?;
    let after_first = row_counts(&target.db, "u1").await?;
    let second = restore.restore_bytes("u1", bytes, false, None).await?;
    let after_second = row_counts(&target.db, "u1").await?;

    assert_eq!(after_first, after_second);
    assert_eq!(second.models["categories.json"].restored, 1);
    Ok(())
}

#[tokio::test]
async fn restoring_into_another_tenant_of_the_same_instance_leaves_the_source_alone(
) -> Result<()> {
    let shared = env("u1").await?;
    seed_account(&shared, "u1").await?;
    create_test_user(&shared.db, "u2").await?;
    let before = row_counts(&shared.db, "u1").await?;

    let (bytes, _) = shared.app.backup_service().export_to_vec("u1", None).await?;
    let report = shared
        .app
        .restore_service()
        .restore_bytes("u2", bytes, false, None)
        .await?;
    assert_eq!(report.models["transactions.json"].restored, 1);
    assert_eq!(report.models["files.json"].restored, 2);

    assert_eq!(row_counts(&shared.db, "u1").await?, before);
    assert_eq!(row_counts(&shared.db, "u2").await?, before);
    let owners: Vec<String> = transactions::Entity::find()
        .all(&shared.db)
        .await?
        .into_iter()
        .map(|t| t.user_id)
        .collect();
    assert_eq!(owners.len(), 2);
    assert!(owners.contains(&"u1".to_string()));
    assert!(owners.contains(&"u2".to_string()));
    Ok(())
}

#[tokio::test]
async fn free_text_round_trips_unchanged() -> Result<()> {
    let source = env("u1").await?;
    let notes = ["2024-01-05T00:00:00.000Z", "", "null", "5.50"];
    for (index, note) in notes.iter().enumerate() {
        transactions::ActiveModel::from_json(json!({
            "id": format!("t{}", index), "user_id": "u1", "note": note, "files": [],
            "created_at": "2024-01-05T10:00:00Z", "updated_at": "2024-01-05T10:00:00Z"
        }))?
        .insert(&source.db)
        .await?;
    }
    let (bytes, _) = source.app.backup_service().export_to_vec("u1", None).await?;

    let target = env("u1").await?;
    target
        .app
        .restore_service()
        .restore_bytes("u1", bytes, false, None)
        .await?;

    for (index, note) in notes.iter().enumerate() {
        let key = (format!("t{}", index), "u1".to_string());
        let restored = transactions::Entity::find_by_id(key)
            .one(&target.db)
            .await?
            .expect("restored transaction");
        assert_eq!(restored.note.as_deref(), Some(*note));
    }
    Ok(())
}

#[tokio::test]
async fn unsupported_versions_change_nothing() -> Result<()> {
    let target = env("u1").await?;
    seed_account(&target, "u1").await?;
    let before = row_counts(&target.db, "u1").await?;
    let files_before = target.app.storage().list_files("u1").await?;

    let bytes = container(&[
        ("data/metadata.json", br#"{"version":"2.0","models":[]}"#),
        (
            "data/currencies.json",
            br#"[{"code":"USD","name":"Dollar"}]"#,
        ),
        ("data/uploads/new.txt", b"new"),
    ])?;

    for purge in [false, true] {
        let err = target
            .app
            .restore_service()
            .restore_bytes("u1", bytes.clone(), purge, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CoreErrorKind::IncompatibleVersion);
        assert!(err.message().contains("2.0"));
    }

    let err = target
        .app
        .restore_service()
        .restore_bytes("u1", b"definitely not a zip".to_vec(), true, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::Validation);

    assert_eq!(row_counts(&target.db, "u1").await?, before);
    assert_eq!(target.app.storage().list_files("u1").await?, files_before);
    Ok(())
}

#[tokio::test]
async fn containers_without_metadata_restore_as_legacy() -> Result<()> {
    let target = env("u1").await?;
    let bytes = container(&[
        (
            "data/currencies.json",
            br#"[{"code":"USD","name":"Dollar"},{"name":"No code"}]"#,
        ),
        ("data/categories.json", b"[]"),
        (
            "data/transactions.json",
            br#"[{"id":"t1","total":"550","note":"12345","issued_at":"2024-01-05T09:30:00",
                "files":[],"created_at":"2024-01-05T10:00:00.000Z",
                "updated_at":"2024-01-05T10:00:00.000Z"}]"#,
        ),
    ])?;

    let report = target
        .app
        .restore_service()
        .restore_bytes("u1", bytes, false, None)
        .await?;

    assert!(report.legacy);
    assert_eq!(report.models["currencies.json"].restored, 1);
    assert_eq!(report.models["currencies.json"].skipped, 1);
    assert_eq!(report.models["categories.json"].restored, 0);
    assert!(!report.models.contains_key("files.json"));

    // Stringly typed columns are coerced, text columns are kept verbatim
    assert_eq!(report.models["transactions.json"].restored, 1);
    let legacy = transactions::Entity::find_by_id(("t1".to_string(), "u1".to_string()))
        .one(&target.db)
        .await?
        .expect("restored transaction");
    assert_eq!(legacy.total, Some(550));
    assert_eq!(legacy.note.as_deref(), Some("12345"));
    assert!(legacy.issued_at.is_some());
    Ok(())
}

#[tokio::test]
async fn oversized_attachments_are_left_out() -> Result<()> {
    let config = PortabilityConfig {
        max_backup_file_size: 10,
        ..Default::default()
    };
    let source = env_with("u1", config).await?;
    source
        .app
        .storage()
        .write("u1", "scans/big.bin", &[7u8; 100])
        .await?;
    source.app.storage().write("u1", "small.txt", b"small").await?;

    let (bytes, report) = source.app.backup_service().export_to_vec("u1", None).await?;
    assert_eq!(report.files_included, 1);
    assert_eq!(report.files_skipped, 1);

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    assert!(archive.by_name("data/uploads/small.txt").is_ok());
    assert!(archive.by_name("data/uploads/scans/big.bin").is_err());
    // Every model is still present, even the empty ones
    let mut dump = String::new();
    archive
        .by_name("data/transactions.json")?
        .read_to_string(&mut dump)?;
    assert_eq!(dump, "[]");
    Ok(())
}

#[tokio::test]
async fn records_without_a_backed_up_file_are_skipped() -> Result<()> {
    let source = env("u1").await?;
    files::ActiveModel::from_json(json!({
        "id": "f9", "user_id": "u1", "filename": "gone.pdf", "path": "/uploads/missing/gone.pdf",
        "mimetype": "application/pdf", "metadata": null, "is_reviewed": false,
        "is_splitted": false, "cached_parse_result": null, "created_at": "2024-01-05T10:00:00Z"
    }))?
    .insert(&source.db)
    .await?;
    let (bytes, _) = source.app.backup_service().export_to_vec("u1", None).await?;

    let target = env("u1").await?;
    let report = target
        .app
        .restore_service()
        .restore_bytes("u1", bytes, false, None)
        .await?;

    assert_eq!(report.models["files.json"].restored, 1);
    assert_eq!(report.files.skipped, 1);
    assert_eq!(report.files.restored, 0);
    let record = files::Entity::find_by_id(("f9".to_string(), "u1".to_string()))
        .one(&target.db)
        .await?
        .expect("file record");
    assert_eq!(record.path, "/uploads/missing/gone.pdf");
    Ok(())
}

#[tokio::test]
async fn purge_replaces_existing_data() -> Result<()> {
    let target = env("u1").await?;
    seed_account(&target, "u1").await?;
    target.app.storage().write("u1", "stale.txt", b"old").await?;

    let bytes = container(&[
        (
            "data/metadata.json",
            br#"{"version":"1.0","timestamp":"2024-01-01T00:00:00Z","models":[]}"#,
        ),
        ("data/currencies.json", br#"[{"code":"USD","name":"Dollar"}]"#),
    ])?;
    target
        .app
        .restore_service()
        .restore_bytes("u1", bytes, true, None)
        .await?;

    let counts = row_counts(&target.db, "u1").await?;
    assert_eq!(counts["currencies.json"], 1);
    assert_eq!(counts["transactions.json"], 0);
    assert_eq!(counts["categories.json"], 0);
    assert!(target.app.storage().list_files("u1").await?.is_empty());
    Ok(())
}

struct DeleteSpy {
    filename: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ModelDescriptor for DeleteSpy {
    fn filename(&self) -> &'static str {
        self.filename
    }

    fn identity_field(&self) -> &'static str {
        "id"
    }

    async fn write_dump(
        &self,
        _db: &DatabaseConnection,
        _tenant_id: &str,
        _page_size: u64,
        out: &mut Vec<u8>,
    ) -> ImportExportResult<u64> {
        out.extend_from_slice(b"[]");
        Ok(0)
    }

    async fn delete_rows(
        &self,
        _db: &DatabaseConnection,
        _tenant_id: &str,
    ) -> ImportExportResult<u64> {
        self.log.lock().unwrap().push(self.filename);
        Ok(0)
    }

    async fn upsert_row(
        &self,
        _db: &DatabaseConnection,
        _tenant_id: &str,
        _row: Map<String, Value>,
    ) -> ImportExportResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn purge_deletes_dependents_before_their_references() -> Result<()> {
    let target = env("u1").await?;
    let log = Arc::new(Mutex::new(Vec::new()));
    let spy = |filename| -> Arc<dyn ModelDescriptor> {
        Arc::new(DeleteSpy {
            filename,
            log: log.clone(),
        })
    };
    let registry = ModelRegistry::new(vec![
        spy("categories.json"),
        spy("files.json"),
        spy("transactions.json"),
    ]);
    let progress: Arc<dyn ProgressReporter> = Arc::new(NoopProgress);
    let service = RestoreService::new(
        target.db.clone(),
        AttachmentStorage::new(target.app.config().uploads_root.clone()),
        registry,
        progress,
    );

    let bytes = container(&[("data/metadata.json", br#"{"version":"1.0"}"#)])?;
    service.restore_bytes("u1", bytes, true, None).await?;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["transactions.json", "files.json", "categories.json"]
    );
    Ok(())
}
