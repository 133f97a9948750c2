//! JSON export and backup restore.

use customer_atlas_sync::ImportError;
use customer_atlas_integration_tests::{TestContext, ids, sheet};
use serde_json::Value;

#[tokio::test]
async fn test_export_uses_camel_case_and_omits_absent_fields() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet("a.csv", &[("1", "Taipei")])])
        .await
        .expect("import");

    let exported: Value =
        serde_json::from_str(&pipeline.export_snapshot().expect("export")).expect("valid JSON");
    let record = &exported[0];

    assert_eq!(record["id"], "1");
    assert_eq!(record["city"], "Taipei");
    assert!(record["mapUrl"].is_string());
    assert!(record["createdAt"].is_string());
    assert!(record.get("lat").is_none());
    assert!(record.get("syncStatus").is_none());
}

#[tokio::test]
async fn test_restore_into_fresh_store_reproduces_collection() {
    let source = TestContext::new();
    let pipeline = source.pipeline();
    pipeline
        .import_files(vec![sheet(
            "a.csv",
            &[("1", "Taipei"), ("2", "Tainan"), ("3", "Taipei")],
        )])
        .await
        .expect("import");
    let backup = pipeline.export_snapshot().expect("export");

    let target = TestContext::new();
    let restored = target.pipeline();
    let report = restored.import_backup(&backup).await.expect("restore");

    assert_eq!(report.added, 3);
    assert_eq!(target.store().load(), source.store().load());
    assert_eq!(restored.city_stats(), pipeline.city_stats());
}

#[tokio::test]
async fn test_restore_merges_with_existing_records() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet("a.csv", &[("1", "Taipei")])])
        .await
        .expect("import");

    let backup = r#"[
        {"id": "1", "name": "Renamed", "address": "", "city": "Elsewhere"},
        {"id": "7", "name": "Chen", "address": "7 Lane", "city": "Keelung"}
    ]"#;
    let report = pipeline.import_backup(backup).await.expect("restore");

    assert_eq!(report.added, 1);
    assert_eq!(report.duplicates, 1);
    let customers = pipeline.customers();
    assert_eq!(ids(&customers), ["7", "1"]);
    assert_eq!(customers[1].city, "Taipei");
}

#[tokio::test]
async fn test_restore_of_known_records_is_noop() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet("a.csv", &[("1", "Taipei")])])
        .await
        .expect("import");
    let backup = pipeline.export_snapshot().expect("export");

    let report = pipeline.import_backup(&backup).await.expect("restore");

    assert!(report.is_noop());
    assert_eq!(pipeline.customers().len(), 1);
}

#[tokio::test]
async fn test_malformed_backups_are_rejected_without_changes() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet("a.csv", &[("1", "Taipei")])])
        .await
        .expect("import");
    let before = ctx.store().load();

    for blob in [
        "",
        "not json",
        r#"{"id": "2"}"#,
        r#"[{"name": "no id"}]"#,
        r#"[{"id": "2", "lat": "north"}]"#,
    ] {
        let result = pipeline.import_backup(blob).await;
        assert!(
            matches!(result, Err(ImportError::Parse(_))),
            "expected parse error for {blob:?}"
        );
    }

    assert_eq!(ctx.store().load(), before);
    assert_eq!(pipeline.customers(), before);
}

#[tokio::test]
async fn test_restore_accepts_numeric_ids_and_skips_blank_ones() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();

    let report = pipeline
        .import_backup(r#"[{"id": 42, "city": "Taipei"}, {"id": "  ", "city": "Tainan"}]"#)
        .await
        .expect("restore");

    assert_eq!(report.added, 1);
    assert_eq!(ids(&pipeline.customers()), ["42"]);
}
