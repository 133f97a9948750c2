//! File import through the whole pipeline: extraction, enrichment, merge
//! and persistence to a file-backed snapshot.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use customer_atlas_core::{Customer, CustomerId};
use customer_atlas_sync::config::ExtractionPolicy;
use customer_atlas_sync::gateway::{ExtractionError, ExtractionInput, Extractor, InputFile};
use customer_atlas_sync::store::StoreError;
use customer_atlas_sync::{ImportError, ImportProgress, PipelineState, SyncPipeline};
use customer_atlas_integration_tests::{
    RecordingEnricher, TestContext, broken_sheet, ids, sheet,
};
use tokio::sync::watch;

#[tokio::test]
async fn test_known_ids_are_dropped_and_new_ones_prepended() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet("first.csv", &[("1", "Taipei")])])
        .await
        .expect("first import");

    let report = pipeline
        .import_files(vec![sheet(
            "second.csv",
            &[("1", "Taipei"), ("2", "Taichung")],
        )])
        .await
        .expect("second import");

    assert_eq!(report.added, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(ids(&pipeline.customers()), ["2", "1"]);
}

#[tokio::test]
async fn test_reimporting_a_subset_changes_nothing() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet(
            "all.csv",
            &[("1", "Taipei"), ("2", "Tainan"), ("3", "Hsinchu")],
        )])
        .await
        .expect("import");
    let before = ctx.store().load();

    let report = pipeline
        .import_files(vec![sheet("subset.csv", &[("3", "Hsinchu"), ("1", "Taipei")])])
        .await
        .expect("reimport");

    assert!(report.is_noop());
    assert_eq!(ctx.store().load(), before);
}

/// Records the published progress at the moment each file is extracted.
#[derive(Default)]
struct ProgressRecorder {
    state: OnceLock<watch::Receiver<PipelineState>>,
    seen: Mutex<Vec<ImportProgress>>,
}

#[async_trait]
impl Extractor for ProgressRecorder {
    async fn extract(&self, input: &ExtractionInput) -> Result<Vec<Customer>, ExtractionError> {
        if let Some(progress) = self.state.get().and_then(|rx| rx.borrow().progress.clone()) {
            self.seen.lock().expect("lock").push(progress);
        }
        let ExtractionInput::Csv(id) = input else {
            return Ok(Vec::new());
        };
        Ok(vec![Customer::new(id.as_str(), "", "", "Taipei")])
    }
}

#[tokio::test]
async fn test_files_are_extracted_in_order_with_progress() {
    let ctx = TestContext::new();
    let recorder = Arc::new(ProgressRecorder::default());
    let pipeline = SyncPipeline::builder(ctx.store())
        .extractor(recorder.clone())
        .build();
    recorder
        .state
        .set(pipeline.subscribe())
        .expect("recorder wired once");

    pipeline
        .import_files(vec![
            InputFile::csv("a.csv", "1"),
            InputFile::csv("b.csv", "2"),
        ])
        .await
        .expect("import");

    let seen = recorder.seen.lock().expect("lock").clone();
    assert_eq!(
        seen,
        [
            ImportProgress {
                current: 1,
                total: 2,
                file: "a.csv".to_string(),
            },
            ImportProgress {
                current: 2,
                total: 2,
                file: "b.csv".to_string(),
            },
        ]
    );
    assert!(pipeline.state().progress.is_none());
}

#[tokio::test]
async fn test_scripted_files_are_extracted_in_order() {
    let ctx = TestContext::new();
    ctx.pipeline()
        .import_files(vec![
            sheet("a.csv", &[("1", "Taipei")]),
            sheet("b.csv", &[("2", "Taipei")]),
        ])
        .await
        .expect("import");

    let calls = ctx.extractor.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("1,"));
    assert!(calls[1].starts_with("2,"));
}

#[tokio::test]
async fn test_permissive_policy_skips_one_bad_file() {
    let ctx = TestContext::new();
    let pipeline = ctx.builder().policy(ExtractionPolicy::SkipFailed).build();

    let report = pipeline
        .import_files(vec![
            sheet("good-1.csv", &[("1", "Taipei")]),
            broken_sheet("blurry.jpg"),
            sheet("good-2.csv", &[("2", "Tainan")]),
        ])
        .await
        .expect("import");

    assert_eq!(report.added, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].file, "blurry.jpg");
    assert_eq!(ctx.extractor.calls().len(), 3);
    assert_eq!(ctx.store().load().len(), 2);
}

#[tokio::test]
async fn test_permissive_policy_fails_when_every_file_fails() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();

    let result = pipeline
        .import_files(vec![broken_sheet("a.jpg"), broken_sheet("b.jpg")])
        .await;

    match result {
        Err(ImportError::AllFilesFailed(failures)) => {
            let files: Vec<&str> = failures.iter().map(|f| f.file.as_str()).collect();
            assert_eq!(files, ["a.jpg", "b.jpg"]);
        }
        other => panic!("expected AllFilesFailed, got {other:?}"),
    }
    assert!(ctx.store().load().is_empty());
}

#[tokio::test]
async fn test_strict_policy_aborts_on_first_bad_file() {
    let ctx = TestContext::new();
    let pipeline = ctx
        .builder()
        .policy(ExtractionPolicy::AbortOnFailure)
        .build();

    let result = pipeline
        .import_files(vec![
            sheet("good.csv", &[("1", "Taipei")]),
            broken_sheet("bad.jpg"),
            sheet("never.csv", &[("2", "Tainan")]),
        ])
        .await;

    assert!(matches!(result, Err(ImportError::Extraction { ref file, .. }) if file == "bad.jpg"));
    assert_eq!(ctx.extractor.calls().len(), 2);
    assert!(pipeline.customers().is_empty());
    assert!(ctx.store().load().is_empty());
}

#[tokio::test]
async fn test_strict_policy_fails_when_every_file_fails() {
    let ctx = TestContext::new();
    let pipeline = ctx
        .builder()
        .policy(ExtractionPolicy::AbortOnFailure)
        .build();

    let result = pipeline
        .import_files(vec![broken_sheet("a.jpg"), broken_sheet("b.jpg")])
        .await;

    assert!(matches!(result, Err(ImportError::Extraction { ref file, .. }) if file == "a.jpg"));
    assert_eq!(ctx.extractor.calls().len(), 1);
}

#[tokio::test]
async fn test_empty_extraction_is_no_records_found() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();

    let result = pipeline
        .import_files(vec![sheet("empty.csv", &[])])
        .await;

    assert!(matches!(result, Err(ImportError::NoRecordsFound)));
    assert!(ctx.enricher.seen().is_empty());
}

#[tokio::test]
async fn test_enrichment_runs_once_over_all_files() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();

    pipeline
        .import_files(vec![
            sheet("a.csv", &[("1", "Taipei")]),
            sheet("b.csv", &[("2", "Tainan")]),
        ])
        .await
        .expect("import");

    assert_eq!(
        ctx.enricher.seen(),
        [CustomerId::from("1"), CustomerId::from("2")]
    );
    for customer in pipeline.customers() {
        assert_eq!(
            customer.map_url,
            Some(RecordingEnricher::link_for(&customer.id))
        );
    }
}

#[tokio::test]
async fn test_enrichment_failure_still_saves_records() {
    let ctx = TestContext::with_enricher(RecordingEnricher::failing());
    let pipeline = ctx.pipeline();

    let report = pipeline
        .import_files(vec![sheet("a.csv", &[("1", "Taipei")])])
        .await
        .expect("import");

    assert_eq!(report.added, 1);
    let saved = ctx.store().load();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].map_url.is_none());
}

#[tokio::test]
async fn test_created_at_survives_later_imports() {
    let ctx = TestContext::new();
    let pipeline = ctx.pipeline();
    pipeline
        .import_files(vec![sheet("a.csv", &[("a", "Taipei")])])
        .await
        .expect("first import");
    let first = ctx.store().load()[0].created_at;
    assert!(first.is_some());

    pipeline
        .import_files(vec![sheet("b.csv", &[("b", "Taipei")])])
        .await
        .expect("second import");

    let reloaded = ctx.store().load();
    let a = reloaded
        .iter()
        .find(|c| c.id.as_str() == "a")
        .expect("record a");
    assert_eq!(a.created_at, first);
}

#[tokio::test]
async fn test_quota_failure_keeps_previous_state() {
    let ctx = TestContext::new();
    let pipeline = ctx.builder_over(ctx.store_with_quota(400)).build();
    pipeline
        .import_files(vec![sheet("small.csv", &[("1", "Taipei")])])
        .await
        .expect("small import");

    let rows: Vec<(String, &str)> = (2..40).map(|i| (i.to_string(), "Kaohsiung")).collect();
    let rows: Vec<(&str, &str)> = rows.iter().map(|(id, city)| (id.as_str(), *city)).collect();
    let result = pipeline.import_files(vec![sheet("big.csv", &rows)]).await;

    assert!(matches!(
        result,
        Err(ImportError::Persistence(StoreError::QuotaExceeded { .. }))
    ));
    assert_eq!(ids(&pipeline.customers()), ["1"]);
    assert_eq!(ids(&ctx.store().load()), ["1"]);
}

#[tokio::test]
async fn test_new_pipeline_reads_previous_snapshot() {
    let ctx = TestContext::new();
    ctx.pipeline()
        .import_files(vec![sheet("a.csv", &[("1", "Taipei"), ("2", "Tainan")])])
        .await
        .expect("import");

    let reopened = ctx.pipeline();
    let outcome = reopened.load_initial().await;

    assert_eq!(outcome.customers.len(), 2);
    assert_eq!(reopened.city_stats().len(), 2);
}
