use crate::config::{Config, DomainPolicy};
use crate::db::NewTask;
use crate::service::test_helpers::{chapters_up_to, harness, harness_with_config, series_spec};
use crate::types::{SeriesId, SeriesStatus, TaskStatus};
use std::sync::atomic::Ordering;

/// Seed a syncing series with pending tasks for chapters 1..=n
async fn seed_syncing(
    h: &crate::service::test_helpers::TestHarness,
    external_id: &str,
    n: u32,
) -> SeriesId {
    let created = h.db.create_series(&series_spec(external_id)).await.unwrap();
    let tasks: Vec<NewTask> = (1..=n)
        .map(|i| NewTask {
            chapter_url: format!(
                "{}/chapter-{}",
                created.sources[0].source_url, i
            ),
            chapter_number: i as f64,
            weight: (i - 1) as i64,
            source_id: Some(created.sources[0].id),
        })
        .collect();
    h.db.create_tasks(created.series.id, &tasks).await.unwrap();
    h.db.increment_sync_progress_total(created.series.id, n as i64)
        .await
        .unwrap();
    h.db.set_series_status(created.series.id, SeriesStatus::Syncing, None)
        .await
        .unwrap();
    created.series.id
}

#[tokio::test]
async fn drains_all_tasks_and_finalizes_idle() {
    let h = harness().await;
    let id = seed_syncing(&h, "drain", 3).await;

    let mut rx = h.events.subscribe();

    // First tick processes the batch; the next closes out the series
    h.processor.tick().await;

    let tasks = h.db.get_tasks_for_series(id).await.unwrap();
    assert!(tasks.iter().all(|t| t.task_status() == TaskStatus::Completed));

    h.processor.tick().await;

    let series = h.db.get_series(id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert!(series.last_synced_at.is_some());
    assert_eq!(series.backend_chapter_count, 3);
    assert_eq!(series.backend_last_chapter, Some(3.0));
    assert_eq!(series.sync_progress_completed, 3);
    assert_eq!(series.sync_progress_failed, 0);
    assert_eq!(series.sync_progress_total, 3);

    // Catalog registration happened once per chapter
    assert_eq!(h.catalog.created.lock().unwrap().len(), 3);

    // Progress events for each chapter, all completed
    for _ in 0..3 {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "manga.sync.progress");
        assert_eq!(event.data["status"], "completed");
    }
}

#[tokio::test]
async fn upload_failure_keeps_zip_and_resumes_at_persist_step() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("resume")).await.unwrap();
    h.db.create_tasks(
        created.series.id,
        &[NewTask {
            chapter_url: format!("{}/chapter-10", created.sources[0].source_url),
            chapter_number: 10.0,
            weight: 0,
            source_id: Some(created.sources[0].id),
        }],
    )
    .await
    .unwrap();
    h.db.increment_sync_progress_total(created.series.id, 1)
        .await
        .unwrap();
    h.db.set_series_status(created.series.id, SeriesStatus::Syncing, None)
        .await
        .unwrap();
    h.uploader.fail_chapter(10.0);

    h.processor.tick().await;

    // Staging succeeded, upload timed out: failed with the archive retained
    let task = &h.db.get_tasks_for_series(created.series.id).await.unwrap()[0];
    assert_eq!(task.task_status(), TaskStatus::Failed);
    assert!(task.zip_url.as_deref().unwrap().ends_with("10.zip"));
    assert_eq!(task.retry_count, 1);
    assert!(task.error.as_deref().unwrap().contains("timeout"));
    assert_eq!(h.scraper.stage_calls.load(Ordering::SeqCst), 1);

    h.processor.tick().await;
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Error);
    assert_eq!(
        series.last_error.as_deref(),
        Some("Some chapters failed to sync")
    );
    assert_eq!(series.sync_progress_failed, 1);

    // Operator retry: back to pending, series syncing
    h.uploader.fail_chapters.lock().unwrap().clear();
    let retried = h.db.retry_failed_tasks(created.series.id).await.unwrap();
    assert_eq!(retried, 1);

    h.processor.tick().await;

    // The stored archive URL short-circuited staging (still one stage call)
    assert_eq!(h.scraper.stage_calls.load(Ordering::SeqCst), 1);
    let task = &h.db.get_tasks_for_series(created.series.id).await.unwrap()[0];
    assert_eq!(task.task_status(), TaskStatus::Completed);

    h.processor.tick().await;
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert_eq!(series.backend_chapter_count, 1);
}

#[tokio::test]
async fn empty_image_list_fails_the_task() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("noimg")).await.unwrap();
    let chapter_url = format!("{}/chapter-1", created.sources[0].source_url);
    h.db.create_tasks(
        created.series.id,
        &[NewTask {
            chapter_url: chapter_url.clone(),
            chapter_number: 1.0,
            weight: 0,
            source_id: None,
        }],
    )
    .await
    .unwrap();
    h.db.set_series_status(created.series.id, SeriesStatus::Syncing, None)
        .await
        .unwrap();
    h.scraper.images.lock().unwrap().insert(chapter_url, vec![]);

    h.processor.tick().await;

    let task = &h.db.get_tasks_for_series(created.series.id).await.unwrap()[0];
    assert_eq!(task.task_status(), TaskStatus::Failed);
    assert!(
        task.error
            .as_deref()
            .unwrap()
            .contains("No images found for chapter")
    );
    // Never reached staging or upload
    assert_eq!(h.scraper.stage_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stage_failure_leaves_no_zip_url() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("stagefail")).await.unwrap();
    let chapter_url = format!("{}/chapter-2", created.sources[0].source_url);
    h.db.create_tasks(
        created.series.id,
        &[NewTask {
            chapter_url: chapter_url.clone(),
            chapter_number: 2.0,
            weight: 0,
            source_id: None,
        }],
    )
    .await
    .unwrap();
    h.db.set_series_status(created.series.id, SeriesStatus::Syncing, None)
        .await
        .unwrap();
    h.scraper.fail_stage(&chapter_url, "archive write failed");

    h.processor.tick().await;

    let task = &h.db.get_tasks_for_series(created.series.id).await.unwrap()[0];
    assert_eq!(task.task_status(), TaskStatus::Failed);
    assert!(task.zip_url.is_none());
    assert!(task.error.as_deref().unwrap().contains("archive write failed"));
}

#[tokio::test]
async fn catalog_failure_fails_the_task_after_upload() {
    let h = harness().await;
    let id = seed_syncing(&h, "catfail", 1).await;
    h.catalog.fail_create.store(true, Ordering::SeqCst);

    h.processor.tick().await;

    let task = &h.db.get_tasks_for_series(id).await.unwrap()[0];
    assert_eq!(task.task_status(), TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("catalog"));
    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 1);

    // Backend stats untouched on failure
    let series = h.db.get_series(id).await.unwrap().unwrap();
    assert_eq!(series.backend_chapter_count, 0);
}

#[tokio::test]
async fn one_bad_chapter_does_not_block_the_rest() {
    let h = harness().await;
    let id = seed_syncing(&h, "mixed", 3).await;
    h.uploader.fail_chapter(2.0);

    h.processor.tick().await;
    h.processor.tick().await;

    let tasks = h.db.get_tasks_for_series(id).await.unwrap();
    assert_eq!(tasks[0].task_status(), TaskStatus::Completed);
    assert_eq!(tasks[1].task_status(), TaskStatus::Failed);
    assert_eq!(tasks[2].task_status(), TaskStatus::Completed);

    let series = h.db.get_series(id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Error);
    assert_eq!(series.sync_progress_completed, 2);
    assert_eq!(series.sync_progress_failed, 1);
    // All terminal: completed + failed = total
    assert_eq!(
        series.sync_progress_completed + series.sync_progress_failed,
        series.sync_progress_total
    );
}

#[tokio::test]
async fn domain_policy_caps_the_per_tick_budget() {
    let mut config = Config::default();
    config.domains.insert(
        "src.example".to_string(),
        DomainPolicy {
            max_concurrent_chapters: 1,
            inter_chapter_delay_ms: 0,
        },
    );
    let h = harness_with_config(config).await;
    let id = seed_syncing(&h, "capped", 3).await;

    h.processor.tick().await;

    let completed = h
        .db
        .get_tasks_for_series(id)
        .await
        .unwrap()
        .iter()
        .filter(|t| t.task_status() == TaskStatus::Completed)
        .count();
    assert_eq!(completed, 1, "domain cap must bound the batch");

    // Remaining chapters drain on subsequent ticks
    h.processor.tick().await;
    h.processor.tick().await;
    h.processor.tick().await;
    let series = h.db.get_series(id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
}

#[tokio::test]
async fn tick_is_idempotent_on_quiet_series() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("quiet")).await.unwrap();

    for _ in 0..3 {
        h.processor.tick().await;
    }

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn finalization_is_idempotent() {
    let h = harness().await;
    let id = seed_syncing(&h, "fin", 1).await;

    h.processor.tick().await;
    h.processor.tick().await;
    let series_after_first = h.db.get_series(id).await.unwrap().unwrap();
    assert_eq!(series_after_first.series_status(), SeriesStatus::Idle);
    let synced_at = series_after_first.last_synced_at;

    h.processor.tick().await;
    h.processor.tick().await;
    let series = h.db.get_series(id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert_eq!(series.last_synced_at, synced_at);
}

#[tokio::test]
async fn scan_then_process_end_to_end() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("e2e")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 2));

    h.scanner.scan_series(&created.series).await;
    h.processor.tick().await;
    h.processor.tick().await;

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert_eq!(series.backend_chapter_count, 2);

    // The catalog now holds both chapters, so a rescan stays quiet
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    h.db.trigger_force_scan(series.id).await.unwrap();
    let series = h.db.get_series(series.id).await.unwrap().unwrap();
    h.scanner.scan_series(&series).await;

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert_eq!(
        h.db.get_tasks_for_series(created.series.id)
            .await
            .unwrap()
            .len(),
        2
    );
}
