use crate::config::Config;
use crate::service::test_helpers::{chapters_up_to, harness, harness_with_config, series_spec};
use crate::types::{SeriesStatus, SourceScanStatus, TaskStatus};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn fresh_series_creates_tasks_for_all_chapters() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("fresh")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 3));

    let mut rx = h.events.subscribe();
    h.scanner.scan_series(&created.series).await;

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Syncing);
    assert_eq!(series.source_chapter_count, 3);
    assert_eq!(series.source_last_chapter, Some(3.0));
    assert_eq!(series.sync_progress_total, 3);

    let tasks = h.db.get_tasks_for_series(created.series.id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    for (index, task) in tasks.iter().enumerate() {
        assert_eq!(task.weight, index as i64);
        assert_eq!(task.task_status(), TaskStatus::Pending);
        assert_eq!(task.source_id, Some(created.sources[0].id));
        assert_eq!(task.chapter_number, (index + 1) as f64);
    }

    // scan.started then scan.finished with the missing count
    let started = rx.recv().await.unwrap();
    assert_eq!(started.kind, "manga.scan.started");
    let finished = rx.recv().await.unwrap();
    assert_eq!(finished.kind, "manga.scan.finished");
    assert_eq!(finished.data["missing"], 3);
    assert_eq!(finished.data["status"], "syncing");
}

#[tokio::test]
async fn scan_finds_gap_in_the_middle() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("gap")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 5));
    h.catalog.seed("gap", &[1.0, 2.0, 4.0, 5.0]);

    h.scanner.scan_series(&created.series).await;

    let tasks = h.db.get_tasks_for_series(created.series.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].chapter_number, 3.0);

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.source_chapter_count, 5);
    assert_eq!(series.backend_chapter_count, 4);
    assert_eq!(series.backend_last_chapter, Some(5.0));

    db_progress_is_consistent(&series);
}

fn db_progress_is_consistent(series: &crate::db::Series) {
    assert!(
        series.sync_progress_completed + series.sync_progress_failed
            <= series.sync_progress_total
    );
}

#[tokio::test]
async fn fullest_source_wins_regardless_of_priority() {
    let h = harness().await;
    let mut spec = series_spec("multi");
    spec.source_urls = vec![
        "https://primary.example/manga/multi".to_string(),
        "https://backup.example/manga/multi".to_string(),
    ];
    let created = h.db.create_series(&spec).await.unwrap();

    h.scraper.set_listing(
        &created.sources[0].source_url,
        chapters_up_to(&created.sources[0].source_url, 10),
    );
    h.scraper.set_listing(
        &created.sources[1].source_url,
        chapters_up_to(&created.sources[1].source_url, 12),
    );

    h.scanner.scan_series(&created.series).await;

    let tasks = h.db.get_tasks_for_series(created.series.id).await.unwrap();
    assert_eq!(tasks.len(), 12);
    // The lagging primary loses to the fuller backup source
    for task in &tasks {
        assert_eq!(task.source_id, Some(created.sources[1].id));
        assert!(task.chapter_url.contains("backup.example"));
    }

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.source_chapter_count, 12);

    // Both sources got their scan outcome recorded
    let sources = h.db.get_enabled_sources(created.series.id).await.unwrap();
    assert_eq!(
        sources[0].last_scan_status,
        Some(SourceScanStatus::Success.to_i32())
    );
    assert_eq!(sources[0].last_chapter_count, Some(10));
    assert_eq!(sources[1].last_chapter_count, Some(12));
}

#[tokio::test]
async fn series_without_enabled_sources_errors() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("nosrc")).await.unwrap();
    sqlx::query("UPDATE sources SET is_enabled = 0 WHERE series_id = ?")
        .bind(created.series.id)
        .execute(h.db.pool())
        .await
        .unwrap();

    h.scanner.scan_series(&created.series).await;

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Error);
    assert_eq!(series.last_error.as_deref(), Some("no sources"));
    assert_eq!(series.consecutive_failures, 1);
}

#[tokio::test]
async fn all_sources_failing_errors_without_tasks() {
    let h = harness().await;
    let mut spec = series_spec("allfail");
    spec.source_urls = vec![
        "https://a.example/manga/allfail".to_string(),
        "https://b.example/manga/allfail".to_string(),
    ];
    let created = h.db.create_series(&spec).await.unwrap();
    h.scraper
        .fail_listing(&created.sources[0].source_url, "timeout");
    h.scraper
        .fail_listing(&created.sources[1].source_url, "connection reset");

    let mut rx = h.events.subscribe();
    h.scanner.scan_series(&created.series).await;

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Error);
    assert_eq!(series.last_error.as_deref(), Some("all sources failed"));
    assert!(
        h.db.get_tasks_for_series(created.series.id)
            .await
            .unwrap()
            .is_empty()
    );

    // Per-source failure taxonomy survives
    let sources = h.db.get_enabled_sources(created.series.id).await.unwrap();
    assert_eq!(
        sources[0].last_scan_status,
        Some(SourceScanStatus::Timeout.to_i32())
    );
    assert_eq!(
        sources[1].last_scan_status,
        Some(SourceScanStatus::Error.to_i32())
    );

    let _started = rx.recv().await.unwrap();
    let finished = rx.recv().await.unwrap();
    assert_eq!(finished.kind, "manga.scan.finished");
    assert_eq!(finished.data["status"], "error");
}

#[tokio::test]
async fn scan_with_nothing_missing_returns_to_idle() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("insync")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 4));
    h.catalog.seed("insync", &[1.0, 2.0, 3.0, 4.0]);

    let before = chrono::Utc::now().timestamp();
    h.scanner.scan_series(&created.series).await;

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);
    assert!(
        h.db.get_tasks_for_series(created.series.id)
            .await
            .unwrap()
            .is_empty()
    );
    // Rescheduled a full check interval out
    let next = series.next_scan_at.unwrap();
    assert!(next >= before + 360 * 60 - 5);

    db_progress_is_consistent(&series);
}

#[tokio::test]
async fn metadata_fast_path_skips_full_listing() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("fast")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 3));
    h.catalog.seed("fast", &[1.0, 2.0, 3.0]);

    // First scan populates source_last_chapter / backend counts
    h.scanner.scan_series(&created.series).await;
    assert_eq!(h.scraper.list_calls.load(Ordering::SeqCst), 1);

    // Metadata agrees with known state: no full listing fetch
    h.scraper.set_metadata(
        &source_url,
        crate::clients::SourceMetadata {
            last_chapter: Some(3.0),
            total: Some(3),
        },
    );
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    h.scanner.scan_series(&series).await;
    assert_eq!(h.scraper.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.scraper.metadata_calls.load(Ordering::SeqCst), 1);

    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Idle);

    // A newer chapter on the source defeats the fast path
    h.scraper.set_metadata(
        &source_url,
        crate::clients::SourceMetadata {
            last_chapter: Some(4.0),
            total: Some(4),
        },
    );
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 4));
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    h.scanner.scan_series(&series).await;
    assert_eq!(h.scraper.list_calls.load(Ordering::SeqCst), 2);

    let tasks = h.db.get_tasks_for_series(created.series.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].chapter_number, 4.0);
}

#[tokio::test]
async fn fast_path_disabled_always_fetches_listing() {
    let mut config = Config::default();
    config.scanner.use_metadata_fast_path = false;
    let h = harness_with_config(config).await;

    let created = h.db.create_series(&series_spec("nofast")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 2));
    h.catalog.seed("nofast", &[1.0, 2.0]);

    h.scanner.scan_series(&created.series).await;
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    h.scanner.scan_series(&series).await;

    assert_eq!(h.scraper.list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.scraper.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tick_scans_every_due_series() {
    let h = harness().await;

    for name in ["tick-a", "tick-b", "tick-c"] {
        let created = h.db.create_series(&series_spec(name)).await.unwrap();
        let source_url = created.sources[0].source_url.clone();
        h.scraper
            .set_listing(&source_url, chapters_up_to(&source_url, 2));
    }

    h.scanner.tick().await;

    for name in ["tick-a", "tick-b", "tick-c"] {
        let series = h.db.get_series_by_external_id(name).await.unwrap().unwrap();
        assert_eq!(series.series_status(), SeriesStatus::Syncing, "{}", name);
        assert_eq!(series.sync_progress_total, 2, "{}", name);
    }
}

#[tokio::test]
async fn rescan_does_not_duplicate_existing_tasks() {
    let h = harness().await;
    let created = h.db.create_series(&series_spec("rescan")).await.unwrap();
    let source_url = created.sources[0].source_url.clone();
    h.scraper
        .set_listing(&source_url, chapters_up_to(&source_url, 3));

    h.scanner.scan_series(&created.series).await;
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();

    // Force an immediate rescan of the same listing
    h.db.trigger_force_scan(series.id).await.unwrap();
    let series = h.db.get_series(series.id).await.unwrap().unwrap();
    h.scanner.scan_series(&series).await;

    let tasks = h.db.get_tasks_for_series(created.series.id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    // The batch total must not double-count rediscovered chapters
    let series = h.db.get_series(created.series.id).await.unwrap().unwrap();
    assert_eq!(series.sync_progress_total, 3);
}
