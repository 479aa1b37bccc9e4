use super::*;
use crate::service::test_helpers::{chapters_up_to, series_spec};
use crate::types::{SeriesStatus, TaskStatus};
use serde_json::json;

#[tokio::test]
async fn create_series_returns_201_with_sources() {
    let app = test_app().await;
    // Script the listing so the immediate background scan has data
    app.scraper.set_listing(
        "https://src.example/manga/ext-1",
        chapters_up_to("https://src.example/manga/ext-1", 2),
    );

    let (status, body) = send(&app, "POST", "/series", None, Some(create_body("ext-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["external_id"], "ext-1");
    assert_eq!(body["data"]["status"], "idle");
    assert_eq!(body["data"]["sources"][0]["priority"], 1);
    assert_eq!(
        body["data"]["sources"][0]["source_domain"],
        "src.example"
    );

    let stored = app
        .service
        .db
        .get_series_by_external_id("ext-1")
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn create_duplicate_returns_409() {
    let app = test_app().await;
    send(&app, "POST", "/series", None, Some(create_body("dup"))).await;

    let (status, body) = send(&app, "POST", "/series", None, Some(create_body("dup"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn create_with_bad_urls_returns_400() {
    let app = test_app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/series",
        None,
        Some(json!({
            "external_id": "bad",
            "title": "Bad",
            "source_urls": ["not a url"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Too many sources
    let (status, _) = send(
        &app,
        "POST",
        "/series",
        None,
        Some(json!({
            "external_id": "bad2",
            "title": "Bad",
            "source_urls": [
                "https://a.example/m/x",
                "https://b.example/m/x",
                "https://c.example/m/x",
                "https://d.example/m/x",
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_create_skips_duplicates_without_409() {
    let app = test_app().await;
    send(&app, "POST", "/series", None, Some(create_body("bulk-existing"))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/series/bulk",
        None,
        Some(json!({
            "items": [create_body("bulk-a"), create_body("bulk-existing"), create_body("bulk-b")],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["status"], "created");
    assert_eq!(items[1]["status"], "skipped");
    assert_eq!(items[2]["status"], "created");
}

#[tokio::test]
async fn bulk_create_validates_batch_size() {
    let app = test_app().await;

    let (status, _) = send(&app, "POST", "/series/bulk", None, Some(json!({"items": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let oversized: Vec<serde_json::Value> =
        (0..51).map(|i| create_body(&format!("x{}", i))).collect();
    let (status, _) = send(
        &app,
        "POST",
        "/series/bulk",
        None,
        Some(json!({"items": oversized})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_series_filters_and_paginates() {
    let app = test_app().await;
    for i in 0..3 {
        app.service
            .db
            .create_series(&series_spec(&format!("list-{}", i)))
            .await
            .unwrap();
    }

    let (status, body) = send(&app, "GET", "/series?page=1&page_size=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["page_size"], 2);

    let (status, body) = send(&app, "GET", "/series?status=error", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    let (status, _) = send(&app, "GET", "/series?status=exploded", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_series_includes_sources_and_failed_tasks() {
    let app = test_app().await;
    let created = app
        .service
        .db
        .create_series(&series_spec("detail"))
        .await
        .unwrap();
    app.service
        .db
        .create_tasks(
            created.series.id,
            &[crate::db::NewTask {
                chapter_url: "https://src.example/manga/detail/chapter-1".to_string(),
                chapter_number: 1.0,
                weight: 0,
                source_id: Some(created.sources[0].id),
            }],
        )
        .await
        .unwrap();
    let task = &app
        .service
        .db
        .get_tasks_for_series(created.series.id)
        .await
        .unwrap()[0];
    app.service
        .db
        .set_task_status(task.id, TaskStatus::Failed, None, Some("upload blew up"))
        .await
        .unwrap();

    let uri = format!("/series/{}", created.series.id);
    let (status, body) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["series"]["external_id"], "detail");
    assert_eq!(
        body["data"]["series"]["sources"].as_array().unwrap().len(),
        1
    );
    let failed = body["data"]["failed_tasks"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["status"], "failed");
    assert_eq!(failed[0]["error"], "upload blew up");

    let (status, _) = send(&app, "GET", "/series/99999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_series_applies_patch() {
    let app = test_app().await;
    let created = app
        .service
        .db
        .create_series(&series_spec("patch"))
        .await
        .unwrap();

    let uri = format!("/series/{}", created.series.id);
    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        None,
        Some(json!({"title": "Renamed", "priority": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Renamed");
    assert_eq!(body["data"]["priority"], 7);

    let (status, _) = send(
        &app,
        "PUT",
        "/series/99999",
        None,
        Some(json!({"title": "Nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_series_cascades_and_404s_after() {
    let app = test_app().await;
    let created = app
        .service
        .db
        .create_series(&series_spec("gone"))
        .await
        .unwrap();

    let uri = format!("/series/{}", created.series.id);
    let (status, body) = send(&app, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn force_scan_while_syncing_keeps_status() {
    let app = test_app().await;
    let created = app
        .service
        .db
        .create_series(&series_spec("busy"))
        .await
        .unwrap();
    app.service
        .db
        .set_series_status(created.series.id, SeriesStatus::Syncing, None)
        .await
        .unwrap();

    let uri = format!("/series/{}/force-scan", created.series.id);
    let (status, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let series = app
        .service
        .db
        .get_series(created.series.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Syncing);
    assert!(series.next_scan_at.unwrap() <= chrono::Utc::now().timestamp());

    let (status, _) = send(&app, "POST", "/series/99999/force-scan", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retry_endpoint_flips_failed_tasks() {
    let app = test_app().await;
    let created = app
        .service
        .db
        .create_series(&series_spec("retryable"))
        .await
        .unwrap();
    app.service
        .db
        .create_tasks(
            created.series.id,
            &[crate::db::NewTask {
                chapter_url: "https://src.example/manga/retryable/chapter-1".to_string(),
                chapter_number: 1.0,
                weight: 0,
                source_id: None,
            }],
        )
        .await
        .unwrap();
    let task = &app
        .service
        .db
        .get_tasks_for_series(created.series.id)
        .await
        .unwrap()[0];
    app.service
        .db
        .set_task_status(task.id, TaskStatus::Failed, None, Some("boom"))
        .await
        .unwrap();

    let uri = format!("/series/{}/retry", created.series.id);
    let (status, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["retried_count"], 1);

    let series = app
        .service
        .db
        .get_series(created.series.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(series.series_status(), SeriesStatus::Syncing);

    // Nothing failed anymore: 400
    let (status, _) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/series/99999/retry", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_domain_dry_run_and_live() {
    let app = test_app().await;
    for i in 0..3 {
        let mut spec = series_spec(&format!("dom-{}", i));
        spec.source_urls = vec![format!("https://old.example/manga/dom-{}?lang=en", i)];
        app.service.db.create_series(&spec).await.unwrap();
    }

    // Dry run: counts and sample, nothing mutated
    let (status, body) = send(
        &app,
        "PUT",
        "/series/update-domain",
        None,
        Some(json!({"old_domain": "old.example", "new_domain": "new.example"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dry_run"], true);
    assert_eq!(body["data"]["affected_count"], 3);
    let sample = body["data"]["sample"].as_array().unwrap();
    assert_eq!(sample.len(), 3);
    for pair in sample {
        let old_url = pair["old_url"].as_str().unwrap();
        let new_url = pair["new_url"].as_str().unwrap();
        assert_eq!(new_url, old_url.replace("old.example", "new.example"));
    }
    let series = app
        .service
        .db
        .get_series_by_external_id("dom-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(series.source_domain.as_deref(), Some("old.example"));

    // Live run mutates
    let (status, body) = send(
        &app,
        "PUT",
        "/series/update-domain",
        None,
        Some(json!({
            "old_domain": "old.example",
            "new_domain": "new.example",
            "dry_run": false,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated_count"], 3);

    let series = app
        .service
        .db
        .get_series_by_external_id("dom-0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(series.source_domain.as_deref(), Some("new.example"));
}

#[tokio::test]
async fn series_routes_require_the_admin_key() {
    let mut config = crate::config::Config::default();
    config.api.admin_api_key = Some("sekrit".to_string());
    let app = test_app_with_config(config).await;

    let (status, body) = send(&app, "GET", "/series", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, "GET", "/series", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/series", Some("sekrit"), None).await;
    assert_eq!(status, StatusCode::OK);

    // Mutations too
    let (status, _) = send(&app, "POST", "/series", None, Some(create_body("auth"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(
        app.service
            .db
            .get_series_by_external_id("auth")
            .await
            .unwrap()
            .is_none()
    );
}
