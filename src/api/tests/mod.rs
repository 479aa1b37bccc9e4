mod series;

use crate::api::create_router;
use crate::config::Config;
use crate::db::Database;
use crate::service::MirrorService;
use crate::service::test_helpers::{MockCatalog, MockScraper, MockUploader};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt; // for oneshot

/// Router plus handles for scripting collaborators and inspecting state
pub(crate) struct TestApp {
    pub router: Router,
    pub service: Arc<MirrorService>,
    pub scraper: Arc<MockScraper>,
    _temp: NamedTempFile,
}

pub(crate) async fn test_app() -> TestApp {
    test_app_with_config(Config::default()).await
}

pub(crate) async fn test_app_with_config(config: Config) -> TestApp {
    let temp = NamedTempFile::new().unwrap();
    let db = Database::new(temp.path()).await.unwrap();

    let scraper = Arc::new(MockScraper::default());
    let uploader = Arc::new(MockUploader::default());
    let catalog = Arc::new(MockCatalog::default());

    let service = Arc::new(MirrorService::with_collaborators(
        config,
        db,
        scraper.clone(),
        uploader.clone(),
        catalog,
    ));
    let router = create_router(service.clone(), service.config().clone());

    TestApp {
        router,
        service,
        scraper,
        _temp: temp,
    }
}

/// Issue a JSON request against the app and decode the envelope
pub(crate) async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }

    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Canonical create-series request body
pub(crate) fn create_body(external_id: &str) -> serde_json::Value {
    serde_json::json!({
        "external_id": external_id,
        "title": format!("Series {}", external_id),
        "source_urls": [format!("https://src.example/manga/{}", external_id)],
    })
}
