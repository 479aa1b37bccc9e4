
use super::*;
use tempfile::NamedTempFile;

/// Open a fresh migrated database backed by a temp file.
///
/// The NamedTempFile must stay alive for the duration of the test.
async fn open_test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

/// A minimal valid series spec with one source
fn new_series(external_id: &str) -> NewSeries {
    NewSeries {
        external_id: external_id.to_string(),
        title: format!("Series {}", external_id),
        source_urls: vec![format!("https://src.example/manga/{}", external_id)],
        check_interval_minutes: 360,
        priority: 0,
        auto_sync_enabled: true,
    }
}
