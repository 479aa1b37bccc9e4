//! In-memory collaborator fakes shared by scanner and processor tests.

use crate::cache::CachePurger;
use crate::clients::{
    CatalogBackend, CatalogChapterPage, ChapterImage, ChapterUploader, NewCatalogChapter,
    SourceChapter, SourceMetadata, SourceScraper, StageRequest, StagedChapter, UploadRequest,
    UploadedChapter,
};
use crate::config::Config;
use crate::db::Database;
use crate::error::Error;
use crate::events::EventPublisher;
use crate::notify::Notifier;
use crate::processor::SyncProcessor;
use crate::scanner::Scanner;
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Scripted scraper: listings, metadata, images, and staging per URL
#[derive(Default)]
pub(crate) struct MockScraper {
    pub listings: Mutex<HashMap<String, std::result::Result<Vec<SourceChapter>, String>>>,
    pub metadata: Mutex<HashMap<String, SourceMetadata>>,
    pub images: Mutex<HashMap<String, Vec<ChapterImage>>>,
    pub stage_failures: Mutex<HashMap<String, String>>,
    pub list_calls: AtomicU32,
    pub metadata_calls: AtomicU32,
    pub image_calls: AtomicU32,
    pub stage_calls: AtomicU32,
}

impl MockScraper {
    pub fn set_listing(&self, source_url: &str, chapters: Vec<SourceChapter>) {
        self.listings
            .lock()
            .unwrap()
            .insert(source_url.to_string(), Ok(chapters));
    }

    /// Make a listing fail; the message "timeout" produces a timeout error
    pub fn fail_listing(&self, source_url: &str, message: &str) {
        self.listings
            .lock()
            .unwrap()
            .insert(source_url.to_string(), Err(message.to_string()));
    }

    pub fn set_metadata(&self, source_url: &str, meta: SourceMetadata) {
        self.metadata
            .lock()
            .unwrap()
            .insert(source_url.to_string(), meta);
    }

    pub fn fail_stage(&self, chapter_url: &str, message: &str) {
        self.stage_failures
            .lock()
            .unwrap()
            .insert(chapter_url.to_string(), message.to_string());
    }
}

/// A minimal valid series spec with one source on src.example
pub(crate) fn series_spec(external_id: &str) -> crate::db::NewSeries {
    crate::db::NewSeries {
        external_id: external_id.to_string(),
        title: format!("Series {}", external_id),
        source_urls: vec![format!("https://src.example/manga/{}", external_id)],
        check_interval_minutes: 360,
        priority: 0,
        auto_sync_enabled: true,
    }
}

/// Build a listing of chapters 1..=n with canonical URLs
pub(crate) fn chapters_up_to(base: &str, n: u32) -> Vec<SourceChapter> {
    (1..=n)
        .map(|i| SourceChapter {
            title: format!("Chapter {}", i),
            url: format!("{}/chapter-{}", base, i),
            date: None,
            weight: None,
        })
        .collect()
}

#[async_trait]
impl SourceScraper for MockScraper {
    async fn list_chapters(&self, source_url: &str) -> Result<Vec<SourceChapter>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.listings.lock().unwrap().get(source_url) {
            Some(Ok(chapters)) => Ok(chapters.clone()),
            Some(Err(message)) if message == "timeout" => Err(Error::timeout("scraper")),
            Some(Err(message)) => Err(Error::Scraper(message.clone())),
            None => Err(Error::Scraper(format!("no listing scripted for {}", source_url))),
        }
    }

    async fn source_metadata(&self, source_url: &str) -> Result<SourceMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.metadata
            .lock()
            .unwrap()
            .get(source_url)
            .cloned()
            .ok_or_else(|| Error::Scraper(format!("no metadata scripted for {}", source_url)))
    }

    async fn chapter_images(&self, chapter_url: &str) -> Result<Vec<ChapterImage>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(images) = self.images.lock().unwrap().get(chapter_url) {
            return Ok(images.clone());
        }
        // Unscripted chapters get a plausible default page set
        Ok((0..3)
            .map(|index| ChapterImage {
                index,
                download_url: format!("{}/img/{}.jpg", chapter_url, index),
            })
            .collect())
    }

    async fn stage_chapter(&self, request: &StageRequest) -> Result<StagedChapter> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.stage_failures.lock().unwrap().get(&request.chapter_url) {
            return Err(Error::Stager(message.clone()));
        }
        Ok(StagedChapter {
            zip_url: format!(
                "https://stage.test/{}/{}.zip",
                request.series_external_id, request.chapter_number
            ),
            file_name: format!("{}.zip", request.chapter_number),
            total_images: request.images.len() as i64,
        })
    }
}

/// Uploader fake keyed on milli-chapter numbers for failure injection
#[derive(Default)]
pub(crate) struct MockUploader {
    pub fail_chapters: Mutex<HashSet<i64>>,
    pub calls: AtomicU32,
}

impl MockUploader {
    pub fn fail_chapter(&self, number: f64) {
        self.fail_chapters
            .lock()
            .unwrap()
            .insert(crate::scanner::chapter_key(number));
    }
}

#[async_trait]
impl ChapterUploader for MockUploader {
    async fn upload_single(&self, request: &UploadRequest) -> Result<UploadedChapter> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_chapters
            .lock()
            .unwrap()
            .contains(&crate::scanner::chapter_key(request.chapter_number))
        {
            return Err(Error::timeout("uploader"));
        }
        Ok(UploadedChapter {
            chapter_id: format!("ch-{}-{}", request.series_external_id, request.chapter_number),
            chapter_number: format!("{}", request.chapter_number),
            images: vec!["001.jpg".to_string(), "002.jpg".to_string()],
            path: format!("{}/{}", request.series_external_id, request.chapter_number),
        })
    }
}

/// Catalog fake backed by an in-memory chapter set per series
#[derive(Default)]
pub(crate) struct MockCatalog {
    pub chapters: Mutex<HashMap<String, Vec<f64>>>,
    pub created: Mutex<Vec<(String, NewCatalogChapter)>>,
    pub fail_create: AtomicBool,
    pub list_calls: AtomicU32,
}

impl MockCatalog {
    pub fn seed(&self, external_id: &str, numbers: &[f64]) {
        self.chapters
            .lock()
            .unwrap()
            .insert(external_id.to_string(), numbers.to_vec());
    }
}

#[async_trait]
impl CatalogBackend for MockCatalog {
    async fn list_chapters(
        &self,
        series_external_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<CatalogChapterPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut numbers = self
            .chapters
            .lock()
            .unwrap()
            .get(series_external_id)
            .cloned()
            .unwrap_or_default();
        numbers.sort_by(|a, b| a.total_cmp(b));

        let page_size = page_size.max(1) as usize;
        let total_pages = numbers.len().div_ceil(page_size).max(1) as u32;
        let start = (page.max(1) as usize - 1) * page_size;
        let slice: Vec<f64> = numbers.iter().skip(start).take(page_size).copied().collect();

        Ok(CatalogChapterPage {
            chapter_numbers: slice,
            page,
            total_pages,
            total_records: numbers.len() as u64,
        })
    }

    async fn create_chapters(
        &self,
        series_external_id: &str,
        chapters: &[NewCatalogChapter],
    ) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Catalog("catalog retcode 500".to_string()));
        }
        let mut stored = self.chapters.lock().unwrap();
        let entry = stored.entry(series_external_id.to_string()).or_default();
        let mut created = self.created.lock().unwrap();
        for chapter in chapters {
            entry.push(chapter.chapter_number);
            created.push((series_external_id.to_string(), chapter.clone()));
        }
        Ok(())
    }
}

/// Everything a scanner/processor test needs, wired over a temp database
pub(crate) struct TestHarness {
    pub db: Arc<Database>,
    pub scraper: Arc<MockScraper>,
    pub uploader: Arc<MockUploader>,
    pub catalog: Arc<MockCatalog>,
    pub scanner: Scanner,
    pub processor: SyncProcessor,
    pub events: EventPublisher,
    pub config: Arc<Config>,
    _temp: NamedTempFile,
}

/// Build a harness with scripted collaborators and default config
pub(crate) async fn harness() -> TestHarness {
    harness_with_config(Config::default()).await
}

pub(crate) async fn harness_with_config(config: Config) -> TestHarness {
    let temp = NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(temp.path()).await.unwrap());
    let config = Arc::new(config);

    let scraper = Arc::new(MockScraper::default());
    let uploader = Arc::new(MockUploader::default());
    let catalog = Arc::new(MockCatalog::default());
    let events = EventPublisher::new(&config.external);
    let cache = CachePurger::spawn(&config.external);
    let notifier = Arc::new(Notifier::new(&config.external, &config.notifications));

    let scanner = Scanner::new(
        db.clone(),
        scraper.clone(),
        catalog.clone(),
        events.clone(),
        cache.clone(),
        notifier.clone(),
        config.clone(),
    );
    let processor = SyncProcessor::new(
        db.clone(),
        scraper.clone(),
        uploader.clone(),
        catalog.clone(),
        events.clone(),
        cache,
        notifier,
        config.clone(),
    );

    TestHarness {
        db,
        scraper,
        uploader,
        catalog,
        scanner,
        processor,
        events,
        config,
        _temp: temp,
    }
}
