//! Test doubles for the orchestrator's browser and network seams.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use image_harvester::models::job::JobSnapshot;
use image_harvester::services::browser::{BrowserError, BrowserProvider, BrowserSession};
use image_harvester::services::fetcher::{ByteStream, Fetch, FetchError};
use image_harvester::services::orchestrator::{Orchestrator, ScrapeTuning};

/// A canned rendered page.
#[derive(Clone)]
pub struct PageFixture {
    pub title: Option<String>,
    pub html: String,
}

impl PageFixture {
    pub fn new(title: &str, html: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            html: html.to_string(),
        }
    }
}

/// Browser double serving one fixture page; records whether the session was
/// released.
pub struct StubBrowser {
    fixture: Result<PageFixture, String>,
    closed: Arc<AtomicBool>,
    images_scrolled: Arc<AtomicBool>,
}

impl StubBrowser {
    pub fn serving(fixture: PageFixture) -> Self {
        Self {
            fixture: Ok(fixture),
            closed: Arc::new(AtomicBool::new(false)),
            images_scrolled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A browser whose navigation always fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fixture: Err(message.to_string()),
            closed: Arc::new(AtomicBool::new(false)),
            images_scrolled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn images_scrolled(&self) -> bool {
        self.images_scrolled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserProvider for StubBrowser {
    async fn session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Ok(Box::new(StubSession {
            fixture: self.fixture.clone(),
            closed: Arc::clone(&self.closed),
            images_scrolled: Arc::clone(&self.images_scrolled),
        }))
    }
}

struct StubSession {
    fixture: Result<PageFixture, String>,
    closed: Arc<AtomicBool>,
    images_scrolled: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn navigate(&mut self, _url: &str) -> Result<(), BrowserError> {
        match &self.fixture {
            Ok(_) => Ok(()),
            Err(message) => Err(BrowserError::Navigation(message.clone())),
        }
    }

    async fn page_height(&mut self) -> Result<f64, BrowserError> {
        // Stable height: the scroll loop terminates after one increment.
        Ok(2000.0)
    }

    async fn scroll_by(&mut self, _pixels: u32) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn scroll_images_into_view(&mut self) -> Result<(), BrowserError> {
        self.images_scrolled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn click_slider_next(&mut self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn title(&mut self) -> Result<Option<String>, BrowserError> {
        match &self.fixture {
            Ok(fixture) => Ok(fixture.title.clone()),
            Err(message) => Err(BrowserError::Evaluate(message.clone())),
        }
    }

    async fn html(&mut self) -> Result<String, BrowserError> {
        match &self.fixture {
            Ok(fixture) => Ok(fixture.html.clone()),
            Err(message) => Err(BrowserError::Evaluate(message.clone())),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Fetch double serving fixed bodies for an allow-list of URLs.
pub struct StubFetch {
    bodies: HashMap<String, Bytes>,
}

impl StubFetch {
    pub fn serving(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            bodies: urls
                .iter()
                .map(|u| (u.to_string(), Bytes::from_static(b"image-bytes")))
                .collect(),
        })
    }

    pub fn serving_nothing() -> Arc<Self> {
        Arc::new(Self {
            bodies: HashMap::new(),
        })
    }
}

#[async_trait]
impl Fetch for StubFetch {
    async fn probe(&self, url: &str) -> bool {
        self.bodies.contains_key(url)
    }

    async fn fetch(&self, url: &str) -> Result<Option<ByteStream>, FetchError> {
        Ok(self
            .bodies
            .get(url)
            .cloned()
            .map(|body| futures::stream::iter([Ok(body)]).boxed()))
    }
}

/// Tuning with zero settle delays so tests run instantly.
pub fn fast_tuning(output_dir: &std::path::Path) -> ScrapeTuning {
    ScrapeTuning {
        output_dir: output_dir.to_path_buf(),
        max_concurrent_jobs: 4,
        settle_delay: Duration::from_millis(0),
        scroll_step_px: 1000,
        scroll_pause: Duration::from_millis(0),
        slider_click_rounds: 2,
    }
}

/// Poll a job until it reaches a terminal state, bounded so a hung worker
/// fails the test instead of wedging it.
pub async fn wait_for_terminal(orchestrator: &Orchestrator, id: Uuid) -> JobSnapshot {
    for _ in 0..500 {
        let snapshot = orchestrator.status(id).expect("job disappeared");
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

/// Names of the entries inside a zip archive.
pub fn zip_entry_names(path: &std::path::Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("archive missing");
    let mut archive = zip::ZipArchive::new(file).expect("invalid archive");
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
