//! Scrape job orchestration.
//!
//! Owns the job map and the full worker lifecycle: a submission allocates a
//! `Pending` job and spawns one worker task; the worker drives the browser
//! session (settle, scroll-to-bottom, slider rounds), extracts references,
//! resolves and downloads each one, packages the result, and moves the job
//! to a terminal state. Status queries read consistent snapshots under the
//! map lock and never wait on workers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::job::{JobSnapshot, JobStatus, ScrapeJob};
use crate::services::archive::{self, ArchiveError};
use crate::services::browser::{BrowserError, BrowserProvider, BrowserSession};
use crate::services::extractor;
use crate::services::fetcher::{FetchError, Resolver};

/// Errors surfaced synchronously to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("no URL provided")]
    InvalidInput,

    #[error("unknown job id")]
    NotFound,

    #[error("job not finished or in error state")]
    NotReady,

    #[error("no images found")]
    Empty,
}

/// Errors internal to one worker run. Captured on the job, never propagated
/// across the worker boundary.
#[derive(Debug, thiserror::Error)]
enum WorkerError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("output directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive task failed: {0}")]
    Task(String),
}

/// Page-interaction heuristics and output layout. All best-effort constants;
/// no scroll budget or click count can guarantee a page is done loading.
#[derive(Debug, Clone)]
pub struct ScrapeTuning {
    pub output_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    /// Pause after navigation before inspecting the page.
    pub settle_delay: Duration,
    pub scroll_step_px: u32,
    /// Pause between scroll increments and slider rounds.
    pub scroll_pause: Duration,
    pub slider_click_rounds: u32,
}

impl Default for ScrapeTuning {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloaded_images"),
            max_concurrent_jobs: 4,
            settle_delay: Duration::from_secs(5),
            scroll_step_px: 1000,
            scroll_pause: Duration::from_secs(2),
            slider_click_rounds: 5,
        }
    }
}

struct ScrapeOutcome {
    downloaded: u32,
    zip_filename: Option<String>,
}

/// The job orchestrator. One instance per process, shared behind `Arc`.
pub struct Orchestrator {
    jobs: Mutex<HashMap<Uuid, ScrapeJob>>,
    browser: Arc<dyn BrowserProvider>,
    resolver: Resolver,
    /// Bounds concurrent browser sessions; submissions beyond the bound
    /// queue in `Pending` instead of exhausting the host.
    sessions: Semaphore,
    tuning: ScrapeTuning,
}

impl Orchestrator {
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        resolver: Resolver,
        tuning: ScrapeTuning,
    ) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            browser,
            sessions: Semaphore::new(tuning.max_concurrent_jobs),
            resolver,
            tuning,
        }
    }

    /// Allocate a `Pending` job for `url`, spawn its worker, and return the
    /// handle immediately.
    pub fn submit(self: &Arc<Self>, url: &str) -> Result<Uuid, ScrapeError> {
        if url.trim().is_empty() {
            return Err(ScrapeError::InvalidInput);
        }

        let job = ScrapeJob::new(url);
        let id = job.id;
        self.jobs.lock().expect("job map poisoned").insert(id, job);

        metrics::counter!("scrape_jobs_total").increment(1);
        tracing::info!(job_id = %id, url, "Scrape job submitted");

        let orchestrator = Arc::clone(self);
        let url = url.to_string();
        tokio::spawn(async move {
            // The worker runs in its own task so a panic anywhere inside it
            // surfaces here as a JoinError instead of stranding the job in
            // InProgress.
            let worker = tokio::spawn({
                let orchestrator = Arc::clone(&orchestrator);
                let url = url.clone();
                async move { orchestrator.run_worker(id, &url).await }
            });
            if let Err(e) = worker.await {
                orchestrator.update(id, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(format!("scrape worker panicked: {e}"));
                });
                metrics::counter!("scrape_jobs_failed").increment(1);
                metrics::gauge!("scrape_jobs_active").decrement(1.0);
                tracing::error!(job_id = %id, error = %e, "Scrape worker panicked");
            }
        });

        Ok(id)
    }

    /// Consistent point-in-time snapshot of a job.
    pub fn status(&self, id: Uuid) -> Result<JobSnapshot, ScrapeError> {
        self.jobs
            .lock()
            .expect("job map poisoned")
            .get(&id)
            .map(JobSnapshot::from)
            .ok_or(ScrapeError::NotFound)
    }

    /// Path and filename of a finished job's archive.
    pub fn result_path(&self, id: Uuid) -> Result<(PathBuf, String), ScrapeError> {
        let snapshot = self.status(id)?;
        if snapshot.status != JobStatus::Finished {
            return Err(ScrapeError::NotReady);
        }
        match snapshot.zip_filename {
            Some(name) => Ok((self.tuning.output_dir.join(&name), name)),
            None => Err(ScrapeError::Empty),
        }
    }

    /// Drop terminal jobs older than `ttl`. `now` is injected so tests can
    /// control time. Returns the number of jobs removed.
    pub fn sweep_expired(&self, ttl: Duration, now: chrono::DateTime<chrono::Utc>) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && now - job.created_at > ttl));
        before - jobs.len()
    }

    /// Mutate a job in place. Writes to jobs already in a terminal state are
    /// refused, which makes the state machine monotone even against bugs in
    /// callers.
    fn update(&self, id: Uuid, mutate: impl FnOnce(&mut ScrapeJob)) {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        if let Some(job) = jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                mutate(job);
            }
        }
    }

    async fn run_worker(&self, id: Uuid, url: &str) {
        let Ok(_permit) = self.sessions.acquire().await else {
            // Semaphore closed only at teardown.
            return;
        };

        let start = Instant::now();
        self.update(id, |job| job.status = JobStatus::InProgress);
        metrics::gauge!("scrape_jobs_active").increment(1.0);

        match self.scrape(id, url).await {
            Ok(outcome) => {
                self.update(id, |job| {
                    job.status = JobStatus::Finished;
                    job.zip_filename = outcome.zip_filename.clone();
                });
                metrics::counter!("scrape_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %id,
                    images = outcome.downloaded,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Scrape job finished"
                );
            }
            Err(e) => {
                self.update(id, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(e.to_string());
                });
                metrics::counter!("scrape_jobs_failed").increment(1);
                tracing::error!(job_id = %id, error = %e, "Scrape job failed");
            }
        }

        metrics::gauge!("scrape_jobs_active").decrement(1.0);
        metrics::histogram!("scrape_duration_seconds").record(start.elapsed().as_secs_f64());
    }

    /// One full extraction-resolution-download run.
    async fn scrape(&self, id: Uuid, url: &str) -> Result<ScrapeOutcome, WorkerError> {
        let mut session = self.browser.session().await?;

        // The session is released on every path, error paths included.
        let driven = self.drive_page(session.as_mut(), url).await;
        session.close().await;
        let (title, html) = driven?;

        let references = extractor::extract_references(&html);
        tracing::info!(
            job_id = %id,
            references = references.len(),
            title = %title,
            "Page extraction complete"
        );

        let dir = self.tuning.output_dir.join(&title);
        tokio::fs::create_dir_all(&dir).await?;

        let mut downloaded = 0u32;
        for reference in &references {
            match self.resolver.download(&reference.url, url, &dir).await {
                Ok(Some(filename)) => {
                    downloaded += 1;
                    self.update(id, |job| job.image_count += 1);
                    metrics::counter!("scrape_images_downloaded_total").increment(1);
                    tracing::debug!(job_id = %id, filename, "Image downloaded");
                }
                Ok(None) => {
                    tracing::warn!(
                        job_id = %id,
                        url = %reference.url,
                        origin = ?reference.origin,
                        "All variants exhausted, reference skipped"
                    );
                }
                // Disk failures abort the job; unusable references do not.
                Err(FetchError::Io(e)) => return Err(WorkerError::Io(e)),
                Err(e) => {
                    tracing::warn!(job_id = %id, url = %reference.url, error = %e, "Reference skipped");
                }
            }
        }

        let zip_filename = if downloaded > 0 {
            let name = format!("{title}.zip");
            let zip_path = self.tuning.output_dir.join(&name);
            let src = dir.clone();
            tokio::task::spawn_blocking(move || archive::write_archive(&src, &zip_path))
                .await
                .map_err(|e| WorkerError::Task(e.to_string()))??;
            Some(name)
        } else {
            None
        };

        Ok(ScrapeOutcome {
            downloaded,
            zip_filename,
        })
    }

    /// Navigate and coax lazy content out of the page, returning the
    /// sanitized title and the rendered DOM.
    async fn drive_page(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<(String, String), BrowserError> {
        session.navigate(url).await?;
        sleep(self.tuning.settle_delay).await;

        self.scroll_to_bottom(session).await?;

        // Surface images the viewport scroll missed. Best effort, like the
        // sliders below.
        match session.scroll_images_into_view().await {
            Ok(()) => sleep(self.tuning.scroll_pause).await,
            Err(e) => tracing::debug!(error = %e, "Image scroll-into-view failed"),
        }

        for round in 0..self.tuning.slider_click_rounds {
            // Slider driving is best effort; pages without controls or with
            // detached buttons must not fail the job.
            if let Err(e) = session.click_slider_next().await {
                tracing::debug!(round, error = %e, "Slider interaction failed");
                break;
            }
            sleep(self.tuning.scroll_pause).await;
        }

        let html = session.html().await?;
        let title = match session.title().await {
            Ok(Some(t)) if !extractor::sanitize_filename(t.trim()).trim().is_empty() => {
                extractor::sanitize_filename(t.trim())
            }
            _ => extractor::page_title(&html),
        };

        Ok((title, html))
    }

    /// Scroll down in fixed increments until the page height stops growing,
    /// the page's signal that lazy-loaded content has stopped appending.
    async fn scroll_to_bottom(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<(), BrowserError> {
        let mut last_height = session.page_height().await?;
        loop {
            session.scroll_by(self.tuning.scroll_step_px).await?;
            sleep(self.tuning.scroll_pause).await;
            let new_height = session.page_height().await?;
            if (new_height - last_height).abs() < 0.5 {
                return Ok(());
            }
            last_height = new_height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fetcher::{ByteStream, Fetch};
    use async_trait::async_trait;

    struct NoBrowser;

    #[async_trait]
    impl BrowserProvider for NoBrowser {
        async fn session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
            Err(BrowserError::Launch("no browser in unit tests".to_string()))
        }
    }

    struct NoFetch;

    #[async_trait]
    impl Fetch for NoFetch {
        async fn probe(&self, _url: &str) -> bool {
            false
        }

        async fn fetch(&self, _url: &str) -> Result<Option<ByteStream>, FetchError> {
            Ok(None)
        }
    }

    fn orchestrator() -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::new(NoBrowser),
            Resolver::new(Arc::new(NoFetch)),
            ScrapeTuning {
                settle_delay: Duration::from_millis(0),
                scroll_pause: Duration::from_millis(0),
                ..ScrapeTuning::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_url() {
        let orch = orchestrator();
        assert!(matches!(orch.submit(""), Err(ScrapeError::InvalidInput)));
        assert!(matches!(orch.submit("   "), Err(ScrapeError::InvalidInput)));
    }

    #[tokio::test]
    async fn test_status_unknown_id() {
        let orch = orchestrator();
        assert!(matches!(
            orch.status(Uuid::new_v4()),
            Err(ScrapeError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_submit_returns_pending_job() {
        let orch = orchestrator();
        let id = orch.submit("https://example.com").unwrap();
        let snapshot = orch.status(id).unwrap();
        // The worker may already have started, but it can never be terminal
        // in a different shape than the machine allows.
        assert!(matches!(
            snapshot.status,
            JobStatus::Pending | JobStatus::InProgress | JobStatus::Failed
        ));
    }

    #[tokio::test]
    async fn test_result_path_not_ready_before_finish() {
        let orch = orchestrator();
        let id = insert_job(&orch, "https://example.com");
        assert!(matches!(orch.result_path(id), Err(ScrapeError::NotReady)));

        orch.update(id, |job| job.status = JobStatus::InProgress);
        assert!(matches!(orch.result_path(id), Err(ScrapeError::NotReady)));

        orch.update(id, |job| job.status = JobStatus::Finished);
        // Finished with zero images has no archive.
        assert!(matches!(orch.result_path(id), Err(ScrapeError::Empty)));
    }

    /// Insert a job without spawning a worker, so tests control every
    /// transition themselves.
    fn insert_job(orch: &Orchestrator, url: &str) -> Uuid {
        let job = ScrapeJob::new(url);
        let id = job.id;
        orch.jobs.lock().unwrap().insert(id, job);
        id
    }

    #[tokio::test]
    async fn test_terminal_jobs_refuse_updates() {
        let orch = orchestrator();
        let id = insert_job(&orch, "https://example.com");
        orch.update(id, |job| {
            job.status = JobStatus::Finished;
            job.image_count = 2;
        });
        orch.update(id, |job| {
            job.status = JobStatus::Failed;
            job.image_count = 99;
        });
        let snapshot = orch.status(id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Finished);
        assert_eq!(snapshot.images_count, 2);
    }

    #[tokio::test]
    async fn test_sweep_expired_removes_old_terminal_jobs() {
        let orch = orchestrator();
        let finished = insert_job(&orch, "https://a.example");
        let running = insert_job(&orch, "https://b.example");
        orch.update(finished, |job| job.status = JobStatus::Finished);

        let later = chrono::Utc::now() + chrono::Duration::hours(2);
        let removed = orch.sweep_expired(Duration::from_secs(3600), later);

        assert_eq!(removed, 1);
        assert!(matches!(orch.status(finished), Err(ScrapeError::NotFound)));
        // Non-terminal jobs survive the sweep regardless of age.
        assert!(orch.status(running).is_ok());
    }
}
