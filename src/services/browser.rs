//! Browser session capability.
//!
//! The orchestrator's worker talks to a `BrowserSession` trait rather than a
//! concrete browser so the whole job lifecycle can be exercised with doubles.
//! The production implementation drives headless Chrome over CDP via
//! chromiumoxide: one fresh browser per job, a background task draining the
//! handler stream, and an explicit `close` on every worker path.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page evaluation failed: {0}")]
    Evaluate(String),

    #[error("page load timed out after {0:?}")]
    Timeout(Duration),
}

/// A live page on a launched browser. Mutating operations take `&mut self`;
/// the session belongs to exactly one worker.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Current `document.body.scrollHeight`.
    async fn page_height(&mut self) -> Result<f64, BrowserError>;

    /// Scroll the viewport down by a pixel increment.
    async fn scroll_by(&mut self, pixels: u32) -> Result<(), BrowserError>;

    /// Bring every `<img>` element into the viewport once, firing lazy
    /// loaders the plain downward scroll missed.
    async fn scroll_images_into_view(&mut self) -> Result<(), BrowserError>;

    /// Click every slider "next" control once. Best-effort heuristic for
    /// surfacing off-screen carousel slides.
    async fn click_slider_next(&mut self) -> Result<(), BrowserError>;

    /// Page title, if the document has one.
    async fn title(&mut self) -> Result<Option<String>, BrowserError>;

    /// Serialized rendered DOM.
    async fn html(&mut self) -> Result<String, BrowserError>;

    /// Release the underlying browser. Called unconditionally by the worker,
    /// on error paths included.
    async fn close(&mut self);
}

/// Launches one session per request.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn session(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Headless Chrome provider.
pub struct ChromeProvider {
    chrome_bin: String,
    page_load_timeout: Duration,
}

impl ChromeProvider {
    pub fn new(chrome_bin: &str, page_load_timeout: Duration) -> Self {
        Self {
            chrome_bin: chrome_bin.to_string(),
            page_load_timeout,
        }
    }
}

#[async_trait]
impl BrowserProvider for ChromeProvider {
    async fn session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let config = BrowserConfig::builder()
            .chrome_executable(&self.chrome_bin)
            .no_sandbox()
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(BrowserError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // chromiumoxide requires the handler stream to be polled for the
        // browser connection to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler_task,
            page_load_timeout: self.page_load_timeout,
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    page_load_timeout: Duration,
}

impl ChromeSession {
    async fn evaluate(&self, expression: String) -> Result<(), BrowserError> {
        self.page
            .evaluate(expression)
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            Ok(())
        };
        tokio::time::timeout(self.page_load_timeout, navigation)
            .await
            .map_err(|_| BrowserError::Timeout(self.page_load_timeout))?
    }

    async fn page_height(&mut self) -> Result<f64, BrowserError> {
        self.page
            .evaluate("document.body.scrollHeight")
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?
            .into_value::<f64>()
            .map_err(|e| BrowserError::Evaluate(e.to_string()))
    }

    async fn scroll_by(&mut self, pixels: u32) -> Result<(), BrowserError> {
        self.evaluate(format!("window.scrollBy(0, {pixels})")).await
    }

    async fn scroll_images_into_view(&mut self) -> Result<(), BrowserError> {
        self.evaluate(
            "document.querySelectorAll('img').forEach(el => el.scrollIntoView({block: 'center'}))"
                .to_string(),
        )
        .await
    }

    async fn click_slider_next(&mut self) -> Result<(), BrowserError> {
        self.evaluate(
            "document.querySelectorAll('.slick-next').forEach(btn => btn.click())".to_string(),
        )
        .await
    }

    async fn title(&mut self) -> Result<Option<String>, BrowserError> {
        self.page
            .get_title()
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))
    }

    async fn html(&mut self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "Browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}
