use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::orchestrator::ScrapeTuning;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Browser binary location override.
    #[serde(default = "default_chrome_bin")]
    pub chrome_bin: String,

    /// Root directory for per-job image folders and archives.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Bound on concurrent browser sessions.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Pause after navigation before inspecting the page.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Viewport scroll increment for the lazy-load loop.
    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: u32,

    /// Pause between scroll increments and slider rounds.
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// How many times slider "next" controls are driven forward.
    #[serde(default = "default_slider_click_rounds")]
    pub slider_click_rounds: u32,

    /// Per-request timeout on image fetches and probes.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Deadline on page navigation.
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,

    /// Terminal jobs older than this are garbage collected.
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Interval of the expiry sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_chrome_bin() -> String {
    "/usr/bin/google-chrome".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloaded_images")
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_settle_delay_ms() -> u64 {
    5000
}

fn default_scroll_step_px() -> u32 {
    1000
}

fn default_scroll_pause_ms() -> u64 {
    2000
}

fn default_slider_click_rounds() -> u32 {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_page_load_timeout_secs() -> u64 {
    60
}

fn default_job_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn scrape_tuning(&self) -> ScrapeTuning {
        ScrapeTuning {
            output_dir: self.output_dir.clone(),
            max_concurrent_jobs: self.max_concurrent_jobs,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            scroll_step_px: self.scroll_step_px,
            scroll_pause: Duration::from_millis(self.scroll_pause_ms),
            slider_click_rounds: self.slider_click_rounds,
        }
    }
}
