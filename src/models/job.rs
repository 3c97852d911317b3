use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a scrape job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// One tracked scrape job. Lives in the orchestrator's in-memory table
/// from submission until the expiry sweep evicts it.
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub source_url: String,
    pub zip_filename: Option<String>,
    pub image_count: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScrapeJob {
    pub fn new(source_url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            source_url: source_url.to_string(),
            zip_filename: None,
            image_count: 0,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Wire shape reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub zip_filename: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "imagesCount")]
    pub images_count: usize,
}

impl From<&ScrapeJob> for JobSnapshot {
    fn from(job: &ScrapeJob) -> Self {
        Self {
            status: job.status,
            zip_filename: job.zip_filename.clone(),
            error: job.error.clone(),
            images_count: job.image_count,
        }
    }
}
