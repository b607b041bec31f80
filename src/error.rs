use thiserror::Error;

/// Failures raised by the extraction, merge and fetch stages.
///
/// Soft-misses (a card without salary, a detail page without body) are
/// never errors; they resolve to `"N/A"` or an empty string at the call site.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("page layout changed: {what} not found on {page}")]
    Structural { page: String, what: String },

    #[error("invalid record {job_id}: {reason}")]
    Validation { job_id: i64, reason: String },

    #[error("request to {url} failed with status {status}")]
    Http { url: String, status: u16 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl PipelineError {
    pub fn structural(page: &str, what: &str) -> Self {
        Self::Structural {
            page: page.to_string(),
            what: what.to_string(),
        }
    }

    pub fn validation(job_id: i64, reason: impl Into<String>) -> Self {
        Self::Validation {
            job_id,
            reason: reason.into(),
        }
    }

    /// Structural errors abort one page; everything else aborts the step.
    pub fn is_page_scoped(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
