use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::SourceStatus;

#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("failed to resolve search sources: {0}")]
    SourceResolution(String),

    #[error("gene annotation fetch failed: {0}")]
    AnnotationFetch(String),

    #[error("search job submission failed: {0}")]
    JobSubmission(String),

    #[error("status check for job {job_id} failed: {message}")]
    Polling {
        job_id: String,
        last_known_status: Vec<SourceStatus>,
        message: String,
    },

    #[error("job {job_id} did not complete within {polls} polls")]
    PollingTimeout { job_id: String, polls: u32 },

    #[error(
        "job {job_id} reported progress {current} for source {source_name} after {previous}"
    )]
    ProgressRegression {
        job_id: String,
        source_name: String,
        previous: u8,
        current: u8,
    },

    #[error("failed to fetch result of source {source_name} for job {job_id}: {message}")]
    ResultFetch {
        job_id: String,
        source_name: String,
        message: String,
    },

    #[error("network fetch failed: {0}")]
    NetworkFetch(String),

    #[error("could not convert CX document: {0}")]
    Conversion(String),

    #[error("MyGene request failed: {0}")]
    MyGeneHttp(String),

    #[error("MyGene returned status {status}: {message}")]
    MyGeneStatus { status: u16, message: String },

    #[error("search service request failed: {0}")]
    SearchHttp(String),

    #[error("search service returned status {status}: {message}")]
    SearchStatus { status: u16, message: String },

    #[error("CyREST request failed: {0}")]
    CyRestHttp(String),

    #[error("CyREST returned status {status}")]
    CyRestStatus { status: u16 },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigInvalid(String),
}

impl SearchError {
    /// True for failures caused by a remote service rather than local input.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SearchError::SourceResolution(_)
                | SearchError::AnnotationFetch(_)
                | SearchError::JobSubmission(_)
                | SearchError::Polling { .. }
                | SearchError::PollingTimeout { .. }
                | SearchError::ProgressRegression { .. }
                | SearchError::ResultFetch { .. }
                | SearchError::NetworkFetch(_)
                | SearchError::MyGeneHttp(_)
                | SearchError::MyGeneStatus { .. }
                | SearchError::SearchHttp(_)
                | SearchError::SearchStatus { .. }
                | SearchError::CyRestHttp(_)
                | SearchError::CyRestStatus { .. }
        )
    }
}
