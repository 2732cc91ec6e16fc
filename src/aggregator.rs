use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{
    JOB_POLL_INTERVAL, JobId, JobStatus, MergedSearchResult, SourceResult, SourceStatus,
};
use crate::error::SearchError;
use crate::events::{EventSink, SearchEvent};
use crate::search_service::SearchJobClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSummary {
    pub polls: u32,
    pub merged: MergedSearchResult,
}

/// Everything the polling loop carries from one status check to the next.
#[derive(Debug, Default)]
struct PollState {
    polls: u32,
    published: HashSet<String>,
    accumulated: Vec<SourceResult>,
    progress: HashMap<String, u8>,
    last_status: Vec<SourceStatus>,
}

/// Polls a search job until every source completes, publishing each source's
/// result once as it becomes available.
pub struct ResultAggregator<J> {
    jobs: Arc<J>,
    poll_interval: Duration,
    max_polls: Option<u32>,
}

impl<J> Clone for ResultAggregator<J> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            poll_interval: self.poll_interval,
            max_polls: self.max_polls,
        }
    }
}

impl<J: SearchJobClient> ResultAggregator<J> {
    pub fn new(jobs: Arc<J>) -> Self {
        Self {
            jobs,
            poll_interval: JOB_POLL_INTERVAL,
            max_polls: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Gives up with `PollingTimeout` after this many incomplete status checks.
    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub async fn run(
        &self,
        job_id: &JobId,
        sink: &dyn EventSink,
    ) -> Result<AggregationSummary, SearchError> {
        let mut state = PollState::default();
        loop {
            state.polls += 1;
            let status = self.jobs.status(job_id).await.map_err(|err| {
                warn!(job_id = %job_id, error = %err, "status check failed");
                SearchError::Polling {
                    job_id: job_id.to_string(),
                    last_known_status: state.last_status.clone(),
                    message: err.to_string(),
                }
            })?;
            debug!(
                job_id = %job_id,
                poll = state.polls,
                sources = status.sources.len(),
                "polled job status"
            );

            record_progress(job_id, &mut state.progress, &status)?;
            self.publish_completed(job_id, &status, &mut state, sink)
                .await?;
            let complete = status.is_complete();
            state.last_status = status.sources;

            if complete {
                info!(
                    job_id = %job_id,
                    polls = state.polls,
                    sources = state.accumulated.len(),
                    "search job complete"
                );
                return Ok(AggregationSummary {
                    polls: state.polls,
                    merged: MergedSearchResult {
                        job_id: job_id.clone(),
                        sources: state.accumulated,
                    },
                });
            }
            if self.max_polls.is_some_and(|max| state.polls >= max) {
                return Err(SearchError::PollingTimeout {
                    job_id: job_id.to_string(),
                    polls: state.polls,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn publish_completed(
        &self,
        job_id: &JobId,
        status: &JobStatus,
        state: &mut PollState,
        sink: &dyn EventSink,
    ) -> Result<(), SearchError> {
        let newly_complete = status
            .sources
            .iter()
            .filter(|source| source.is_complete())
            .filter(|source| !state.published.contains(&source.source_name))
            .collect::<Vec<_>>();
        for source in newly_complete {
            let result = self.fetch_source(job_id, &source.source_name).await?;
            state.published.insert(source.source_name.clone());
            state.accumulated.push(result);
            debug!(job_id = %job_id, source = %source.source_name, "source result received");
            sink.publish(SearchEvent::SourceResultReceived {
                merged_results_so_far: MergedSearchResult {
                    job_id: job_id.clone(),
                    sources: state.accumulated.clone(),
                },
            });
        }
        Ok(())
    }

    async fn fetch_source(
        &self,
        job_id: &JobId,
        source_name: &str,
    ) -> Result<SourceResult, SearchError> {
        let result_fetch = |message: String| SearchError::ResultFetch {
            job_id: job_id.to_string(),
            source_name: source_name.to_string(),
            message,
        };
        let document = self
            .jobs
            .source_result(job_id, source_name)
            .await
            .map_err(|err| result_fetch(err.to_string()))?;
        document
            .sources
            .into_iter()
            .next()
            .ok_or_else(|| result_fetch("result lists no source entry".to_string()))
    }
}

fn record_progress(
    job_id: &JobId,
    progress: &mut HashMap<String, u8>,
    status: &JobStatus,
) -> Result<(), SearchError> {
    for source in &status.sources {
        let previous = progress.insert(source.source_name.clone(), source.progress);
        if let Some(previous) = previous
            && source.progress < previous
        {
            return Err(SearchError::ProgressRegression {
                job_id: job_id.to_string(),
                source_name: source.source_name.clone(),
                previous,
                current: source.progress,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn status(entries: &[(&str, u8)]) -> JobStatus {
        JobStatus {
            job_id: None,
            status: None,
            sources: entries
                .iter()
                .map(|(name, progress)| SourceStatus {
                    source_name: name.to_string(),
                    progress: *progress,
                    status: None,
                    number_of_hits: None,
                })
                .collect(),
        }
    }

    #[test]
    fn progress_may_stay_or_grow() {
        let job = JobId::new("job");
        let mut progress = HashMap::new();
        record_progress(&job, &mut progress, &status(&[("a", 10), ("b", 0)])).unwrap();
        record_progress(&job, &mut progress, &status(&[("a", 10), ("b", 100)])).unwrap();
        assert_eq!(progress["b"], 100);
    }

    #[test]
    fn progress_decrease_is_rejected() {
        let job = JobId::new("job");
        let mut progress = HashMap::new();
        record_progress(&job, &mut progress, &status(&[("a", 60)])).unwrap();
        let err = record_progress(&job, &mut progress, &status(&[("a", 20)])).unwrap_err();
        assert_matches!(
            err,
            SearchError::ProgressRegression { previous: 60, current: 20, .. }
        );
    }
}
