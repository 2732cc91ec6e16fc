use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::{GeneAnnotationResult, JobId, MergedSearchResult, SourceInfo};
use crate::network::GraphModel;

/// Data records published by the pipeline for a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SearchEvent {
    #[serde(rename_all = "camelCase")]
    SearchDispatched {
        job_id: JobId,
        annotations: GeneAnnotationResult,
    },
    #[serde(rename_all = "camelCase")]
    SearchFailed {
        message: String,
        query: Vec<String>,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    SourceResultReceived {
        merged_results_so_far: MergedSearchResult,
    },
    #[serde(rename_all = "camelCase")]
    SearchResultComplete { job_id: JobId },
    #[serde(rename_all = "camelCase")]
    SearchResultFailed { job_id: JobId, error: String },
    #[serde(rename_all = "camelCase")]
    NetworkReady { graph_model: Box<GraphModel> },
    #[serde(rename_all = "camelCase")]
    NetworkTooLarge { element_count: usize },
    NetworkFailed { error: String },
    NetworkCleared,
    #[serde(rename_all = "camelCase")]
    AvailabilityChanged { is_available: bool },
    SourcesFound { sources: Vec<SourceInfo> },
    SourcesFailed { error: String },
}

impl SearchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SearchEvent::SearchDispatched { .. } => "searchDispatched",
            SearchEvent::SearchFailed { .. } => "searchFailed",
            SearchEvent::SourceResultReceived { .. } => "sourceResultReceived",
            SearchEvent::SearchResultComplete { .. } => "searchResultComplete",
            SearchEvent::SearchResultFailed { .. } => "searchResultFailed",
            SearchEvent::NetworkReady { .. } => "networkReady",
            SearchEvent::NetworkTooLarge { .. } => "networkTooLarge",
            SearchEvent::NetworkFailed { .. } => "networkFailed",
            SearchEvent::NetworkCleared => "networkCleared",
            SearchEvent::AvailabilityChanged { .. } => "availabilityChanged",
            SearchEvent::SourcesFound { .. } => "sourcesFound",
            SearchEvent::SourcesFailed { .. } => "sourcesFailed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: SearchEvent);
}

/// Forwards events to a channel; a closed receiver drops them silently.
impl EventSink for UnboundedSender<SearchEvent> {
    fn publish(&self, event: SearchEvent) {
        let _ = self.send(event);
    }
}
