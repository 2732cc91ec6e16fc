use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::{AggregationSummary, ResultAggregator};
use crate::config::ResolvedConfig;
use crate::cx::DocumentConverter;
use crate::dispatcher::{DispatchOutcome, QueryDispatcher};
use crate::domain::{JobId, SearchQuery, SourceInfo};
use crate::error::SearchError;
use crate::events::{EventSink, SearchEvent};
use crate::mygene::GeneAnnotationClient;
use crate::network::{AssembleOutcome, GraphModel, NetworkAssembler, NetworkRequest};
use crate::search_service::{NetworkDocumentClient, SearchJobClient, SourceRegistryClient};

/// Drives a search from query to rendered network and publishes every step.
///
/// At most one result aggregation runs at a time; starting another aborts
/// the one in flight.
pub struct SearchApp<G, R, J, N, D> {
    dispatcher: QueryDispatcher<G, R, Arc<J>>,
    aggregator: ResultAggregator<J>,
    networks: N,
    assembler: NetworkAssembler<D>,
    sink: Arc<dyn EventSink>,
    aggregation: Option<AggregationTask>,
    current_network: Option<GraphModel>,
}

/// Background poll of one job; aborted when dropped.
struct AggregationTask(JoinHandle<Result<AggregationSummary, SearchError>>);

impl Drop for AggregationTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<G, R, J, N, D> SearchApp<G, R, J, N, D>
where
    G: GeneAnnotationClient,
    R: SourceRegistryClient,
    J: SearchJobClient + 'static,
    N: NetworkDocumentClient,
    D: DocumentConverter,
{
    pub fn new(
        annotations: G,
        registry: R,
        jobs: Arc<J>,
        networks: N,
        converter: D,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            dispatcher: QueryDispatcher::new(annotations, registry, Arc::clone(&jobs)),
            aggregator: ResultAggregator::new(jobs),
            networks,
            assembler: NetworkAssembler::new(converter),
            sink,
            aggregation: None,
            current_network: None,
        }
    }

    pub fn configure(mut self, config: &ResolvedConfig) -> Self {
        self.aggregator = self
            .aggregator
            .with_poll_interval(config.job_poll_interval)
            .with_max_polls(config.max_job_polls);
        self.assembler = self
            .assembler
            .with_limits(config.max_network_size, config.force_layout_threshold);
        self
    }

    pub fn current_network(&self) -> Option<&GraphModel> {
        self.current_network.as_ref()
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<DispatchOutcome, SearchError> {
        match self.dispatcher.dispatch(query).await {
            Ok(outcome) => {
                self.sink.publish(SearchEvent::SearchDispatched {
                    job_id: outcome.job_id.clone(),
                    annotations: outcome.annotations.clone(),
                });
                Ok(outcome)
            }
            Err(err) => {
                self.sink.publish(SearchEvent::SearchFailed {
                    message: "search could not be dispatched".to_string(),
                    query: query.genes().to_vec(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub async fn find_sources(&self) -> Result<Vec<SourceInfo>, SearchError> {
        match self.dispatcher.find_sources().await {
            Ok(sources) => {
                self.sink.publish(SearchEvent::SourcesFound {
                    sources: sources.clone(),
                });
                Ok(sources)
            }
            Err(err) => {
                self.sink.publish(SearchEvent::SourcesFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Starts polling `job_id` in the background, replacing any earlier poll.
    pub fn fetch_results(&mut self, job_id: JobId) {
        if self.aggregation.take().is_some() {
            info!("replaced in-flight result aggregation");
        }
        let aggregator = self.aggregator.clone();
        let sink = Arc::clone(&self.sink);
        self.aggregation = Some(AggregationTask(tokio::spawn(async move {
            let result = aggregator.run(&job_id, sink.as_ref()).await;
            match &result {
                Ok(_) => sink.publish(SearchEvent::SearchResultComplete { job_id }),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "result aggregation failed");
                    sink.publish(SearchEvent::SearchResultFailed {
                        job_id,
                        error: err.to_string(),
                    });
                }
            }
            result
        })));
    }

    /// Waits for the current aggregation to finish. `None` when nothing is
    /// running or the task did not run to completion.
    pub async fn wait_for_results(
        &mut self,
    ) -> Option<Result<AggregationSummary, SearchError>> {
        let mut task = self.aggregation.take()?;
        (&mut task.0).await.ok()
    }

    pub async fn fetch_network(
        &mut self,
        request: &NetworkRequest,
    ) -> Result<AssembleOutcome, SearchError> {
        // A previous graph never outlives a newer request.
        self.current_network = None;
        let result = self.load_network(request).await;
        match &result {
            Ok(AssembleOutcome::Ready(model)) => {
                self.current_network = Some(model.as_ref().clone());
                self.sink.publish(SearchEvent::NetworkReady {
                    graph_model: model.clone(),
                });
            }
            Ok(AssembleOutcome::TooLarge { element_count }) => {
                self.sink.publish(SearchEvent::NetworkTooLarge {
                    element_count: *element_count,
                });
            }
            Err(err) => {
                warn!(network = %request.network_uuid, error = %err, "network fetch failed");
                self.sink.publish(SearchEvent::NetworkFailed {
                    error: err.to_string(),
                });
            }
        }
        result
    }

    pub fn clear_network(&mut self) {
        self.current_network = None;
        self.sink.publish(SearchEvent::NetworkCleared);
    }

    async fn load_network(
        &self,
        request: &NetworkRequest,
    ) -> Result<AssembleOutcome, SearchError> {
        if let Some(outcome) = self.assembler.check_size(request) {
            return Ok(outcome);
        }
        let raw = self
            .networks
            .fetch_network(&request.job_id, &request.source_uuid, &request.network_uuid)
            .await
            .map_err(|err| SearchError::NetworkFetch(err.to_string()))?;
        self.assembler.assemble(&raw, request)
    }
}
