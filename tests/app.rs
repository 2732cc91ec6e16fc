use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::sync::mpsc;

use gene_network_search::app::SearchApp;
use gene_network_search::cx::{CxConverter, RawGraphDocument};
use gene_network_search::domain::{
    GeneAnnotation, JobId, JobStatus, SearchQuery, SearchResultDocument, SourceInfo,
    SourceStatus,
};
use gene_network_search::error::SearchError;
use gene_network_search::events::{EventSink, SearchEvent};
use gene_network_search::mygene::GeneAnnotationClient;
use gene_network_search::network::{AssembleOutcome, NetworkRequest};
use gene_network_search::search_service::{
    NetworkDocumentClient, SearchJobClient, SourceRegistryClient,
};

struct MockAnnotations;

#[async_trait]
impl GeneAnnotationClient for MockAnnotations {
    async fn annotate(&self, genes: &str) -> Result<Vec<GeneAnnotation>, SearchError> {
        genes
            .split(',')
            .map(|gene| {
                serde_json::from_value(serde_json::json!({"query": gene, "symbol": gene}))
                    .map_err(|err| SearchError::MyGeneHttp(err.to_string()))
            })
            .collect()
    }
}

struct MockRegistry {
    fail: bool,
}

#[async_trait]
impl SourceRegistryClient for MockRegistry {
    async fn list_sources(&self) -> Result<Vec<SourceInfo>, SearchError> {
        if self.fail {
            return Err(SearchError::SearchHttp("registry down".to_string()));
        }
        ["enrichment", "keyword"]
            .iter()
            .map(|name| {
                serde_json::from_value(serde_json::json!({ "name": name }))
                    .map_err(|err| SearchError::SearchHttp(err.to_string()))
            })
            .collect()
    }
}

/// Jobs whose id starts with `slow` never finish; every other job is done on
/// its first status check.
#[derive(Default)]
struct MockJobs {
    status_calls: Mutex<HashMap<String, usize>>,
}

impl MockJobs {
    fn status_calls(&self, job: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(job)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SearchJobClient for MockJobs {
    async fn submit(&self, _genes: &[String], _sources: &[String]) -> Result<String, SearchError> {
        Ok("http://search.test/v1/fast-1".to_string())
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatus, SearchError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default() += 1;
        let progress = if job_id.as_str().starts_with("slow") {
            20
        } else {
            100
        };
        Ok(JobStatus {
            job_id: Some(job_id.to_string()),
            status: None,
            sources: vec![SourceStatus {
                source_name: "enrichment".to_string(),
                progress,
                status: None,
                number_of_hits: None,
            }],
        })
    }

    async fn source_result(
        &self,
        _job_id: &JobId,
        source_name: &str,
    ) -> Result<SearchResultDocument, SearchError> {
        serde_json::from_value(serde_json::json!({
            "sources": [{"sourceName": source_name, "sourceUUID": "u-1", "results": []}]
        }))
        .map_err(|err| SearchError::SearchHttp(err.to_string()))
    }
}

#[derive(Default)]
struct MockNetworks {
    fail: AtomicBool,
    fetches: Mutex<usize>,
}

#[async_trait]
impl NetworkDocumentClient for MockNetworks {
    async fn fetch_network(
        &self,
        _job_id: &JobId,
        _source_uuid: &str,
        _network_uuid: &str,
    ) -> Result<RawGraphDocument, SearchError> {
        *self.fetches.lock().unwrap() += 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(SearchError::SearchStatus {
                status: 404,
                message: "no such network".to_string(),
            });
        }
        Ok(RawGraphDocument::new(
            br#"[{"nodes": [{"@id": 1, "n": "TP53"}, {"@id": 2, "n": "MDM2"}]},
                 {"edges": [{"@id": 3, "s": 1, "t": 2}]}]"#
                .to_vec(),
        ))
    }
}

type TestApp = SearchApp<MockAnnotations, MockRegistry, MockJobs, Arc<MockNetworks>, CxConverter>;

fn app_with(
    registry: MockRegistry,
    networks: Arc<MockNetworks>,
) -> (TestApp, Arc<MockJobs>, mpsc::UnboundedReceiver<SearchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn EventSink> = Arc::new(tx);
    let jobs = Arc::new(MockJobs::default());
    let app = SearchApp::new(
        MockAnnotations,
        registry,
        Arc::clone(&jobs),
        networks,
        CxConverter,
        sink,
    );
    (app, jobs, rx)
}

fn app() -> (TestApp, Arc<MockJobs>, mpsc::UnboundedReceiver<SearchEvent>) {
    app_with(MockRegistry { fail: false }, Arc::new(MockNetworks::default()))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SearchEvent>) -> Vec<SearchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn names(events: &[SearchEvent]) -> Vec<&'static str> {
    events.iter().map(SearchEvent::name).collect()
}

fn request(node_count: usize) -> NetworkRequest {
    NetworkRequest {
        job_id: JobId::new("fast-1"),
        source_uuid: "u-1".to_string(),
        network_uuid: "n-1".to_string(),
        network_name: None,
        node_count,
        edge_count: 1,
        query_genes: vec!["tp53".to_string()],
        hit_genes: Vec::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn search_then_results_publish_in_order() {
    let (mut app, _jobs, mut rx) = app();
    let query: SearchQuery = "TP53 MDM2".parse().unwrap();

    let outcome = app.search(&query).await.unwrap();
    assert_eq!(outcome.job_id, JobId::new("fast-1"));
    app.fetch_results(outcome.job_id);
    let summary = app.wait_for_results().await.unwrap().unwrap();
    assert_eq!(summary.merged.sources.len(), 1);

    let events = drain(&mut rx);
    assert_eq!(
        names(&events),
        ["searchDispatched", "sourceResultReceived", "searchResultComplete"]
    );
    assert_matches!(&events[0], SearchEvent::SearchDispatched { annotations, .. } => {
        assert_eq!(annotations.unique_gene_map.len(), 2);
    });
}

#[tokio::test]
async fn failed_dispatch_publishes_query() {
    let (app, _jobs, mut rx) = app_with(
        MockRegistry { fail: true },
        Arc::new(MockNetworks::default()),
    );
    let query: SearchQuery = "TP53".parse().unwrap();

    let err = app.search(&query).await.unwrap_err();
    assert_matches!(err, SearchError::SourceResolution(_));
    assert_matches!(
        drain(&mut rx).as_slice(),
        [SearchEvent::SearchFailed { query, .. }] => {
            assert_eq!(query, &["TP53"]);
        }
    );
}

#[tokio::test(start_paused = true)]
async fn new_aggregation_replaces_the_running_one() {
    let (mut app, jobs, mut rx) = app();

    app.fetch_results(JobId::new("slow-1"));
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let slow_polls = jobs.status_calls("slow-1");
    assert!(slow_polls >= 2);

    app.fetch_results(JobId::new("fast-2"));
    let result = app.wait_for_results().await.unwrap();
    assert!(result.is_ok());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(jobs.status_calls("slow-1"), slow_polls);

    let events = drain(&mut rx);
    let terminal = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                SearchEvent::SearchResultComplete { .. } | SearchEvent::SearchResultFailed { .. }
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(terminal.len(), 1);
    assert_matches!(terminal[0], SearchEvent::SearchResultComplete { job_id } => {
        assert_eq!(job_id.as_str(), "fast-2");
    });
}

#[tokio::test]
async fn network_ready_replaces_model_and_clear_drops_it() {
    let (mut app, _jobs, mut rx) = app();

    let outcome = app.fetch_network(&request(2)).await.unwrap();
    assert_matches!(outcome, AssembleOutcome::Ready(_));
    let model = app.current_network().unwrap();
    assert!(model.node_named("TP53").unwrap().is_query_match());

    app.clear_network();
    assert!(app.current_network().is_none());
    assert_eq!(names(&drain(&mut rx)), ["networkReady", "networkCleared"]);
}

#[tokio::test]
async fn oversized_network_is_not_downloaded() {
    let networks = Arc::new(MockNetworks::default());
    let (mut app, _jobs, mut rx) =
        app_with(MockRegistry { fail: false }, Arc::clone(&networks));

    let outcome = app.fetch_network(&request(6000)).await.unwrap();
    assert_eq!(
        outcome,
        AssembleOutcome::TooLarge {
            element_count: 6001
        }
    );
    assert_eq!(*networks.fetches.lock().unwrap(), 0);
    assert!(app.current_network().is_none());
    assert_matches!(
        drain(&mut rx).as_slice(),
        [SearchEvent::NetworkTooLarge { element_count: 6001 }]
    );
}

#[tokio::test]
async fn failed_fetch_publishes_network_failed() {
    let networks = Arc::new(MockNetworks {
        fail: AtomicBool::new(true),
        ..MockNetworks::default()
    });
    let (mut app, _jobs, mut rx) = app_with(MockRegistry { fail: false }, networks);

    let err = app.fetch_network(&request(2)).await.unwrap_err();
    assert_matches!(err, SearchError::NetworkFetch(_));
    assert_eq!(names(&drain(&mut rx)), ["networkFailed"]);
}

#[tokio::test]
async fn oversized_request_drops_previous_model() {
    let (mut app, _jobs, mut rx) = app();

    app.fetch_network(&request(2)).await.unwrap();
    assert!(app.current_network().is_some());

    let outcome = app.fetch_network(&request(6000)).await.unwrap();
    assert_matches!(outcome, AssembleOutcome::TooLarge { .. });
    assert!(app.current_network().is_none());
    assert_eq!(names(&drain(&mut rx)), ["networkReady", "networkTooLarge"]);
}

#[tokio::test]
async fn failed_fetch_drops_previous_model() {
    let networks = Arc::new(MockNetworks::default());
    let (mut app, _jobs, mut rx) =
        app_with(MockRegistry { fail: false }, Arc::clone(&networks));

    app.fetch_network(&request(2)).await.unwrap();
    assert!(app.current_network().is_some());

    networks.fail.store(true, Ordering::SeqCst);
    let err = app.fetch_network(&request(2)).await.unwrap_err();
    assert_matches!(err, SearchError::NetworkFetch(_));
    assert!(app.current_network().is_none());
    assert_eq!(names(&drain(&mut rx)), ["networkReady", "networkFailed"]);
}

#[tokio::test]
async fn find_sources_publishes_full_list() {
    let (app, _jobs, mut rx) = app();
    let sources = app.find_sources().await.unwrap();
    assert_eq!(sources.len(), 2);
    assert_matches!(
        drain(&mut rx).as_slice(),
        [SearchEvent::SourcesFound { sources }] => {
            assert_eq!(sources.len(), 2);
        }
    );
}
