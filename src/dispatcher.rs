use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{
    GeneAnnotationResult, JobId, RESERVED_SOURCE_NAME, SearchQuery, SourceInfo,
};
use crate::error::SearchError;
use crate::mygene::GeneAnnotationClient;
use crate::search_service::{SearchJobClient, SourceRegistryClient};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub job_id: JobId,
    pub location: String,
    pub annotations: GeneAnnotationResult,
}

/// Sends one query to the annotation service and the search service at once.
pub struct QueryDispatcher<G, R, J> {
    annotations: G,
    registry: R,
    jobs: J,
}

impl<G, R, J> QueryDispatcher<G, R, J>
where
    G: GeneAnnotationClient,
    R: SourceRegistryClient,
    J: SearchJobClient,
{
    pub fn new(annotations: G, registry: R, jobs: J) -> Self {
        Self {
            annotations,
            registry,
            jobs,
        }
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    pub async fn dispatch(&self, query: &SearchQuery) -> Result<DispatchOutcome, SearchError> {
        let source_names = if query.source_names().is_empty() {
            self.queryable_sources().await?
        } else {
            query.source_names().to_vec()
        };
        let joined = query.joined_genes();
        debug!(genes = %joined, sources = ?source_names, "dispatching query");

        let annotate = async {
            self.annotations
                .annotate(&joined)
                .await
                .map_err(|err| SearchError::AnnotationFetch(err.to_string()))
        };
        let submit = async {
            self.jobs
                .submit(query.genes(), &source_names)
                .await
                .map_err(|err| SearchError::JobSubmission(err.to_string()))
        };
        let (entries, location) = tokio::try_join!(annotate, submit).inspect_err(|err| {
            warn!(error = %err, "query dispatch failed");
        })?;

        let job_id = JobId::from_location(&location)?;
        let annotations = GeneAnnotationResult::classify(entries);
        info!(
            job_id = %job_id,
            found = annotations.unique_gene_map.len(),
            not_found = annotations.not_found.len(),
            "search job submitted"
        );
        Ok(DispatchOutcome {
            job_id,
            location,
            annotations,
        })
    }

    /// Every source the registry knows, including the reserved one.
    pub async fn find_sources(&self) -> Result<Vec<SourceInfo>, SearchError> {
        self.registry
            .list_sources()
            .await
            .map_err(|err| SearchError::SourceResolution(err.to_string()))
    }

    async fn queryable_sources(&self) -> Result<Vec<String>, SearchError> {
        let names = queryable_source_names(&self.find_sources().await?);
        if names.is_empty() {
            return Err(SearchError::SourceResolution(
                "registry lists no queryable source".to_string(),
            ));
        }
        Ok(names)
    }
}

/// Source names eligible for an unrestricted query.
pub fn queryable_source_names(sources: &[SourceInfo]) -> Vec<String> {
    sources
        .iter()
        .filter(|source| source.name != RESERVED_SOURCE_NAME)
        .map(|source| source.name.clone())
        .collect()
}
