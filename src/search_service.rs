use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::cx::RawGraphDocument;
use crate::domain::{JobId, JobStatus, SearchResultDocument, SourceInfo};
use crate::error::SearchError;
use crate::http::{build_client, check_status};

#[async_trait]
pub trait SourceRegistryClient: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<SourceInfo>, SearchError>;
}

#[async_trait]
pub trait SearchJobClient: Send + Sync {
    /// Starts a search job and returns the location reference of the job.
    async fn submit(&self, genes: &[String], source_names: &[String])
    -> Result<String, SearchError>;

    async fn status(&self, job_id: &JobId) -> Result<JobStatus, SearchError>;

    async fn source_result(
        &self,
        job_id: &JobId,
        source_name: &str,
    ) -> Result<SearchResultDocument, SearchError>;
}

#[async_trait]
pub trait NetworkDocumentClient: Send + Sync {
    async fn fetch_network(
        &self,
        job_id: &JobId,
        source_uuid: &str,
        network_uuid: &str,
    ) -> Result<RawGraphDocument, SearchError>;
}

#[async_trait]
impl<T: SourceRegistryClient + ?Sized> SourceRegistryClient for Arc<T> {
    async fn list_sources(&self) -> Result<Vec<SourceInfo>, SearchError> {
        (**self).list_sources().await
    }
}

#[async_trait]
impl<T: SearchJobClient + ?Sized> SearchJobClient for Arc<T> {
    async fn submit(
        &self,
        genes: &[String],
        source_names: &[String],
    ) -> Result<String, SearchError> {
        (**self).submit(genes, source_names).await
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatus, SearchError> {
        (**self).status(job_id).await
    }

    async fn source_result(
        &self,
        job_id: &JobId,
        source_name: &str,
    ) -> Result<SearchResultDocument, SearchError> {
        (**self).source_result(job_id, source_name).await
    }
}

#[async_trait]
impl<T: NetworkDocumentClient + ?Sized> NetworkDocumentClient for Arc<T> {
    async fn fetch_network(
        &self,
        job_id: &JobId,
        source_uuid: &str,
        network_uuid: &str,
    ) -> Result<RawGraphDocument, SearchError> {
        (**self)
            .fetch_network(job_id, source_uuid, network_uuid)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct SourceListResponse {
    #[serde(default)]
    results: Vec<SourceInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    gene_list: &'a [String],
    source_list: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Clone)]
pub struct SearchServiceHttpClient {
    client: Client,
    base_url: String,
}

impl SearchServiceHttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, SearchError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn source_url(&self) -> String {
        format!("{}/source", self.base_url)
    }

    fn submit_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn status_url(&self, job_id: &JobId) -> String {
        format!("{}/{}/status", self.base_url, job_id.as_str())
    }

    fn result_url(&self, job_id: &JobId) -> String {
        format!("{}/{}", self.base_url, job_id.as_str())
    }

    fn network_url(&self, job_id: &JobId) -> String {
        format!("{}/{}/overlaynetwork", self.base_url, job_id.as_str())
    }

    async fn handle_status(response: Response) -> Result<Response, SearchError> {
        check_status(response, "search service request failed", |status, message| {
            SearchError::SearchStatus { status, message }
        })
        .await
    }
}

fn http_error(err: reqwest::Error) -> SearchError {
    SearchError::SearchHttp(err.to_string())
}

#[async_trait]
impl SourceRegistryClient for SearchServiceHttpClient {
    async fn list_sources(&self) -> Result<Vec<SourceInfo>, SearchError> {
        let response = self
            .client
            .get(self.source_url())
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::handle_status(response).await?;
        let body: SourceListResponse = response.json().await.map_err(http_error)?;
        Ok(body.results)
    }
}

#[async_trait]
impl SearchJobClient for SearchServiceHttpClient {
    async fn submit(
        &self,
        genes: &[String],
        source_names: &[String],
    ) -> Result<String, SearchError> {
        let response = self
            .client
            .post(self.submit_url())
            .json(&QueryRequest {
                gene_list: genes,
                source_list: source_names,
            })
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::handle_status(response).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(location) = location {
            return Ok(location);
        }

        // Some deployments answer with the id in the body instead of a header.
        let body: SubmitResponse = response.json().await.map_err(http_error)?;
        body.id
            .map(|id| format!("{}/{id}", self.base_url))
            .ok_or_else(|| {
                SearchError::SearchHttp("job submission returned no location".to_string())
            })
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatus, SearchError> {
        let response = self
            .client
            .get(self.status_url(job_id))
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::handle_status(response).await?;
        response.json().await.map_err(http_error)
    }

    async fn source_result(
        &self,
        job_id: &JobId,
        source_name: &str,
    ) -> Result<SearchResultDocument, SearchError> {
        let response = self
            .client
            .get(self.result_url(job_id))
            .query(&[("source", source_name)])
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::handle_status(response).await?;
        response.json().await.map_err(http_error)
    }
}

#[async_trait]
impl NetworkDocumentClient for SearchServiceHttpClient {
    async fn fetch_network(
        &self,
        job_id: &JobId,
        source_uuid: &str,
        network_uuid: &str,
    ) -> Result<RawGraphDocument, SearchError> {
        let response = self
            .client
            .get(self.network_url(job_id))
            .query(&[("sourceUUID", source_uuid), ("networkUUID", network_uuid)])
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::handle_status(response).await?;
        let bytes = response.bytes().await.map_err(http_error)?;
        Ok(RawGraphDocument::new(bytes.to_vec()))
    }
}
