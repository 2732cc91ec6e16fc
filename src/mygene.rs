use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::GeneAnnotation;
use crate::error::SearchError;
use crate::http::{build_client, check_status};

const ANNOTATION_FIELDS: &str = "symbol,name,summary,entrezgene,taxid,alias,type_of_gene";

#[async_trait]
pub trait GeneAnnotationClient: Send + Sync {
    /// Looks up a comma-joined list of gene symbols. Symbols the service does
    /// not know come back flagged `notfound`.
    async fn annotate(&self, genes: &str) -> Result<Vec<GeneAnnotation>, SearchError>;
}

#[async_trait]
impl<T: GeneAnnotationClient + ?Sized> GeneAnnotationClient for Arc<T> {
    async fn annotate(&self, genes: &str) -> Result<Vec<GeneAnnotation>, SearchError> {
        (**self).annotate(genes).await
    }
}

#[derive(Clone)]
pub struct MyGeneHttpClient {
    client: Client,
    base_url: String,
    species: String,
}

impl MyGeneHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        species: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            species: species.into(),
        })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }
}

#[async_trait]
impl GeneAnnotationClient for MyGeneHttpClient {
    async fn annotate(&self, genes: &str) -> Result<Vec<GeneAnnotation>, SearchError> {
        let response = self
            .client
            .post(self.query_url())
            .form(&[
                ("q", genes),
                ("scopes", "symbol"),
                ("fields", ANNOTATION_FIELDS),
                ("species", self.species.as_str()),
            ])
            .send()
            .await
            .map_err(|err| SearchError::MyGeneHttp(err.to_string()))?;
        let response = check_status(response, "MyGene request failed", |status, message| {
            SearchError::MyGeneStatus { status, message }
        })
        .await?;
        response
            .json::<Vec<GeneAnnotation>>()
            .await
            .map_err(|err| SearchError::MyGeneHttp(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_annotation_response() {
        let body = r#"[
            {"query": "TP53", "_id": "7157", "symbol": "TP53", "name": "tumor protein p53",
             "entrezgene": "7157", "taxid": 9606, "_score": 89.1},
            {"query": "NOPE1", "notfound": true}
        ]"#;
        let entries: Vec<GeneAnnotation> = serde_json::from_str(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol.as_deref(), Some("TP53"));
        assert_eq!(entries[0].taxid, Some(9606));
        assert!(entries[0].extra.contains_key("_score"));
        assert!(entries[1].notfound);
    }
}
