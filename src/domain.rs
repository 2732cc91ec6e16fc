use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SearchError;

pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(5000);
pub const MAX_NETWORK_SIZE: usize = 5000;
pub const FORCE_LAYOUT_THRESHOLD: usize = 500;
pub const RESERVED_SOURCE_NAME: &str = "keyword";
pub const CYREST_PORT: u16 = 1234;
pub const COMPLETE_PROGRESS: u8 = 100;

static GENE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s,]+").unwrap());

/// Genes to search for plus the sources to search in.
///
/// An empty `source_names` list means "every queryable source", resolved at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    genes: Vec<String>,
    source_names: Vec<String>,
}

impl SearchQuery {
    pub fn new<G, S>(genes: G, source_names: S) -> Result<Self, SearchError>
    where
        G: IntoIterator,
        G::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let genes = genes
            .into_iter()
            .map(Into::into)
            .map(|gene: String| gene.trim().to_string())
            .filter(|gene| !gene.is_empty())
            .collect::<Vec<_>>();
        if genes.is_empty() {
            return Err(SearchError::InvalidQuery(
                "at least one gene symbol is required".to_string(),
            ));
        }
        let source_names = source_names
            .into_iter()
            .map(Into::into)
            .map(|name: String| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(Self {
            genes,
            source_names,
        })
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn source_names(&self) -> &[String] {
        &self.source_names
    }

    /// Comma-joined gene list, the form the annotation service expects.
    pub fn joined_genes(&self) -> String {
        self.genes.join(",")
    }

    pub fn with_sources<S>(self, source_names: S) -> Result<Self, SearchError>
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self::new(self.genes, source_names)
    }
}

impl FromStr for SearchQuery {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let genes = GENE_SEPARATOR
            .split(value.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Self::new(genes, Vec::<String>::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Extracts the job id from a location reference such as
    /// `https://search.example.org/v1/3f2a...`: the last non-empty path segment.
    pub fn from_location(location: &str) -> Result<Self, SearchError> {
        let segment = location
            .trim()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("");
        let segment = segment.split(['?', '#']).next().unwrap_or("");
        if segment.is_empty() {
            return Err(SearchError::JobSubmission(format!(
                "no job id in location `{location}`"
            )));
        }
        Ok(Self(segment.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the source registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub number_of_networks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source_name: String,
    pub progress: u8,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub number_of_hits: Option<u64>,
}

impl SourceStatus {
    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE_PROGRESS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceStatus>,
}

impl JobStatus {
    /// A job is complete when every source reports full progress.
    pub fn is_complete(&self) -> bool {
        self.sources.iter().all(SourceStatus::is_complete)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHit {
    #[serde(rename = "networkUUID")]
    pub network_uuid: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "nodes")]
    pub node_count: usize,
    #[serde(default, rename = "edges")]
    pub edge_count: usize,
    #[serde(default)]
    pub hit_genes: Vec<String>,
    #[serde(default, rename = "imageURL")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NetworkHit {
    pub fn element_count(&self) -> usize {
        self.node_count.saturating_add(self.edge_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source_name: String,
    #[serde(default, rename = "sourceUUID")]
    pub source_uuid: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Vec<NetworkHit>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a per-source result request; the service wraps the single source
/// in a `sources` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultDocument {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceResult>,
}

/// Results of every source completed so far, in the order they completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedSearchResult {
    pub job_id: JobId,
    pub sources: Vec<SourceResult>,
}

impl MergedSearchResult {
    pub fn source(&self, name: &str) -> Option<&SourceResult> {
        self.sources.iter().find(|source| source.source_name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub query: String,
    #[serde(default)]
    pub notfound: bool,
    #[serde(default, rename = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entrezgene: Option<Value>,
    #[serde(default)]
    pub taxid: Option<u64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Found annotations keyed by query string, in the order the service
/// returned them. Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueGeneMap {
    entries: Vec<(String, GeneAnnotation)>,
}

impl UniqueGeneMap {
    /// Replaces an existing entry in place, otherwise appends.
    pub fn insert(&mut self, query: String, annotation: GeneAnnotation) {
        match self.entries.iter_mut().find(|(key, _)| *key == query) {
            Some((_, existing)) => *existing = annotation,
            None => self.entries.push((query, annotation)),
        }
    }

    pub fn remove(&mut self, query: &str) {
        self.entries.retain(|(key, _)| key != query);
    }

    pub fn get(&self, query: &str) -> Option<&GeneAnnotation> {
        self.entries
            .iter()
            .find(|(key, _)| key == query)
            .map(|(_, annotation)| annotation)
    }

    pub fn contains_key(&self, query: &str) -> bool {
        self.get(query).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for UniqueGeneMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(key, value)| (key, value)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneAnnotationResult {
    pub unique_gene_map: UniqueGeneMap,
    pub not_found: Vec<String>,
}

impl GeneAnnotationResult {
    /// Splits raw annotation entries into found and not-found symbols.
    ///
    /// Found entries are keyed by the submitted query string in response
    /// order; a repeated query keeps the entry seen last.
    pub fn classify(entries: Vec<GeneAnnotation>) -> Self {
        let mut result = Self::default();
        for entry in entries {
            if entry.notfound {
                result.unique_gene_map.remove(&entry.query);
                if !result.not_found.contains(&entry.query) {
                    result.not_found.push(entry.query);
                }
            } else {
                result.not_found.retain(|query| query != &entry.query);
                result.unique_gene_map.insert(entry.query.clone(), entry);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_query_from_text() {
        let query: SearchQuery = "TP53, egfr\n MYC".parse().unwrap();
        assert_eq!(query.genes(), ["TP53", "egfr", "MYC"]);
        assert!(query.source_names().is_empty());
        assert_eq!(query.joined_genes(), "TP53,egfr,MYC");
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = " , ".parse::<SearchQuery>().unwrap_err();
        assert_matches!(err, SearchError::InvalidQuery(_));
    }

    #[test]
    fn job_id_from_location() {
        let id = JobId::from_location("http://localhost/v1/abc-123").unwrap();
        assert_eq!(id.as_str(), "abc-123");
        let id = JobId::from_location("http://localhost/v1/abc-123/").unwrap();
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn job_id_requires_segment() {
        assert_matches!(JobId::from_location(""), Err(SearchError::JobSubmission(_)));
    }

    #[test]
    fn job_status_completion() {
        let status = JobStatus {
            job_id: None,
            status: None,
            sources: vec![
                SourceStatus {
                    source_name: "enrichment".to_string(),
                    progress: 100,
                    status: None,
                    number_of_hits: None,
                },
                SourceStatus {
                    source_name: "interactome".to_string(),
                    progress: 40,
                    status: None,
                    number_of_hits: None,
                },
            ],
        };
        assert!(!status.is_complete());
    }

    fn found(query: &str) -> GeneAnnotation {
        serde_json::from_value(serde_json::json!({"query": query, "symbol": query})).unwrap()
    }

    #[test]
    fn found_genes_keep_response_order() {
        let result =
            GeneAnnotationResult::classify(vec![found("TP53"), found("EGFR"), found("AKT1")]);
        assert_eq!(
            result.unique_gene_map.keys().collect::<Vec<_>>(),
            ["TP53", "EGFR", "AKT1"]
        );

        let json = serde_json::to_string(&result.unique_gene_map).unwrap();
        let tp53 = json.find("\"TP53\"").unwrap();
        let egfr = json.find("\"EGFR\"").unwrap();
        let akt1 = json.find("\"AKT1\"").unwrap();
        assert!(tp53 < egfr && egfr < akt1);
    }

    #[test]
    fn repeated_query_replaces_in_place() {
        let mut second = found("TP53");
        second.name = Some("tumor protein p53".to_string());
        let result = GeneAnnotationResult::classify(vec![found("TP53"), found("EGFR"), second]);
        assert_eq!(
            result.unique_gene_map.keys().collect::<Vec<_>>(),
            ["TP53", "EGFR"]
        );
        assert_eq!(
            result.unique_gene_map.get("TP53").unwrap().name.as_deref(),
            Some("tumor protein p53")
        );
    }

    #[test]
    fn saturating_element_count() {
        let hit: NetworkHit = serde_json::from_value(serde_json::json!({
            "networkUUID": "n", "nodes": usize::MAX, "edges": 5
        }))
        .unwrap();
        assert_eq!(hit.element_count(), usize::MAX);
    }
}
