use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cx::{AttributeNameMap, DocumentConverter, NiceCx, RawGraphDocument};
use crate::domain::{FORCE_LAYOUT_THRESHOLD, JobId, MAX_NETWORK_SIZE, NetworkHit, SourceResult};
use crate::error::SearchError;
use crate::style::{StyleRule, append_interaction_layers};

pub const QUERY_MATCH_KEY: &str = "isQueryMatch";
pub const NETWORK_BACKGROUND_PAINT: &str = "NETWORK_BACKGROUND_PAINT";
/// Background used when the document declares none.
pub const DEFAULT_BACKGROUND_COLOR: &str = "pink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementGroup {
    Nodes,
    Edges,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node or edge record in cytoscape.js element form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub group: ElementGroup,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Element {
    pub fn id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    pub fn is_node(&self) -> bool {
        self.group == ElementGroup::Nodes
    }

    pub fn is_query_match(&self) -> bool {
        self.data
            .get(QUERY_MATCH_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CyElements {
    pub nodes: Vec<Element>,
    pub edges: Vec<Element>,
}

/// How the renderer should position nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutChoice {
    /// Positions taken verbatim from the document.
    Preset,
    /// Force-directed layout.
    Cose,
    Concentric,
}

pub fn select_layout(layout_present: bool, element_count: usize, threshold: usize) -> LayoutChoice {
    if layout_present {
        LayoutChoice::Preset
    } else if element_count < threshold {
        LayoutChoice::Cose
    } else {
        LayoutChoice::Concentric
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    pub elements: Vec<Element>,
    pub style: Vec<StyleRule>,
    pub layout_present: bool,
    pub background_color: String,
    pub layout: LayoutChoice,
    pub network_attributes: Map<String, Value>,
}

impl GraphModel {
    pub fn nodes(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|element| element.is_node())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|element| !element.is_node())
    }

    pub fn node_named(&self, name: &str) -> Option<&Element> {
        self.nodes().find(|node| node.name() == Some(name))
    }
}

/// Identifies one network hit to fetch, with the counts announced by the
/// search job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub job_id: JobId,
    pub source_uuid: String,
    pub network_uuid: String,
    pub network_name: Option<String>,
    pub node_count: usize,
    pub edge_count: usize,
    pub query_genes: Vec<String>,
    pub hit_genes: Vec<String>,
}

impl NetworkRequest {
    /// Builds a request for `hit`; `None` when the source carries no UUID.
    pub fn from_hit(
        job_id: JobId,
        source: &SourceResult,
        hit: &NetworkHit,
        query_genes: &[String],
    ) -> Option<Self> {
        Some(Self {
            job_id,
            source_uuid: source.source_uuid.clone()?,
            network_uuid: hit.network_uuid.clone(),
            network_name: hit.description.clone(),
            node_count: hit.node_count,
            edge_count: hit.edge_count,
            query_genes: query_genes.to_vec(),
            hit_genes: hit.hit_genes.clone(),
        })
    }

    pub fn element_count(&self) -> usize {
        self.node_count.saturating_add(self.edge_count)
    }

    /// Public page of the network this hit was derived from.
    pub fn original_network_url(&self, ndex_base_url: &str) -> String {
        format!(
            "{}/#/network/{}",
            ndex_base_url.trim_end_matches('/'),
            self.network_uuid
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AssembleOutcome {
    Ready(Box<GraphModel>),
    #[serde(rename_all = "camelCase")]
    TooLarge { element_count: usize },
}

pub struct NetworkAssembler<C> {
    converter: C,
    max_network_size: usize,
    force_layout_threshold: usize,
}

impl<C: DocumentConverter> NetworkAssembler<C> {
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            max_network_size: MAX_NETWORK_SIZE,
            force_layout_threshold: FORCE_LAYOUT_THRESHOLD,
        }
    }

    pub fn with_limits(mut self, max_network_size: usize, force_layout_threshold: usize) -> Self {
        self.max_network_size = max_network_size;
        self.force_layout_threshold = force_layout_threshold;
        self
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// `TooLarge` when the announced counts exceed the ceiling.
    pub fn check_size(&self, request: &NetworkRequest) -> Option<AssembleOutcome> {
        let element_count = request.element_count();
        if element_count <= self.max_network_size {
            return None;
        }
        warn!(
            network = %request.network_uuid,
            element_count,
            limit = self.max_network_size,
            "network too large to convert"
        );
        Some(AssembleOutcome::TooLarge { element_count })
    }

    pub fn assemble(
        &self,
        raw: &RawGraphDocument,
        request: &NetworkRequest,
    ) -> Result<AssembleOutcome, SearchError> {
        if let Some(outcome) = self.check_size(request) {
            return Ok(outcome);
        }

        let nice = self.converter.to_nice(raw)?;
        let mut names = AttributeNameMap::default();
        let elements = self.converter.elements(&nice, &mut names)?;
        let mut style = self.converter.style(&nice, &mut names);
        append_interaction_layers(&mut style);

        let CyElements { mut nodes, edges } = elements;
        tag_query_nodes(&mut nodes, &request.query_genes);
        let layout_present = nodes.first().is_some_and(|node| node.position.is_some());

        let mut elements = nodes;
        elements.extend(edges);
        let layout = select_layout(layout_present, elements.len(), self.force_layout_threshold);

        debug!(
            network = %request.network_uuid,
            elements = elements.len(),
            rules = style.len(),
            ?layout,
            "assembled network"
        );

        Ok(AssembleOutcome::Ready(Box::new(GraphModel {
            elements,
            style,
            layout_present,
            background_color: background_color(&nice),
            layout,
            network_attributes: network_attributes(&nice),
        })))
    }
}

/// Marks nodes whose name matches a query gene, ignoring case.
pub fn tag_query_nodes(nodes: &mut [Element], query_genes: &[String]) {
    let query = query_genes
        .iter()
        .map(|gene| gene.to_uppercase())
        .collect::<HashSet<_>>();
    for node in nodes {
        let matched = node
            .name()
            .is_some_and(|name| query.contains(&name.to_uppercase()));
        if matched {
            node.data
                .insert(QUERY_MATCH_KEY.to_string(), Value::Bool(true));
        }
    }
}

pub fn background_color(nice: &NiceCx) -> String {
    nice.visual_properties_of("network")
        .find_map(|entry| entry.properties.get(NETWORK_BACKGROUND_PAINT))
        .cloned()
        .unwrap_or_else(|| DEFAULT_BACKGROUND_COLOR.to_string())
}

fn network_attributes(nice: &NiceCx) -> Map<String, Value> {
    nice.network_attributes
        .iter()
        .map(|attribute| (attribute.name.clone(), attribute.typed_value()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_selection_policy() {
        assert_eq!(select_layout(true, 4000, 500), LayoutChoice::Preset);
        assert_eq!(select_layout(false, 499, 500), LayoutChoice::Cose);
        assert_eq!(select_layout(false, 500, 500), LayoutChoice::Concentric);
    }

    #[test]
    fn original_network_url() {
        let request = NetworkRequest {
            job_id: JobId::new("job"),
            source_uuid: "src".to_string(),
            network_uuid: "abc".to_string(),
            network_name: None,
            node_count: 1,
            edge_count: 0,
            query_genes: Vec::new(),
            hit_genes: Vec::new(),
        };
        assert_eq!(
            request.original_network_url("https://www.ndexbio.org/"),
            "https://www.ndexbio.org/#/network/abc"
        );
    }
}
