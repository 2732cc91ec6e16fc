//! CX (network exchange) document parsing and element derivation.
//!
//! A CX document is a JSON array of aspect fragments, each an object mapping
//! an aspect name to a list of entries:
//!
//! ```json
//! [{"nodes": [{"@id": 1, "n": "TP53"}]}, {"edges": [{"@id": 2, "s": 1, "t": 1}]}]
//! ```
//!
//! The same aspect may be split across several fragments. [`NiceCx`] is the
//! normalized form: every interpreted aspect collected into one place,
//! attributes grouped by the element they describe.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::error::SearchError;
use crate::network::{CyElements, Element, ElementGroup, Position};
use crate::style::{self, StyleRule};

pub const NODES: &str = "nodes";
pub const EDGES: &str = "edges";
pub const NODE_ATTRIBUTES: &str = "nodeAttributes";
pub const EDGE_ATTRIBUTES: &str = "edgeAttributes";
pub const NETWORK_ATTRIBUTES: &str = "networkAttributes";
pub const CARTESIAN_LAYOUT: &str = "cartesianLayout";
pub const CY_VISUAL_PROPERTIES: &str = "cyVisualProperties";
pub const VISUAL_PROPERTIES: &str = "visualProperties";

const RESERVED_DATA_KEYS: [&str; 3] = ["id", "source", "target"];

/// The exchange document exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGraphDocument(Vec<u8>);

impl RawGraphDocument {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CxNode {
    #[serde(rename = "@id")]
    pub id: u64,
    #[serde(default, rename = "n")]
    pub name: Option<String>,
    #[serde(default, rename = "r")]
    pub represents: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CxEdge {
    #[serde(rename = "@id")]
    pub id: u64,
    #[serde(rename = "s")]
    pub source: u64,
    #[serde(rename = "t")]
    pub target: u64,
    #[serde(default, rename = "i")]
    pub interaction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CxAttribute {
    #[serde(default, rename = "po")]
    pub property_of: Option<u64>,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(default, rename = "v")]
    pub value: Value,
    #[serde(default, rename = "d")]
    pub data_type: Option<String>,
}

impl CxAttribute {
    /// The attribute value converted according to its declared data type.
    /// Values that do not parse as declared are kept verbatim.
    pub fn typed_value(&self) -> Value {
        let data_type = self.data_type.as_deref().unwrap_or("string");
        match (&self.value, data_type.strip_prefix("list_of_")) {
            (Value::Array(items), Some(element_type)) => Value::Array(
                items
                    .iter()
                    .map(|item| convert_scalar(item, element_type))
                    .collect(),
            ),
            (value, _) => convert_scalar(value, data_type),
        }
    }
}

fn convert_scalar(value: &Value, data_type: &str) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };
    match data_type {
        "double" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        "integer" | "long" => text
            .parse::<i64>()
            .map(|number| Value::Number(number.into()))
            .unwrap_or_else(|_| value.clone()),
        "boolean" => match text.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CxLayoutEntry {
    pub node: u64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CxMapping {
    #[serde(rename = "type")]
    pub kind: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisualPropertyEntry {
    pub properties_of: String,
    #[serde(default)]
    pub applies_to: Option<u64>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub mappings: BTreeMap<String, CxMapping>,
}

/// Normalized CX: interpreted aspects merged across fragments, everything
/// else kept by aspect name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiceCx {
    pub nodes: Vec<CxNode>,
    pub edges: Vec<CxEdge>,
    pub node_attributes: HashMap<u64, Vec<CxAttribute>>,
    pub edge_attributes: HashMap<u64, Vec<CxAttribute>>,
    pub network_attributes: Vec<CxAttribute>,
    pub cartesian_layout: HashMap<u64, Position>,
    pub visual_properties: Vec<VisualPropertyEntry>,
    pub other_aspects: BTreeMap<String, Vec<Value>>,
}

impl NiceCx {
    pub fn element_count(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn visual_properties_of<'a>(
        &'a self,
        scope: &'a str,
    ) -> impl Iterator<Item = &'a VisualPropertyEntry> + 'a {
        self.visual_properties
            .iter()
            .filter(move |entry| entry.properties_of == scope)
    }
}

/// Maps CX attribute names to keys that are safe inside cytoscape.js data
/// selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeNameMap {
    names: BTreeMap<String, String>,
    taken: HashSet<String>,
}

impl AttributeNameMap {
    pub fn key_for(&mut self, name: &str) -> String {
        if let Some(existing) = self.names.get(name) {
            return existing.clone();
        }
        let mut key = name
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
            .collect::<String>();
        if key.is_empty()
            || key.starts_with(|ch: char| ch.is_ascii_digit())
            || RESERVED_DATA_KEYS.contains(&key.as_str())
        {
            key.insert(0, '_');
        }
        let mut candidate = key.clone();
        let mut suffix = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{key}_{suffix}");
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        self.names.insert(name.to_string(), candidate.clone());
        candidate
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }
}

/// Converts exchange documents into renderable elements and style.
///
/// Passed explicitly to the assembler so tests can substitute or observe it.
pub trait DocumentConverter: Send + Sync {
    fn to_nice(&self, raw: &RawGraphDocument) -> Result<NiceCx, SearchError>;

    fn elements(
        &self,
        nice: &NiceCx,
        names: &mut AttributeNameMap,
    ) -> Result<CyElements, SearchError>;

    fn style(&self, nice: &NiceCx, names: &mut AttributeNameMap) -> Vec<StyleRule>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CxConverter;

impl CxConverter {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentConverter for CxConverter {
    fn to_nice(&self, raw: &RawGraphDocument) -> Result<NiceCx, SearchError> {
        let fragments: Vec<Value> = serde_json::from_slice(raw.as_bytes())
            .map_err(|err| SearchError::Conversion(format!("not a CX array: {err}")))?;

        let mut nice = NiceCx::default();
        for fragment in fragments {
            let Value::Object(aspects) = fragment else {
                return Err(SearchError::Conversion(
                    "CX fragment is not an object".to_string(),
                ));
            };
            for (aspect, entries) in aspects {
                merge_aspect(&mut nice, &aspect, entries)?;
            }
        }
        Ok(nice)
    }

    fn elements(
        &self,
        nice: &NiceCx,
        names: &mut AttributeNameMap,
    ) -> Result<CyElements, SearchError> {
        let node_ids = nice.nodes.iter().map(|node| node.id).collect::<HashSet<_>>();

        let mut nodes = Vec::with_capacity(nice.nodes.len());
        for node in &nice.nodes {
            let mut data = Map::new();
            data.insert("id".to_string(), Value::String(node.id.to_string()));
            if let Some(name) = &node.name {
                data.insert("name".to_string(), Value::String(name.clone()));
            }
            if let Some(represents) = &node.represents {
                data.insert("represents".to_string(), Value::String(represents.clone()));
            }
            if let Some(attributes) = nice.node_attributes.get(&node.id) {
                insert_attributes(&mut data, attributes, names);
            }
            nodes.push(Element {
                group: ElementGroup::Nodes,
                data,
                position: nice.cartesian_layout.get(&node.id).copied(),
            });
        }

        let mut edges = Vec::with_capacity(nice.edges.len());
        for edge in &nice.edges {
            for endpoint in [edge.source, edge.target] {
                if !node_ids.contains(&endpoint) {
                    return Err(SearchError::Conversion(format!(
                        "edge {} references missing node {endpoint}",
                        edge.id
                    )));
                }
            }
            let mut data = Map::new();
            data.insert("id".to_string(), Value::String(edge_element_id(edge.id)));
            data.insert("source".to_string(), Value::String(edge.source.to_string()));
            data.insert("target".to_string(), Value::String(edge.target.to_string()));
            if let Some(interaction) = &edge.interaction {
                data.insert(
                    "interaction".to_string(),
                    Value::String(interaction.clone()),
                );
            }
            if let Some(attributes) = nice.edge_attributes.get(&edge.id) {
                insert_attributes(&mut data, attributes, names);
            }
            edges.push(Element {
                group: ElementGroup::Edges,
                data,
                position: None,
            });
        }

        Ok(CyElements { nodes, edges })
    }

    fn style(&self, nice: &NiceCx, names: &mut AttributeNameMap) -> Vec<StyleRule> {
        style::style_from_nice(nice, names)
    }
}

pub fn edge_element_id(cx_id: u64) -> String {
    format!("e{cx_id}")
}

fn insert_attributes(
    data: &mut Map<String, Value>,
    attributes: &[CxAttribute],
    names: &mut AttributeNameMap,
) {
    for attribute in attributes {
        let key = names.key_for(&attribute.name);
        data.entry(key).or_insert_with(|| attribute.typed_value());
    }
}

fn merge_aspect(nice: &mut NiceCx, aspect: &str, entries: Value) -> Result<(), SearchError> {
    match aspect {
        NODES => nice.nodes.extend(parse_entries::<CxNode>(aspect, entries)?),
        EDGES => nice.edges.extend(parse_entries::<CxEdge>(aspect, entries)?),
        NODE_ATTRIBUTES => {
            group_attributes(&mut nice.node_attributes, aspect, entries)?;
        }
        EDGE_ATTRIBUTES => {
            group_attributes(&mut nice.edge_attributes, aspect, entries)?;
        }
        NETWORK_ATTRIBUTES => nice
            .network_attributes
            .extend(parse_entries::<CxAttribute>(aspect, entries)?),
        CARTESIAN_LAYOUT => {
            for entry in parse_entries::<CxLayoutEntry>(aspect, entries)? {
                nice.cartesian_layout.insert(
                    entry.node,
                    Position {
                        x: entry.x,
                        y: entry.y,
                    },
                );
            }
        }
        CY_VISUAL_PROPERTIES | VISUAL_PROPERTIES => nice
            .visual_properties
            .extend(parse_entries::<VisualPropertyEntry>(aspect, entries)?),
        _ => {
            let values = match entries {
                Value::Array(values) => values,
                other => vec![other],
            };
            nice.other_aspects
                .entry(aspect.to_string())
                .or_default()
                .extend(values);
        }
    }
    Ok(())
}

fn parse_entries<T>(aspect: &str, entries: Value) -> Result<Vec<T>, SearchError>
where
    T: for<'de> Deserialize<'de>,
{
    if !entries.is_array() {
        return Err(SearchError::Conversion(format!(
            "aspect `{aspect}` is not a list"
        )));
    }
    serde_json::from_value(entries)
        .map_err(|err| SearchError::Conversion(format!("aspect `{aspect}`: {err}")))
}

fn group_attributes(
    target: &mut HashMap<u64, Vec<CxAttribute>>,
    aspect: &str,
    entries: Value,
) -> Result<(), SearchError> {
    for attribute in parse_entries::<CxAttribute>(aspect, entries)? {
        let Some(owner) = attribute.property_of else {
            return Err(SearchError::Conversion(format!(
                "aspect `{aspect}` entry `{}` has no owner",
                attribute.name
            )));
        };
        target.entry(owner).or_default().push(attribute);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn raw(value: Value) -> RawGraphDocument {
        RawGraphDocument::new(serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn aspects_merge_across_fragments() {
        let doc = raw(json!([
            {"numberVerification": [{"longNumber": 281474976710655u64}]},
            {"nodes": [{"@id": 1, "n": "TP53"}]},
            {"nodes": [{"@id": 2, "n": "MDM2", "r": "uniprot:Q00987"}]},
            {"edges": [{"@id": 3, "s": 1, "t": 2, "i": "interacts-with"}]},
            {"nodeAttributes": [{"po": 1, "n": "score", "v": "0.5", "d": "double"}]},
            {"status": [{"error": "", "success": true}]}
        ]));
        let nice = CxConverter.to_nice(&doc).unwrap();
        assert_eq!(nice.nodes.len(), 2);
        assert_eq!(nice.edges.len(), 1);
        assert_eq!(nice.element_count(), 3);
        assert_eq!(nice.node_attributes[&1][0].typed_value(), json!(0.5));
        assert!(nice.other_aspects.contains_key("status"));
        assert!(nice.other_aspects.contains_key("numberVerification"));
    }

    #[test]
    fn non_array_document_is_conversion_error() {
        let doc = RawGraphDocument::new(br#"{"nodes": []}"#.to_vec());
        assert_matches!(CxConverter.to_nice(&doc), Err(SearchError::Conversion(_)));
    }

    #[test]
    fn malformed_node_is_conversion_error() {
        let doc = raw(json!([{"nodes": [{"n": "no id"}]}]));
        assert_matches!(CxConverter.to_nice(&doc), Err(SearchError::Conversion(_)));
    }

    #[test]
    fn dangling_edge_is_conversion_error() {
        let doc = raw(json!([
            {"nodes": [{"@id": 1, "n": "A"}]},
            {"edges": [{"@id": 2, "s": 1, "t": 9}]}
        ]));
        let nice = CxConverter.to_nice(&doc).unwrap();
        let mut names = AttributeNameMap::default();
        assert_matches!(
            CxConverter.elements(&nice, &mut names),
            Err(SearchError::Conversion(_))
        );
    }

    #[test]
    fn elements_carry_attributes_and_positions() {
        let doc = raw(json!([
            {"nodes": [{"@id": 1, "n": "TP53"}, {"@id": 2, "n": "MDM2"}]},
            {"edges": [{"@id": 3, "s": 1, "t": 2, "i": "binds"}]},
            {"nodeAttributes": [
                {"po": 1, "n": "Gene Type", "v": "protein"},
                {"po": 1, "n": "id", "v": "shadowed"},
                {"po": 2, "n": "aliases", "v": ["HDM2"], "d": "list_of_string"}
            ]},
            {"edgeAttributes": [{"po": 3, "n": "weight", "v": "2", "d": "integer"}]},
            {"cartesianLayout": [{"node": 1, "x": 10.0, "y": -4.5}]}
        ]));
        let nice = CxConverter.to_nice(&doc).unwrap();
        let mut names = AttributeNameMap::default();
        let elements = CxConverter.elements(&nice, &mut names).unwrap();

        let tp53 = &elements.nodes[0];
        assert_eq!(tp53.id(), Some("1"));
        assert_eq!(tp53.data["Gene_Type"], json!("protein"));
        assert_eq!(tp53.data["_id"], json!("shadowed"));
        assert_eq!(tp53.position, Some(Position { x: 10.0, y: -4.5 }));
        assert_eq!(elements.nodes[1].position, None);
        assert_eq!(elements.nodes[1].data["aliases"], json!(["HDM2"]));

        let edge = &elements.edges[0];
        assert_eq!(edge.id(), Some("e3"));
        assert_eq!(edge.data["source"], json!("1"));
        assert_eq!(edge.data["interaction"], json!("binds"));
        assert_eq!(edge.data["weight"], json!(2));
        assert_eq!(names.get("Gene Type"), Some("Gene_Type"));
    }

    #[test]
    fn attribute_keys_stay_unique() {
        let mut names = AttributeNameMap::default();
        assert_eq!(names.key_for("a b"), "a_b");
        assert_eq!(names.key_for("a-b"), "a_b_1");
        assert_eq!(names.key_for("a b"), "a_b");
        assert_eq!(names.key_for("3prime"), "_3prime");
    }
}
