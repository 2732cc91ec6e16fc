//! Style sheet derivation from CX visual properties.

use serde::Serialize;
use serde_json::{Map, Number, Value, json};

use crate::cx::{AttributeNameMap, CxMapping, NiceCx, VisualPropertyEntry, edge_element_id};

pub const HIGHLIGHT_OVERLAY_COLOR: &str = "#C51162";
pub const ACTIVE_OVERLAY_COLOR: &str = "#FFFF66";
pub const FADED_OPACITY: f64 = 0.9;

/// One cytoscape.js style rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleRule {
    pub selector: String,
    pub css: Map<String, Value>,
}

impl StyleRule {
    pub fn new(selector: impl Into<String>, css: Value) -> Self {
        let css = match css {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            selector: selector.into(),
            css,
        }
    }
}

/// Rules driven by viewer interaction: dimmed nodes and edges, the highlight
/// applied to query nodes (wins over fading), and the node under the pointer.
pub fn interaction_layers() -> [StyleRule; 4] {
    [
        StyleRule::new("node.faded", json!({ "opacity": FADED_OPACITY })),
        StyleRule::new("edge.faded", json!({ "opacity": FADED_OPACITY })),
        StyleRule::new(
            ".highlight",
            json!({
                "opacity": 1.0,
                "overlay-color": HIGHLIGHT_OVERLAY_COLOR,
                "overlay-padding": 12,
                "overlay-opacity": 0.5
            }),
        ),
        StyleRule::new(
            "node:active",
            json!({
                "overlay-color": ACTIVE_OVERLAY_COLOR,
                "overlay-padding": 25,
                "overlay-opacity": 0.3
            }),
        ),
    ]
}

/// Appends [`interaction_layers`] after whatever the document defined.
pub fn append_interaction_layers(style: &mut Vec<StyleRule>) {
    style.extend(interaction_layers());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Color,
    Number,
    Opacity,
    Text,
    FontFamily,
    NodeShape,
    ArrowShape,
    LineStyle,
}

struct VisualProperty {
    name: &'static str,
    css: &'static [&'static str],
    kind: ValueKind,
}

const NODE_PROPERTIES: &[VisualProperty] = &[
    VisualProperty { name: "NODE_FILL_COLOR", css: &["background-color"], kind: ValueKind::Color },
    VisualProperty { name: "NODE_SHAPE", css: &["shape"], kind: ValueKind::NodeShape },
    VisualProperty { name: "NODE_WIDTH", css: &["width"], kind: ValueKind::Number },
    VisualProperty { name: "NODE_HEIGHT", css: &["height"], kind: ValueKind::Number },
    VisualProperty { name: "NODE_SIZE", css: &["width", "height"], kind: ValueKind::Number },
    VisualProperty { name: "NODE_LABEL", css: &["content"], kind: ValueKind::Text },
    VisualProperty { name: "NODE_LABEL_COLOR", css: &["color"], kind: ValueKind::Color },
    VisualProperty { name: "NODE_LABEL_FONT_SIZE", css: &["font-size"], kind: ValueKind::Number },
    VisualProperty { name: "NODE_LABEL_FONT_FACE", css: &["font-family"], kind: ValueKind::FontFamily },
    VisualProperty { name: "NODE_LABEL_TRANSPARENCY", css: &["text-opacity"], kind: ValueKind::Opacity },
    VisualProperty { name: "NODE_BORDER_PAINT", css: &["border-color"], kind: ValueKind::Color },
    VisualProperty { name: "NODE_BORDER_WIDTH", css: &["border-width"], kind: ValueKind::Number },
    VisualProperty { name: "NODE_BORDER_TRANSPARENCY", css: &["border-opacity"], kind: ValueKind::Opacity },
    VisualProperty { name: "NODE_TRANSPARENCY", css: &["background-opacity"], kind: ValueKind::Opacity },
];

const EDGE_PROPERTIES: &[VisualProperty] = &[
    VisualProperty { name: "EDGE_WIDTH", css: &["width"], kind: ValueKind::Number },
    VisualProperty { name: "EDGE_STROKE_UNSELECTED_PAINT", css: &["line-color"], kind: ValueKind::Color },
    VisualProperty { name: "EDGE_UNSELECTED_PAINT", css: &["line-color"], kind: ValueKind::Color },
    VisualProperty { name: "EDGE_LINE_TYPE", css: &["line-style"], kind: ValueKind::LineStyle },
    VisualProperty { name: "EDGE_TRANSPARENCY", css: &["opacity"], kind: ValueKind::Opacity },
    VisualProperty { name: "EDGE_TARGET_ARROW_SHAPE", css: &["target-arrow-shape"], kind: ValueKind::ArrowShape },
    VisualProperty { name: "EDGE_SOURCE_ARROW_SHAPE", css: &["source-arrow-shape"], kind: ValueKind::ArrowShape },
    VisualProperty { name: "EDGE_TARGET_ARROW_UNSELECTED_PAINT", css: &["target-arrow-color"], kind: ValueKind::Color },
    VisualProperty { name: "EDGE_SOURCE_ARROW_UNSELECTED_PAINT", css: &["source-arrow-color"], kind: ValueKind::Color },
    VisualProperty { name: "EDGE_LABEL", css: &["content"], kind: ValueKind::Text },
    VisualProperty { name: "EDGE_LABEL_COLOR", css: &["color"], kind: ValueKind::Color },
    VisualProperty { name: "EDGE_LABEL_FONT_SIZE", css: &["font-size"], kind: ValueKind::Number },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Node,
    Edge,
}

impl Scope {
    fn selector(self) -> &'static str {
        match self {
            Scope::Node => "node",
            Scope::Edge => "edge",
        }
    }

    fn properties(self) -> &'static [VisualProperty] {
        match self {
            Scope::Node => NODE_PROPERTIES,
            Scope::Edge => EDGE_PROPERTIES,
        }
    }
}

/// Builds the document's own style sheet: defaults and mappings for nodes and
/// edges, selection rules, then per-element bypasses.
pub fn style_from_nice(nice: &NiceCx, names: &mut AttributeNameMap) -> Vec<StyleRule> {
    let mut rules = Vec::new();
    let mut selected = Vec::new();

    for (scope, properties_of) in [(Scope::Node, "nodes:default"), (Scope::Edge, "edges:default")] {
        for entry in nice.visual_properties_of(properties_of) {
            let mut css = default_css(scope);
            apply_properties(scope, entry, &mut css);
            rules.push(StyleRule {
                selector: scope.selector().to_string(),
                css,
            });
            for (property, mapping) in &entry.mappings {
                rules.extend(mapping_rules(scope, property, mapping, names));
            }
            if let Some(rule) = selected_rule(scope, entry) {
                selected.push(rule);
            }
        }
    }
    rules.extend(selected);

    for (scope, properties_of) in [(Scope::Node, "nodes"), (Scope::Edge, "edges")] {
        for entry in nice.visual_properties_of(properties_of) {
            let Some(owner) = entry.applies_to else {
                continue;
            };
            let id = match scope {
                Scope::Node => owner.to_string(),
                Scope::Edge => edge_element_id(owner),
            };
            let mut css = Map::new();
            apply_properties(scope, entry, &mut css);
            if !css.is_empty() {
                rules.push(StyleRule {
                    selector: format!("{}[id = '{id}']", scope.selector()),
                    css,
                });
            }
        }
    }

    rules
}

fn default_css(scope: Scope) -> Map<String, Value> {
    let mut css = Map::new();
    if scope == Scope::Edge {
        css.insert("curve-style".to_string(), Value::from("bezier"));
    }
    css
}

fn apply_properties(scope: Scope, entry: &VisualPropertyEntry, css: &mut Map<String, Value>) {
    let size_locked = entry
        .dependencies
        .get("nodeSizeLocked")
        .is_some_and(|value| value == "true");
    let arrow_matches_edge = entry
        .dependencies
        .get("arrowColorMatchesEdge")
        .is_some_and(|value| value == "true");

    for property in scope.properties() {
        let Some(raw) = entry.properties.get(property.name) else {
            continue;
        };
        match property.name {
            "NODE_SIZE" if !size_locked => continue,
            "NODE_WIDTH" | "NODE_HEIGHT" if size_locked => continue,
            _ => {}
        }
        let value = convert_value(property.kind, raw);
        for name in property.css {
            css.insert((*name).to_string(), value.clone());
        }
        if arrow_matches_edge && property.css == ["line-color"] {
            css.insert("target-arrow-color".to_string(), value.clone());
            css.insert("source-arrow-color".to_string(), value);
        }
    }
}

fn selected_rule(scope: Scope, entry: &VisualPropertyEntry) -> Option<StyleRule> {
    let (names, css_name): (&[&str], &str) = match scope {
        Scope::Node => (&["NODE_SELECTED_PAINT"], "background-color"),
        Scope::Edge => (
            &["EDGE_STROKE_SELECTED_PAINT", "EDGE_SELECTED_PAINT"],
            "line-color",
        ),
    };
    let color = names.iter().find_map(|name| entry.properties.get(*name))?;
    let mut css = Map::new();
    css.insert(css_name.to_string(), Value::from(color.as_str()));
    Some(StyleRule {
        selector: format!("{}:selected", scope.selector()),
        css,
    })
}

fn convert_value(kind: ValueKind, raw: &str) -> Value {
    match kind {
        ValueKind::Color | ValueKind::Text => Value::from(raw),
        ValueKind::Number => number(raw).unwrap_or_else(|| Value::from(raw)),
        ValueKind::Opacity => raw
            .parse::<f64>()
            .ok()
            .and_then(|alpha| Number::from_f64((alpha / 255.0).clamp(0.0, 1.0)))
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(raw)),
        ValueKind::FontFamily => {
            let family = raw.split(',').next().unwrap_or(raw);
            let family = family.split('.').next().unwrap_or(family);
            Value::from(family.trim())
        }
        ValueKind::NodeShape => Value::from(node_shape(raw)),
        ValueKind::ArrowShape => Value::from(arrow_shape(raw)),
        ValueKind::LineStyle => Value::from(line_style(raw)),
    }
}

fn number(raw: &str) -> Option<Value> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn node_shape(raw: &str) -> String {
    match raw {
        "ROUND_RECTANGLE" => "roundrectangle".to_string(),
        "PARALLELOGRAM" => "rhomboid".to_string(),
        other => other.to_lowercase().replace('_', ""),
    }
}

fn arrow_shape(raw: &str) -> &'static str {
    match raw {
        "DELTA" | "ARROW" | "DELTA_SHORT_1" | "DELTA_SHORT_2" => "triangle",
        "T" => "tee",
        "CIRCLE" => "circle",
        "DIAMOND" | "DIAMOND_SHORT_1" | "DIAMOND_SHORT_2" => "diamond",
        "HALF_TOP" | "HALF_BOTTOM" => "vee",
        _ => "none",
    }
}

fn line_style(raw: &str) -> &'static str {
    match raw {
        "DOT" => "dotted",
        "SOLID" => "solid",
        "LONG_DASH" | "EQUAL_DASH" | "DASH_DOT" | "DASH" => "dashed",
        _ => "solid",
    }
}

/// A parsed mapping definition such as `COL=type,T=string,K=0=a,V=0=#FF0000`.
#[derive(Debug, Default, PartialEq)]
struct MappingDefinition {
    column: Option<String>,
    column_type: Option<String>,
    entries: Vec<(usize, char, String)>,
}

impl MappingDefinition {
    fn parse(definition: &str) -> Self {
        let mut parsed = Self::default();
        for token in split_definition(definition) {
            if let Some(column) = token.strip_prefix("COL=") {
                parsed.column = Some(column.to_string());
            } else if let Some(column_type) = token.strip_prefix("T=") {
                parsed.column_type = Some(column_type.to_string());
            } else {
                let mut parts = token.splitn(3, '=');
                let (Some(key), Some(index), Some(value)) = (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                let Ok(index) = index.parse::<usize>() else {
                    continue;
                };
                let tag = match key {
                    "K" => 'K',
                    "V" => 'V',
                    "L" => 'L',
                    "E" => 'E',
                    "G" => 'G',
                    "OV" => 'O',
                    _ => continue,
                };
                parsed.entries.push((index, tag, value.to_string()));
            }
        }
        parsed
    }

    fn value(&self, index: usize, tag: char) -> Option<&str> {
        self.entries
            .iter()
            .find(|(i, t, _)| *i == index && *t == tag)
            .map(|(_, _, value)| value.as_str())
    }

    fn indices(&self, tag: char) -> Vec<usize> {
        let mut indices = self
            .entries
            .iter()
            .filter(|(_, t, _)| *t == tag)
            .map(|(i, _, _)| *i)
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self.column_type.as_deref(),
            Some("double" | "integer" | "long")
        )
    }
}

/// Splits on `,` while treating `,,` as an escaped comma.
fn split_definition(definition: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = definition.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == ',' {
            if chars.peek() == Some(&',') {
                chars.next();
                current.push(',');
            } else {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    tokens.push(current);
    tokens
}

fn mapping_rules(
    scope: Scope,
    property: &str,
    mapping: &CxMapping,
    names: &mut AttributeNameMap,
) -> Vec<StyleRule> {
    let Some(visual) = scope.properties().iter().find(|vp| vp.name == property) else {
        return Vec::new();
    };
    let definition = MappingDefinition::parse(&mapping.definition);
    let Some(column) = definition.column.as_deref() else {
        return Vec::new();
    };
    let key = data_key(column, names);
    let element = scope.selector();

    match mapping.kind.as_str() {
        "PASSTHROUGH" => {
            let mut css = Map::new();
            for name in visual.css {
                css.insert((*name).to_string(), Value::from(format!("data({key})")));
            }
            vec![StyleRule {
                selector: format!("{element}[{key}]"),
                css,
            }]
        }
        "DISCRETE" => definition
            .indices('K')
            .into_iter()
            .filter_map(|index| {
                let matched = definition.value(index, 'K')?;
                let value = definition.value(index, 'V')?;
                let literal = if definition.is_numeric() {
                    matched.to_string()
                } else {
                    format!("'{}'", matched.replace('\'', "\\'"))
                };
                let converted = convert_value(visual.kind, value);
                let mut css = Map::new();
                for name in visual.css {
                    css.insert((*name).to_string(), converted.clone());
                }
                Some(StyleRule {
                    selector: format!("{element}[{key} = {literal}]"),
                    css,
                })
            })
            .collect(),
        "CONTINUOUS" => continuous_rules(element, &key, visual, &definition),
        _ => Vec::new(),
    }
}

fn continuous_rules(
    element: &str,
    key: &str,
    visual: &VisualProperty,
    definition: &MappingDefinition,
) -> Vec<StyleRule> {
    if !matches!(visual.kind, ValueKind::Color | ValueKind::Number) {
        return Vec::new();
    }
    let points = definition
        .indices('O')
        .into_iter()
        .filter_map(|index| {
            let bound = definition.value(index, 'O')?.parse::<f64>().ok()?;
            Some((index, bound))
        })
        .collect::<Vec<_>>();
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };

    let mut rules = Vec::new();
    let mut push = |selector: String, value: Value| {
        let mut css = Map::new();
        for name in visual.css {
            css.insert((*name).to_string(), value.clone());
        }
        rules.push(StyleRule { selector, css });
    };

    if let Some(below) = definition.value(first.0, 'L') {
        push(
            format!("{element}[{key} < {}]", first.1),
            convert_value(visual.kind, below),
        );
    }
    for pair in points.windows(2) {
        let (low, high) = (pair[0], pair[1]);
        let (Some(from), Some(to)) = (definition.value(low.0, 'E'), definition.value(high.0, 'E'))
        else {
            continue;
        };
        push(
            format!("{element}[{key} >= {}][{key} <= {}]", low.1, high.1),
            Value::from(format!(
                "mapData({key}, {}, {}, {from}, {to})",
                low.1, high.1
            )),
        );
    }
    if let Some(above) = definition.value(last.0, 'G') {
        push(
            format!("{element}[{key} > {}]", last.1),
            convert_value(visual.kind, above),
        );
    }
    rules
}

fn data_key(column: &str, names: &mut AttributeNameMap) -> String {
    match column {
        "name" | "represents" | "interaction" => column.to_string(),
        other => names.key_for(other),
    }
}
