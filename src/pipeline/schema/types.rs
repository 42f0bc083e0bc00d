use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Runtime type expected for a leaf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

impl ValueType {
    /// Zero value used when a leaf has no explicit default.
    pub fn zero(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Number => Value::from(0),
            Self::Boolean => Value::Bool(false),
        }
    }
}

/// A terminal field of the schema.
///
/// Enveloped leaves appear in payloads as
/// `{"value": <v>, "label": <label>, <metadata...>}`; bare leaves are plain
/// scalars. Metadata (rule, length, index, previewJson, key, ...) is opaque
/// and always re-emitted exactly as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
    pub label: String,
    pub value_type: ValueType,
    pub default_value: Value,
    pub required: bool,
    pub enveloped: bool,
    pub metadata: Map<String, Value>,
}

impl LeafNode {
    pub fn new(label: &str, value_type: ValueType) -> Self {
        Self {
            label: label.to_string(),
            value_type,
            default_value: value_type.zero(),
            required: true,
            enveloped: true,
            metadata: Map::new(),
        }
    }

    pub fn text(label: &str) -> Self {
        Self::new(label, ValueType::String)
    }

    pub fn number(label: &str) -> Self {
        Self::new(label, ValueType::Number)
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn bare(mut self) -> Self {
        self.enveloped = false;
        self
    }

    /// Render `value` in this leaf's payload shape.
    pub fn render(&self, value: Value) -> Value {
        if !self.enveloped {
            return value;
        }
        let mut map = Map::new();
        map.insert("value".into(), value);
        map.insert("label".into(), Value::String(self.label.clone()));
        for (key, meta) in &self.metadata {
            map.insert(key.clone(), meta.clone());
        }
        Value::Object(map)
    }

    pub fn rendered_default(&self) -> Value {
        self.render(self.default_value.clone())
    }
}

/// A named child of an object node. Field order is significant: it is the
/// order the example is rendered in and the order of the repaired payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub key: String,
    pub node: SchemaNode,
}

/// Recursive schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
    Leaf(LeafNode),
    Object { fields: Vec<SchemaField> },
    /// Zero or more elements, each validated against `element`.
    Array { element: Box<SchemaNode> },
    /// Opaque value copied through untouched (or defaulted when absent).
    Passthrough { default_value: Value },
}

impl SchemaNode {
    pub fn object(fields: Vec<(&str, SchemaNode)>) -> Self {
        Self::Object {
            fields: fields
                .into_iter()
                .map(|(key, node)| SchemaField {
                    key: key.to_string(),
                    node,
                })
                .collect(),
        }
    }

    pub fn array(element: SchemaNode) -> Self {
        Self::Array {
            element: Box::new(element),
        }
    }

    pub fn passthrough(default_value: Value) -> Self {
        Self::Passthrough { default_value }
    }

    /// Instructive example: arrays show exactly one element.
    pub fn example(&self) -> Value {
        match self {
            Self::Leaf(leaf) => leaf.rendered_default(),
            Self::Object { fields } => Value::Object(
                fields
                    .iter()
                    .map(|f| (f.key.clone(), f.node.example()))
                    .collect(),
            ),
            Self::Array { element } => Value::Array(vec![element.example()]),
            Self::Passthrough { default_value } => default_value.clone(),
        }
    }

    /// Value used when the node is absent from a payload: arrays are empty.
    pub fn default_payload(&self) -> Value {
        match self {
            Self::Leaf(leaf) => leaf.rendered_default(),
            Self::Object { fields } => Value::Object(
                fields
                    .iter()
                    .map(|f| (f.key.clone(), f.node.default_payload()))
                    .collect(),
            ),
            Self::Array { .. } => Value::Array(Vec::new()),
            Self::Passthrough { default_value } => default_value.clone(),
        }
    }

    /// Paths of every leaf, with `[]` marking array elements.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_leaf_paths(self, "", &mut out);
        out
    }
}

fn collect_leaf_paths(node: &SchemaNode, path: &str, out: &mut Vec<String>) {
    match node {
        SchemaNode::Leaf(_) => out.push(path.to_string()),
        SchemaNode::Object { fields } => {
            for f in fields {
                collect_leaf_paths(&f.node, &join_path(path, &f.key), out);
            }
        }
        SchemaNode::Array { element } => collect_leaf_paths(element, &format!("{path}[]"), out),
        SchemaNode::Passthrough { .. } => {}
    }
}

/// Join a parent path and an object key with `.`.
pub fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// One non-fatal problem found while repairing a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// Payload conforming to the canonical schema.
    pub payload: Value,
    pub errors: Vec<FieldError>,
    pub transformed_flag: bool,
    /// Fingerprint of the template used, if a source was identified.
    pub fingerprint: Option<String>,
    pub cache_hit: bool,
    /// Extraction calls made (1 + parse retries used).
    pub attempts: u32,
}

impl ExtractionResult {
    /// Payload with `errors` and `transformed` merged in at the top level.
    pub fn to_output_json(&self) -> Value {
        let mut out = match &self.payload {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("payload".into(), other.clone());
                map
            }
        };
        out.insert(
            "errors".into(),
            Value::Array(
                self.errors
                    .iter()
                    .map(|e| serde_json::json!({ "path": e.path, "message": e.message }))
                    .collect(),
            ),
        );
        out.insert("transformed".into(), Value::Bool(self.transformed_flag));
        Value::Object(out)
    }
}
