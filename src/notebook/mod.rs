//! nbformat v4 documents: the on-disk shape of an execution unit file.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const NBFORMAT: u32 = 4;
pub const NBFORMAT_MINOR: u32 = 4;

/// MIME type -> payload. JSON payloads stay structured, text payloads are
/// strings or arrays of strings.
pub type MimeBundle = BTreeMap<String, Value>;

/// Text that nbformat may store either as one string or as a list of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultilineText(pub String);

impl MultilineText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MultilineText {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MultilineText {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for MultilineText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MultilineText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Lines(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => Self(s),
            Raw::Lines(lines) => Self(lines.concat()),
        })
    }
}

/// Flatten a text MIME payload (string or list of strings) into one string.
pub fn text_payload(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .concat(),
        ),
        _ => None,
    }
}

/// One record emitted by the kernel while executing a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        name: String,
        text: MultilineText,
    },
    ExecuteResult {
        execution_count: Option<u32>,
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    DisplayData {
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

impl Output {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: String,
    #[serde(default)]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    pub source: MultilineText,
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            cell_type: "code".into(),
            execution_count: None,
            metadata: Map::new(),
            outputs: Vec::new(),
            source: MultilineText(source.into()),
        }
    }

    /// The first error record of this cell, if it failed.
    pub fn error(&self) -> Option<&Output> {
        self.outputs.iter().find(|o| o.is_error())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub nbformat: u32,
    pub nbformat_minor: u32,
}

impl Notebook {
    /// A notebook over the given cells, bound to `kernel_name`.
    pub fn new(cells: Vec<Cell>, kernel_name: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            "kernelspec".into(),
            serde_json::json!({
                "name": kernel_name,
                "display_name": kernel_name,
                "language": "python",
            }),
        );
        metadata.insert(
            "language_info".into(),
            serde_json::json!({ "name": "python" }),
        );
        Self {
            cells,
            metadata,
            nbformat: NBFORMAT,
            nbformat_minor: NBFORMAT_MINOR,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
