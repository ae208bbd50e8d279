//! Execution engine: canonical result shape and the pieces that produce it.

use serde::{Deserialize, Serialize};

pub mod engine;
pub mod normalize;
pub mod plots;
pub mod python;

pub use engine::{EngineMetrics, EngineOptions, ExecutionEngine, MetricsSnapshot};

pub const EMPTY_SNIPPET_TEXT: &str = "No code to execute";

/// One transportable image: `kind` is the MIME subtype (`png`, `jpeg`,
/// `svg+xml`, ...), `data` is always base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutput {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl ImageOutput {
    pub fn png(data: impl Into<String>) -> Self {
        Self { kind: "png".into(), data: data.into() }
    }
}

/// The response returned to every caller of `execute`.
///
/// `error` is set exactly when the unit failed; the other fields may still
/// hold whatever was produced before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub text_output: String,
    pub images: Vec<ImageOutput>,
    pub html_output: String,
    pub error: Option<String>,
}

impl CanonicalResponse {
    pub fn empty_snippet() -> Self {
        Self { text_output: EMPTY_SNIPPET_TEXT.into(), ..Self::default() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Self::default() }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
