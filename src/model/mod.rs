//! Inference function subsystem.
//!
//! # Data Flow
//! ```text
//! model artifact (JSON decision tree)
//!     → tree.rs (load & validate, fail fast at startup)
//!     → Arc<dyn Classifier> (read-only, shared by every request)
//!     → predict(&Features) → Species
//! ```
//!
//! # Design Decisions
//! - The classifier is immutable after load; concurrent calls need no locking
//! - Predictions are deterministic: same features, same label
//! - Shape problems found at load time are `ArtifactError`; anything that
//!   goes wrong per request is `InferenceError`

pub mod tree;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use tree::{ArtifactError, DecisionTree};

/// Feature names in the order the classifier consumes them.
pub const FEATURE_NAMES: [&str; 4] = ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// The fixed label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Setosa,
    Versicolor,
    Virginica,
}

impl Species {
    pub const ALL: [Species; 3] = [Species::Setosa, Species::Versicolor, Species::Virginica];

    /// Canonical lowercase name. This is also the span attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Setosa => "setosa",
            Species::Versicolor => "versicolor",
            Species::Virginica => "virginica",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "setosa" | "iris-setosa" => Ok(Species::Setosa),
            "versicolor" | "iris-versicolor" => Ok(Species::Versicolor),
            "virginica" | "iris-virginica" => Ok(Species::Virginica),
            other => Err(format!("unknown class '{}'", other)),
        }
    }
}

/// A validated input record. All four values are finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Features {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl Features {
    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.sepal_length, self.sepal_width, self.petal_length, self.petal_width]
    }
}

/// Per-request inference failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InferenceError {
    #[error("feature index {index} out of range for {len} inputs")]
    ShapeMismatch { index: usize, len: usize },

    #[error("model state is malformed: {0}")]
    MalformedModel(String),

    #[error("non-finite input value for '{0}'")]
    NonFiniteInput(&'static str),
}

impl InferenceError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::ShapeMismatch { .. } => "shape_mismatch",
            InferenceError::MalformedModel(_) => "malformed_model",
            InferenceError::NonFiniteInput(_) => "non_finite_input",
        }
    }
}

/// Summary of a loaded model, reported on the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub classes: Vec<Species>,
    pub node_count: usize,
    pub depth: usize,
}

/// A loaded, read-only classifier.
pub trait Classifier: Send + Sync + 'static {
    /// Map one input record to a label.
    fn predict(&self, features: &Features) -> Result<Species, InferenceError>;

    fn info(&self) -> ModelInfo;
}
