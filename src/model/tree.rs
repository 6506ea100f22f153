//! Decision tree model artifact.
//!
//! # Responsibilities
//! - Load the JSON artifact from disk
//! - Validate structure once, before the first request
//! - Walk the tree for each prediction
//!
//! # Artifact Format
//! ```text
//! {
//!   "format_version": 1,
//!   "features": ["sepal_length", "sepal_width", "petal_length", "petal_width"],
//!   "classes":  ["setosa", "versicolor", "virginica"],
//!   "nodes": [ {"feature": 2, "threshold": 2.45, "left": 1, "right": 2},
//!              {"class": 0}, ... ]
//! }
//! ```
//! A split sends the sample left when `value <= threshold`. Node 0 is the root.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{Classifier, Features, InferenceError, ModelInfo, Species, FEATURE_NAMES};

const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Error raised while loading an artifact. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        class: usize,
    },
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    format_version: u32,
    #[serde(default)]
    name: Option<String>,
    features: Vec<String>,
    classes: Vec<String>,
    nodes: Vec<RawNode>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(Species),
}

/// A validated decision tree classifier.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    name: String,
    classes: Vec<Species>,
    nodes: Vec<Node>,
    depth: usize,
}

impl DecisionTree {
    /// Load and validate an artifact file.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tree = Self::from_json(&content)?;

        tracing::info!(
            path = %path.display(),
            model = %tree.name,
            nodes = tree.nodes.len(),
            depth = tree.depth,
            "Model artifact loaded"
        );
        Ok(tree)
    }

    /// Parse and validate an artifact held in memory.
    pub fn from_json(content: &str) -> Result<Self, ArtifactError> {
        let raw: RawArtifact = serde_json::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArtifact) -> Result<Self, ArtifactError> {
        if raw.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ArtifactError::Invalid(format!(
                "unsupported format_version {} (expected {})",
                raw.format_version, SUPPORTED_FORMAT_VERSION
            )));
        }

        if raw.features.len() != FEATURE_NAMES.len()
            || raw.features.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ArtifactError::Invalid(format!(
                "features must be {:?}, got {:?}",
                FEATURE_NAMES, raw.features
            )));
        }

        let classes = raw
            .classes
            .iter()
            .map(|c| c.parse::<Species>().map_err(ArtifactError::Invalid))
            .collect::<Result<Vec<_>, _>>()?;
        if classes.is_empty() {
            return Err(ArtifactError::Invalid("class list is empty".into()));
        }

        if raw.nodes.is_empty() {
            return Err(ArtifactError::Invalid("tree has no nodes".into()));
        }

        let node_count = raw.nodes.len();
        let mut nodes = Vec::with_capacity(node_count);
        for (index, node) in raw.nodes.into_iter().enumerate() {
            let node = match node {
                RawNode::Split { feature, threshold, left, right } => {
                    if feature >= FEATURE_NAMES.len() {
                        return Err(ArtifactError::Invalid(format!(
                            "node {index}: feature index {feature} out of range"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(ArtifactError::Invalid(format!(
                            "node {index}: threshold is not finite"
                        )));
                    }
                    // Children strictly after the parent: no cycles, traversal terminates.
                    for child in [left, right] {
                        if child <= index || child >= node_count {
                            return Err(ArtifactError::Invalid(format!(
                                "node {index}: child index {child} is invalid"
                            )));
                        }
                    }
                    Node::Split { feature, threshold, left, right }
                }
                RawNode::Leaf { class } => {
                    let species = classes.get(class).copied().ok_or_else(|| {
                        ArtifactError::Invalid(format!("node {index}: class index {class} out of range"))
                    })?;
                    Node::Leaf(species)
                }
            };
            nodes.push(node);
        }

        let depth = tree_depth(&nodes);

        Ok(Self {
            name: raw.name.unwrap_or_else(|| "decision-tree".to_string()),
            classes,
            nodes,
            depth,
        })
    }
}

/// Longest root-to-leaf path, counted in splits.
fn tree_depth(nodes: &[Node]) -> usize {
    // Children always follow parents, so a reverse pass sees children first.
    let mut depth = vec![0usize; nodes.len()];
    for index in (0..nodes.len()).rev() {
        if let Node::Split { left, right, .. } = nodes[index] {
            depth[index] = 1 + depth[left].max(depth[right]);
        }
    }
    depth[0]
}

impl Classifier for DecisionTree {
    fn predict(&self, features: &Features) -> Result<Species, InferenceError> {
        let values = features.to_array();
        for (value, name) in values.iter().zip(FEATURE_NAMES) {
            if !value.is_finite() {
                return Err(InferenceError::NonFiniteInput(name));
            }
        }

        let mut index = 0;
        // Each step moves strictly forward, so at most `nodes.len()` steps.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(Node::Leaf(species)) => return Ok(*species),
                Some(Node::Split { feature, threshold, left, right }) => {
                    let value = values.get(*feature).ok_or(InferenceError::ShapeMismatch {
                        index: *feature,
                        len: values.len(),
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(InferenceError::MalformedModel(format!(
                        "node index {index} out of range"
                    )))
                }
            }
        }

        Err(InferenceError::MalformedModel("traversal did not reach a leaf".into()))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            classes: self.classes.clone(),
            node_count: self.nodes.len(),
            depth: self.depth,
        }
    }
}
