use super::{ModelLoadError, ScoringError};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// Trained binary classifier as seen by the decision pipeline.
pub trait ScoringModel: Send + Sync + Debug {
    /// Input columns, in the order `predict_probability` expects them.
    fn feature_names(&self) -> &[String];

    /// Positive-class probability for one row laid out as [`ScoringModel::feature_names`].
    fn predict_probability(&self, row: &[f64]) -> Result<f64, ScoringError>;
}

fn sigmoid(raw: f64, slope: f64) -> f64 {
    1.0 / (1.0 + (-slope * raw).exp())
}

fn check_width(expected: usize, row: &[f64]) -> Result<(), ScoringError> {
    if row.len() == expected {
        Ok(())
    } else {
        Err(ScoringError::RowWidth {
            expected,
            actual: row.len(),
        })
    }
}

fn default_slope() -> f64 {
    1.0
}

/// Linear model; missing inputs contribute nothing to the logit.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticModel {
    pub fn new(feature_names: Vec<String>, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            feature_names,
            coefficients,
            intercept,
        }
    }
}

impl ScoringModel for LogisticModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_probability(&self, row: &[f64]) -> Result<f64, ScoringError> {
        check_width(self.feature_names.len(), row)?;
        let logit = row
            .iter()
            .zip(&self.coefficients)
            .filter(|(value, _)| !value.is_nan())
            .fold(self.intercept, |acc, (value, weight)| acc + value * weight);
        Ok(sigmoid(logit, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MissingType {
    None,
    Zero,
    NaN,
}

/// Node of a gradient-boosted tree dump.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        split_feature: usize,
        threshold: f64,
        decision_type: String,
        #[serde(default)]
        default_left: bool,
        #[serde(default = "missing_none")]
        missing_type: MissingType,
        left_child: Box<TreeNode>,
        right_child: Box<TreeNode>,
    },
    Leaf {
        leaf_value: f64,
    },
}

fn missing_none() -> MissingType {
    MissingType::None
}

const ZERO_THRESHOLD: f64 = 1e-35;

impl TreeNode {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { leaf_value } => return *leaf_value,
                TreeNode::Split {
                    split_feature,
                    threshold,
                    default_left,
                    missing_type,
                    left_child,
                    right_child,
                    ..
                } => {
                    let mut value = row.get(*split_feature).copied().unwrap_or(f64::NAN);
                    if *missing_type != MissingType::NaN && value.is_nan() {
                        value = 0.0;
                    }
                    let is_missing = match missing_type {
                        MissingType::Zero => value.abs() <= ZERO_THRESHOLD,
                        MissingType::NaN => value.is_nan(),
                        MissingType::None => false,
                    };
                    let go_left = if is_missing {
                        *default_left
                    } else {
                        value <= *threshold
                    };
                    node = if go_left { left_child } else { right_child };
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        match self {
            TreeNode::Leaf { .. } => Ok(()),
            TreeNode::Split {
                decision_type,
                left_child,
                right_child,
                ..
            } => {
                if decision_type != "<=" {
                    return Err(ModelLoadError::UnsupportedSplit(decision_type.clone()));
                }
                left_child.validate()?;
                right_child.validate()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeInfo {
    pub tree_structure: TreeNode,
}

/// Binary gradient-boosted ensemble: sigmoid of the summed leaf outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    tree_info: Vec<TreeInfo>,
    #[serde(default = "default_slope")]
    sigmoid: f64,
}

impl TreeEnsemble {
    pub fn new(feature_names: Vec<String>, trees: Vec<TreeNode>) -> Result<Self, ModelLoadError> {
        let ensemble = Self {
            feature_names,
            tree_info: trees
                .into_iter()
                .map(|tree_structure| TreeInfo { tree_structure })
                .collect(),
            sigmoid: default_slope(),
        };
        ensemble.validate()?;
        Ok(ensemble)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        for tree in &self.tree_info {
            tree.tree_structure.validate()?;
        }
        Ok(())
    }

    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.tree_info
            .iter()
            .map(|tree| tree.tree_structure.evaluate(row))
            .sum()
    }
}

impl ScoringModel for TreeEnsemble {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_probability(&self, row: &[f64]) -> Result<f64, ScoringError> {
        check_width(self.feature_names.len(), row)?;
        Ok(sigmoid(self.raw_score(row), self.sigmoid))
    }
}

/// On-disk model artifact, discriminated by `kind`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    Logistic(LogisticModel),
    TreeEnsemble(TreeEnsemble),
}

pub fn load_model(path: impl AsRef<Path>) -> Result<Arc<dyn ScoringModel>, ModelLoadError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: ModelArtifact =
        serde_json::from_str(&raw).map_err(|source| ModelLoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    match artifact {
        ModelArtifact::Logistic(model) => {
            if model.coefficients.len() != model.feature_names.len() {
                return Err(ModelLoadError::Invalid(format!(
                    "{} declares {} features but {} coefficients",
                    path.display(),
                    model.feature_names.len(),
                    model.coefficients.len()
                )));
            }
            Ok(Arc::new(model))
        }
        ModelArtifact::TreeEnsemble(model) => {
            model.validate()?;
            Ok(Arc::new(model))
        }
    }
}
