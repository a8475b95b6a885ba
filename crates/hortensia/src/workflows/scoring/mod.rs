//! Scaling and probability inference for the H and FPD models.

mod model;
mod scaler;

pub use model::{load_model, LogisticModel, MissingType, ScoringModel, TreeEnsemble, TreeNode};
pub use scaler::MinMaxScaler;

use crate::workflows::features::FeatureRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model artifact {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid model artifact: {0}")]
    Invalid(String),
    #[error("unsupported tree split `{0}`; only `<=` is supported")]
    UnsupportedSplit(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("model expects {expected} features but received {actual}")]
    RowWidth { expected: usize, actual: usize },
    #[error("{model} model produced a non-finite probability ({value})")]
    NonFinite { model: &'static str, value: f64 },
}

/// Column values the model sees: scaled columns first, then the raw record.
fn model_row(record: &FeatureRecord, model: &dyn ScoringModel, scaler: &MinMaxScaler) -> Vec<f64> {
    let scaled: HashMap<String, f64> = scaler.transform(record).into_iter().collect();
    model
        .feature_names()
        .iter()
        .map(|name| match scaled.get(name) {
            Some(value) => *value,
            None => {
                let value = record.number(name);
                if value.is_finite() {
                    value
                } else {
                    f64::NAN
                }
            }
        })
        .collect()
}

fn predict(
    label: &'static str,
    record: &FeatureRecord,
    model: &dyn ScoringModel,
    scaler: &MinMaxScaler,
) -> Result<f64, ScoringError> {
    let row = model_row(record, model, scaler);
    let probability = model.predict_probability(&row)?;
    if probability.is_finite() {
        Ok(probability)
    } else {
        Err(ScoringError::NonFinite {
            model: label,
            value: probability,
        })
    }
}

/// Run both (scaler, model) pairs over one record and return `(proba_h, proba_fpd)`.
pub fn score(
    features: &FeatureRecord,
    model_h: &dyn ScoringModel,
    scaler_h: &MinMaxScaler,
    model_fpd: &dyn ScoringModel,
    scaler_fpd: &MinMaxScaler,
) -> Result<(f64, f64), ScoringError> {
    let proba_h = predict("H", features, model_h, scaler_h)?;
    let proba_fpd = predict("FPD", features, model_fpd, scaler_fpd)?;
    Ok((proba_h, proba_fpd))
}

/// The two models of an engine and their scalers, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub h: Arc<dyn ScoringModel>,
    pub fpd: Arc<dyn ScoringModel>,
    pub scaler_h: Arc<MinMaxScaler>,
    pub scaler_fpd: Arc<MinMaxScaler>,
}

impl ModelSet {
    /// Same scaler for both models.
    pub fn shared(
        h: Arc<dyn ScoringModel>,
        fpd: Arc<dyn ScoringModel>,
        scaler: Arc<MinMaxScaler>,
    ) -> Self {
        Self {
            h,
            fpd,
            scaler_h: Arc::clone(&scaler),
            scaler_fpd: scaler,
        }
    }

    /// Load artifacts from disk; relative paths resolve against `base_dir`.
    pub fn load(
        base_dir: &Path,
        h: &Path,
        fpd: &Path,
        scaler_h: &Path,
        scaler_fpd: Option<&Path>,
    ) -> Result<Self, ModelLoadError> {
        let resolve = |path: &Path| base_dir.join(path);
        let scaler = Arc::new(MinMaxScaler::load(resolve(scaler_h))?);
        let scaler_fpd = match scaler_fpd {
            Some(path) => Arc::new(MinMaxScaler::load(resolve(path))?),
            None => Arc::clone(&scaler),
        };
        Ok(Self {
            h: load_model(resolve(h))?,
            fpd: load_model(resolve(fpd))?,
            scaler_h: scaler,
            scaler_fpd,
        })
    }

    pub fn score(&self, features: &FeatureRecord) -> Result<(f64, f64), ScoringError> {
        score(
            features,
            self.h.as_ref(),
            &self.scaler_h,
            self.fpd.as_ref(),
            &self.scaler_fpd,
        )
    }
}
