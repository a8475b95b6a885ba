use super::ModelLoadError;
use crate::workflows::features::FeatureRecord;
use serde::Deserialize;
use std::path::Path;

fn default_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Min-max scaler exported from training.
///
/// Values outside the fitted range extrapolate linearly; missing values stay missing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MinMaxScaler {
    feature_names: Vec<String>,
    data_min: Vec<f64>,
    data_max: Vec<f64>,
    #[serde(default = "default_range")]
    feature_range: (f64, f64),
}

impl MinMaxScaler {
    pub fn new(
        feature_names: Vec<String>,
        data_min: Vec<f64>,
        data_max: Vec<f64>,
    ) -> Result<Self, ModelLoadError> {
        let scaler = Self {
            feature_names,
            data_min,
            data_max,
            feature_range: default_range(),
        };
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scaler: Self = serde_json::from_str(&raw).map_err(|source| ModelLoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        let expected = self.feature_names.len();
        if self.data_min.len() != expected || self.data_max.len() != expected {
            return Err(ModelLoadError::Invalid(format!(
                "scaler declares {expected} features but {} minimums and {} maximums",
                self.data_min.len(),
                self.data_max.len()
            )));
        }
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Scale a single value of feature `index`.
    pub fn scale(&self, index: usize, value: f64) -> f64 {
        let (low, high) = self.feature_range;
        let mut range = self.data_max[index] - self.data_min[index];
        if range == 0.0 {
            range = 1.0;
        }
        let scale = (high - low) / range;
        value * scale + (low - self.data_min[index] * scale)
    }

    /// Scaled values of the fitted columns, read from `record` in fitted order.
    pub fn transform(&self, record: &FeatureRecord) -> Vec<(String, f64)> {
        self.feature_names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let value = record.number(name);
                let value = if value.is_finite() { value } else { f64::NAN };
                (name.clone(), self.scale(index, value))
            })
            .collect()
    }
}
