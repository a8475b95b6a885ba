//! Underwriting tables: engine versions, model artifacts, bin edges, commercial conditions and the
//! preprocessing lookups. Loaded once from YAML and shared read-only.

use crate::workflows::bureau::BureauFlavor;
use crate::workflows::features::{normalizer::compact_label, FillPlan};
use crate::workflows::segmentation::EdgeConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum UnderwritingConfigError {
    #[error("failed to read underwriting config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("underwriting config {path} is invalid: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A lookup the request needed is absent from the configured tables.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no bin edges configured for group {group:?}")]
    MissingEdges { group: Option<String> },
    #[error("no FPD edges configured for H bin {h_bin}")]
    MissingFpdEdges { h_bin: String },
    #[error("no credit conditions for segment {key} (group {group:?}, variant {variant:?})")]
    MissingConditions {
        key: String,
        group: Option<String>,
        variant: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnderwritingConfig {
    pub engines: EngineTables,
    #[serde(default)]
    pub installment_terms: Vec<u32>,
    #[serde(default)]
    pub macro_indicators: BTreeMap<String, f64>,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub preprocessing: Preprocessing,
    #[serde(default)]
    pub mappings: MappingTables,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl UnderwritingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, UnderwritingConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| UnderwritingConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw).map_err(|source| UnderwritingConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse a document whose artifact paths are relative to the working directory.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Directory that relative artifact paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineTables {
    pub regular: EngineConfig,
    pub no_credit_life: EngineConfig,
    pub backup: EngineConfig,
}

/// Everything one scoring engine needs besides the shared preprocessing tables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub versions: EngineVersions,
    pub models: ModelPaths,
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Document type → deduction applied to the H probability, floored at zero.
    #[serde(default)]
    pub document_adjustments: BTreeMap<i64, f64>,
    pub edges: EdgeTable,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub diagonal: Option<DiagonalRule>,
    pub conditions: ConditionsTable,
    #[serde(default)]
    pub champion_challenger: Option<ChampionChallenger>,
    #[serde(default)]
    pub secondary_score_rule: bool,
    #[serde(default)]
    pub deceased_score: Option<i64>,
}

impl EngineConfig {
    pub fn h_adjustment(&self, document_type: i64) -> f64 {
        self.document_adjustments
            .get(&document_type)
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineVersions {
    pub h: VersionTag,
    pub fpd: VersionTag,
}

/// Model version reported in responses: a plain tag or a map of labeled tags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VersionTag {
    Plain(String),
    Labeled(BTreeMap<String, String>),
}

impl VersionTag {
    const PREFERRED_LABELS: [&'static str; 2] = ["hortensia_contraofertas", "fpd_hortensia"];

    /// Single tag for a response field; maps resolve through the preferred labels, then
    /// `default_label`, then their first entry.
    pub fn resolve(&self, default_label: &str) -> String {
        match self {
            VersionTag::Plain(tag) => tag.clone(),
            VersionTag::Labeled(tags) => Self::PREFERRED_LABELS
                .iter()
                .copied()
                .chain(std::iter::once(default_label))
                .find_map(|label| tags.get(label))
                .or_else(|| tags.values().next())
                .cloned()
                .unwrap_or_default(),
        }
    }
}

impl From<&str> for VersionTag {
    fn from(value: &str) -> Self {
        VersionTag::Plain(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelPaths {
    pub h: PathBuf,
    pub fpd: PathBuf,
    pub scaler_h: PathBuf,
    #[serde(default)]
    pub scaler_fpd: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EdgeTable {
    Shared(EdgeConfig),
    PerGroup(BTreeMap<String, EdgeConfig>),
}

impl EdgeTable {
    pub fn for_group(&self, group: Option<&str>) -> Result<&EdgeConfig, ConfigurationError> {
        match self {
            EdgeTable::Shared(edges) => Ok(edges),
            EdgeTable::PerGroup(groups) => group
                .and_then(|group| groups.get(group))
                .ok_or_else(|| ConfigurationError::MissingEdges {
                    group: group.map(str::to_string),
                }),
        }
    }
}

/// Diagonal cutoff in the (H, FPD) plane.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagonalRule {
    /// Reject when some `x` in `from/100..to/100` (step 0.01, end exclusive) has
    /// `h >= x` and `fpd >= m * x + b`.
    Scan { from: i64, to: i64, m: f64, b: f64 },
    /// Reject when `fpd >= m * h + b`.
    Line { m: f64, b: f64 },
}

impl DiagonalRule {
    pub fn rejects(&self, proba_h: f64, proba_fpd: f64) -> bool {
        match *self {
            DiagonalRule::Scan { from, to, m, b } => (from..to).any(|step| {
                let x = step as f64 / 100.0;
                proba_h >= x && proba_fpd >= m * x + b
            }),
            DiagonalRule::Line { m, b } => proba_fpd >= m * proba_h + b,
        }
    }
}

/// Commercial terms of one segment, echoed into the offer as configured.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreditTerms {
    pub list_price: serde_json::Value,
    pub financial_amount: serde_json::Value,
    pub percentaje: serde_json::Value,
    pub accesories_amount: serde_json::Value,
}

/// Segment key → terms, optionally nested under a retailer group and a champion/challenger variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConditionsTable {
    ByVariant(BTreeMap<String, BTreeMap<String, BTreeMap<String, CreditTerms>>>),
    ByGroup(BTreeMap<String, BTreeMap<String, CreditTerms>>),
    Flat(BTreeMap<String, CreditTerms>),
}

impl ConditionsTable {
    pub fn terms(
        &self,
        variant: &str,
        group: Option<&str>,
        key: &str,
    ) -> Result<&CreditTerms, ConfigurationError> {
        let found = match self {
            ConditionsTable::ByVariant(variants) => variants
                .get(variant)
                .zip(group)
                .and_then(|(groups, group)| groups.get(group))
                .and_then(|segments| segments.get(key)),
            ConditionsTable::ByGroup(groups) => group
                .and_then(|group| groups.get(group))
                .and_then(|segments| segments.get(key)),
            ConditionsTable::Flat(segments) => segments.get(key),
        };

        found.ok_or_else(|| ConfigurationError::MissingConditions {
            key: key.to_string(),
            group: group.map(str::to_string),
            variant: matches!(self, ConditionsTable::ByVariant(_)).then(|| variant.to_string()),
        })
    }
}

fn default_challenger_suffix() -> String {
    "-2".to_string()
}

fn default_control_variant() -> String {
    "Estandar".to_string()
}

fn default_challenger_variant() -> String {
    "Retador".to_string()
}

/// A/B split: approved applicants of `group` in segment `h_bin`/`f_bin` with an even national id
/// are priced from the challenger table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChampionChallenger {
    pub group: String,
    pub h_bin: String,
    pub f_bin: String,
    #[serde(default = "default_challenger_suffix")]
    pub suffix: String,
    #[serde(default = "default_control_variant")]
    pub control_variant: String,
    #[serde(default = "default_challenger_variant")]
    pub challenger_variant: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BusinessRules {
    #[serde(default)]
    pub blacklisted_departments: Vec<String>,
    #[serde(default)]
    pub competitor_nits: Vec<u64>,
}

impl BusinessRules {
    /// Entries and the store department are compared lower-cased without spaces.
    pub fn is_blacklisted(&self, department: &str) -> bool {
        let department = compact_label(department);
        !department.is_empty()
            && self
                .blacklisted_departments
                .iter()
                .any(|entry| compact_label(entry) == department)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Preprocessing {
    #[serde(default)]
    pub common_errors: BTreeMap<String, String>,
    #[serde(default)]
    pub behavior_map: BTreeMap<String, f64>,
    #[serde(default)]
    pub behavior_columns: Vec<String>,
    #[serde(default)]
    pub trend_columns_regular: Vec<String>,
    #[serde(default)]
    pub trend_columns_no_credit_life: Vec<String>,
    #[serde(default)]
    pub null_columns_regular: Vec<String>,
    #[serde(default)]
    pub zero_columns_regular: Vec<String>,
    #[serde(default)]
    pub null_columns_no_credit_life: Vec<String>,
    #[serde(default)]
    pub zero_columns_no_credit_life: Vec<String>,
}

impl Preprocessing {
    pub fn trend_columns(&self, flavor: BureauFlavor) -> &[String] {
        match flavor {
            BureauFlavor::Regular => &self.trend_columns_regular,
            BureauFlavor::NoCreditLife => &self.trend_columns_no_credit_life,
        }
    }

    pub fn fill_plan(&self, flavor: BureauFlavor) -> FillPlan {
        match flavor {
            BureauFlavor::Regular => FillPlan::new(
                self.null_columns_regular.clone(),
                self.zero_columns_regular.clone(),
            ),
            BureauFlavor::NoCreditLife => FillPlan::new(
                self.null_columns_no_credit_life.clone(),
                self.zero_columns_no_credit_life.clone(),
            ),
        }
    }
}

/// Free-text category → numeric code tables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MappingTables {
    #[serde(default)]
    pub departments: BTreeMap<String, f64>,
    #[serde(default)]
    pub job_types: BTreeMap<String, f64>,
    #[serde(default)]
    pub genders: BTreeMap<String, f64>,
    /// Code for labels absent from their table; unset leaves them missing.
    #[serde(default)]
    pub unmapped_code: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ENGINE: &str = r#"
versions:
  h: {hortensia_contraofertas: "HC-2.1", otra: "X"}
  fpd: "FPD-1.4"
models: {h: models/h.json, fpd: models/fpd.json, scaler_h: models/scaler.json}
edges:
  A:
    edges_h: [0.2, 0.5, 1.0]
    edges_f_by_h: {"1": [0.0, 0.1, 0.2, 0.3]}
diagonal:
  scan: {from: 40, to: 60, m: -1.0, b: 0.9}
conditions:
  Estandar:
    A:
      H01_F01: {list_price: 900000, financial_amount: 700000, percentaje: [0.3, 0.4], accesories_amount: 50000}
champion_challenger: {group: A, h_bin: H03, f_bin: F01}
"#;

    fn engine() -> EngineConfig {
        serde_yaml::from_str(ENGINE).expect("engine parses")
    }

    #[test]
    fn engine_sections_parse_into_their_shapes() {
        let engine = engine();
        assert!(matches!(engine.edges, EdgeTable::PerGroup(_)));
        assert!(matches!(engine.conditions, ConditionsTable::ByVariant(_)));
        assert!(matches!(engine.diagonal, Some(DiagonalRule::Scan { from: 40, .. })));
        assert_eq!(engine.models.scaler_fpd, None);
        assert!(!engine.secondary_score_rule);

        let challenger = engine.champion_challenger.expect("challenger configured");
        assert_eq!(challenger.suffix, "-2");
        assert_eq!(challenger.challenger_variant, "Retador");
    }

    #[test]
    fn version_tags_resolve_through_preferred_labels() {
        let engine = engine();
        assert_eq!(engine.versions.h.resolve("hortensia_contraofertas"), "HC-2.1");
        assert_eq!(engine.versions.fpd.resolve("fpd_hortensia"), "FPD-1.4");

        let other = VersionTag::Labeled(BTreeMap::from([
            ("zeta".to_string(), "Z".to_string()),
            ("beta".to_string(), "B".to_string()),
        ]));
        assert_eq!(other.resolve("zeta"), "Z");
        assert_eq!(other.resolve("missing"), "B");
        assert_eq!(VersionTag::Labeled(BTreeMap::new()).resolve("x"), "");
    }

    #[test]
    fn lookups_report_missing_entries() {
        let engine = engine();
        assert!(engine.edges.for_group(Some("A")).is_ok());
        assert_eq!(
            engine.edges.for_group(Some("B")),
            Err(ConfigurationError::MissingEdges {
                group: Some("B".to_string())
            })
        );

        let terms = engine
            .conditions
            .terms("Estandar", Some("A"), "H01_F01")
            .expect("terms configured");
        assert_eq!(terms.percentaje, json!([0.3, 0.4]));

        let missing = engine
            .conditions
            .terms("Retador", Some("A"), "H01_F01")
            .expect_err("no challenger table");
        assert!(matches!(missing, ConfigurationError::MissingConditions { .. }));
    }

    #[test]
    fn diagonal_scan_and_line_differ_at_the_boundary() {
        let scan = DiagonalRule::Scan {
            from: 40,
            to: 60,
            m: -1.0,
            b: 0.9,
        };
        assert!(scan.rejects(0.45, 0.46));
        assert!(!scan.rejects(0.39, 0.99));
        assert!(!scan.rejects(0.80, 0.25));

        let line = DiagonalRule::Line { m: -1.0, b: 0.9 };
        assert!(line.rejects(0.80, 0.25));
    }

    #[test]
    fn blacklist_ignores_case_and_spaces() {
        let rules = BusinessRules {
            blacklisted_departments: vec!["valledelcauca".to_string(), "Norte de Santander".to_string()],
            competitor_nits: vec![],
        };
        assert!(rules.is_blacklisted("Valle del Cauca"));
        assert!(rules.is_blacklisted("NORTE DE SANTANDER"));
        assert!(!rules.is_blacklisted("Antioquia"));
        assert!(!rules.is_blacklisted(""));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = UnderwritingConfig::load("does/not/exist.yaml").expect_err("missing");
        match error {
            UnderwritingConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("does/not/exist.yaml"))
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
