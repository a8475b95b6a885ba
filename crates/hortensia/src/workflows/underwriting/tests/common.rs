use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::{json, Value};

use crate::config::UnderwritingConfig;
use crate::workflows::features::Remapper;
use crate::workflows::scoring::{MinMaxScaler, ModelSet, ScoringError, ScoringModel};
use crate::workflows::underwriting::domain::CreditRequest;
use crate::workflows::underwriting::engine::ScoringEngine;
use crate::workflows::underwriting::routing::EngineKind;
use crate::workflows::underwriting::service::{ModelArtifacts, UnderwritingService};

fn edges(indent: usize) -> String {
    let pad = " ".repeat(indent);
    [
        "edges_h: [0.2, 0.4, 0.6, 1.0]",
        "edges_f_by_h:",
        "  \"1\": [0.0, 0.1, 0.3]",
        "  \"2\": [0.0, 0.15, 0.35]",
        "  \"3\": [0.0, 0.2, 0.4]",
    ]
    .iter()
    .map(|line| format!("\n{pad}{line}"))
    .collect()
}

pub(super) fn config_yaml() -> String {
    let grouped = edges(8);
    let shared = edges(6);
    format!(
        r#"
installment_terms: [6, 12, 18]
macro_indicators: {{tasa_desempleo: 10.2}}
business_rules:
  blacklisted_departments: ["Valle del Cauca"]
  competitor_nits: [900123456]
engines:
  regular:
    versions:
      h: {{hortensia_contraofertas: "HC-2.1"}}
      fpd: "FPD-1.4"
    models: {{h: models/h.json, fpd: models/fpd.json, scaler_h: models/scaler.json}}
    required_fields: [p6]
    deceased_score: 3
    secondary_score_rule: true
    edges:
      A:{grouped}
    diagonal:
      scan: {{from: 40, to: 60, m: -1.0, b: 0.9}}
    conditions:
      Estandar:
        A:
          H03_F01: {{list_price: 1200000, financial_amount: 900000, percentaje: [0.3, 0.4], accesories_amount: 80000}}
          H02_F01: {{list_price: 800000, financial_amount: 600000, percentaje: [0.4], accesories_amount: 50000}}
      Retador:
        A:
          H03_F01: {{list_price: 1500000, financial_amount: 1100000, percentaje: [0.2], accesories_amount: 90000}}
    champion_challenger: {{group: A, h_bin: H03, f_bin: F01}}
  no_credit_life:
    versions: {{h: "NCL-1.0", fpd: "NCL-FPD-1.0"}}
    models: {{h: models/ncl_h.json, fpd: models/ncl_fpd.json, scaler_h: models/ncl_scaler.json}}
    required_fields: [p6]
    deceased_score: 3
    document_adjustments: {{6: 0.07}}
    edges:
      A:{grouped}
    diagonal:
      line: {{m: -1.0, b: 0.9}}
    conditions:
      A:
        H03_F01: {{list_price: 700000, financial_amount: 500000, percentaje: [0.5], accesories_amount: 0}}
  backup:
    versions: {{h: "BK-3.0", fpd: "BK-FPD-3.0"}}
    models: {{h: models/bk_h.json, fpd: models/bk_fpd.json, scaler_h: models/bk_scaler.json}}
    document_adjustments: {{6: 0.05}}
    edges:{shared}
    conditions:
      H03_F01: {{list_price: 500000, financial_amount: 400000, percentaje: [0.5], accesories_amount: 0}}
"#
    )
}

pub(super) fn config() -> Arc<UnderwritingConfig> {
    Arc::new(UnderwritingConfig::from_yaml(&config_yaml()).expect("fixture config parses"))
}

/// Model returning a fixed probability and counting its calls.
#[derive(Debug)]
pub(super) struct FixedModel {
    probability: f64,
    calls: AtomicUsize,
}

impl FixedModel {
    pub(super) fn new(probability: f64) -> Arc<Self> {
        Arc::new(Self {
            probability,
            calls: AtomicUsize::new(0),
        })
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScoringModel for FixedModel {
    fn feature_names(&self) -> &[String] {
        &[]
    }

    fn predict_probability(&self, _row: &[f64]) -> Result<f64, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probability)
    }
}

pub(super) fn empty_scaler() -> Arc<MinMaxScaler> {
    Arc::new(MinMaxScaler::new(Vec::new(), Vec::new(), Vec::new()).expect("empty scaler"))
}

pub(super) fn model_set(h: &Arc<FixedModel>, fpd: &Arc<FixedModel>) -> ModelSet {
    ModelSet::shared(h.clone(), fpd.clone(), empty_scaler())
}

pub(super) fn fixed_models(proba_h: f64, proba_fpd: f64) -> ModelSet {
    model_set(&FixedModel::new(proba_h), &FixedModel::new(proba_fpd))
}

pub(super) fn engine(kind: EngineKind, proba_h: f64, proba_fpd: f64) -> ScoringEngine {
    let config = config();
    let remapper = Arc::new(Remapper::new(
        &config.mappings,
        &config.preprocessing.common_errors,
    ));
    ScoringEngine::new(kind, config, remapper, fixed_models(proba_h, proba_fpd))
}

pub(super) fn service_with(models: ModelArtifacts) -> UnderwritingService {
    UnderwritingService::with_models(config(), models)
}

pub(super) fn service(proba_h: f64, proba_fpd: f64) -> UnderwritingService {
    service_with(ModelArtifacts {
        regular: fixed_models(proba_h, proba_fpd),
        no_credit_life: fixed_models(proba_h, proba_fpd),
        backup: fixed_models(proba_h, proba_fpd),
    })
}

pub(super) fn payload(document_type: i64, score_tier: i64) -> Value {
    json!({
        "grupo_tienda": "A",
        "cliente": {
            "tipo_documento": document_type,
            "score_experian": score_tier,
            "dni_cliente": "1234",
            "p6": 640,
            "p3": 0,
            "edad_al_contratar": 34,
            "genero": "F",
            "departamento_tienda": "Antioquia"
        }
    })
}

pub(super) fn request(document_type: i64, score_tier: i64) -> CreditRequest {
    CreditRequest::from_payload(&payload(document_type, score_tier)).expect("valid payload")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
