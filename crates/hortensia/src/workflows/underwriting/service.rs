use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::domain::{CreditRequest, ValidationError};
use super::engine::{BlacklistEngine, DecisionEngine, ScoringEngine};
use super::response::Decision;
use super::routing::{route, EngineKind};
use crate::config::{BusinessRules, EngineConfig, UnderwritingConfig};
use crate::workflows::features::Remapper;
use crate::workflows::scoring::{ModelLoadError, ModelSet};

/// The four engines a request can be routed to.
pub struct EngineSet {
    pub regular: Arc<dyn DecisionEngine>,
    pub no_credit_life: Arc<dyn DecisionEngine>,
    pub backup: Arc<dyn DecisionEngine>,
    pub blacklist: Arc<dyn DecisionEngine>,
}

impl EngineSet {
    pub fn get(&self, kind: EngineKind) -> &Arc<dyn DecisionEngine> {
        match kind {
            EngineKind::Regular => &self.regular,
            EngineKind::NoCreditLife => &self.no_credit_life,
            EngineKind::Backup => &self.backup,
            EngineKind::Blacklist => &self.blacklist,
        }
    }
}

/// Entry point of the decision pipeline: validates, routes and runs one engine.
pub struct UnderwritingService {
    engines: EngineSet,
    rules: BusinessRules,
}

impl UnderwritingService {
    pub fn new(engines: EngineSet, rules: BusinessRules) -> Self {
        Self { engines, rules }
    }

    /// Build the model-backed engines from configuration, loading every artifact once.
    pub fn from_config(config: Arc<UnderwritingConfig>) -> Result<Self, ModelLoadError> {
        let models = ModelArtifacts::load(&config)?;
        Ok(Self::with_models(config, models))
    }

    /// Build the engines around models that are already loaded.
    pub fn with_models(config: Arc<UnderwritingConfig>, models: ModelArtifacts) -> Self {
        let remapper = Arc::new(Remapper::new(
            &config.mappings,
            &config.preprocessing.common_errors,
        ));
        let engine = |kind, models| -> Arc<dyn DecisionEngine> {
            Arc::new(ScoringEngine::new(
                kind,
                Arc::clone(&config),
                Arc::clone(&remapper),
                models,
            ))
        };

        let engines = EngineSet {
            regular: engine(EngineKind::Regular, models.regular),
            no_credit_life: engine(EngineKind::NoCreditLife, models.no_credit_life),
            backup: engine(EngineKind::Backup, models.backup),
            blacklist: Arc::new(BlacklistEngine::new(
                config.engines.backup.versions.clone(),
            )),
        };
        Self::new(engines, config.business_rules.clone())
    }

    /// Validate and route `payload`, then run the selected engine.
    ///
    /// Only request validation fails; engine faults come back as an internal-error decision.
    pub fn decide_and_predict(&self, payload: &Value) -> Result<Decision, ValidationError> {
        let request = CreditRequest::from_payload(payload)?;
        let kind = route(&request, &self.rules);
        info!(
            engine = %kind,
            document_type = %request.document_type,
            score_tier = request.score_tier,
            group = request.group_label(),
            department = request.store_department.as_deref().unwrap_or_default(),
            "request routed"
        );

        let engine = self.engines.get(kind);
        engine.validate(&request)?;
        Ok(engine.predict(&request))
    }
}

/// Loaded model sets, one per scoring engine.
pub struct ModelArtifacts {
    pub regular: ModelSet,
    pub no_credit_life: ModelSet,
    pub backup: ModelSet,
}

impl ModelArtifacts {
    pub fn load(config: &UnderwritingConfig) -> Result<Self, ModelLoadError> {
        let load = |engine: &EngineConfig| {
            let paths = &engine.models;
            ModelSet::load(
                config.base_dir(),
                &paths.h,
                &paths.fpd,
                &paths.scaler_h,
                paths.scaler_fpd.as_deref(),
            )
        };

        Ok(Self {
            regular: load(&config.engines.regular)?,
            no_credit_life: load(&config.engines.no_credit_life)?,
            backup: load(&config.engines.backup)?,
        })
    }
}
