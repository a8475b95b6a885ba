use super::domain::{CreditRequest, ValidationError};
use super::offers::{approval_offer, rejection_offer};
use super::policy::{rejection_reasons, PolicyRules, RejectionReason};
use super::response::{Decision, Outcome, Scores};
use super::routing::EngineKind;
use crate::config::{ConfigurationError, EngineConfig, EngineVersions, UnderwritingConfig};
use crate::workflows::bureau::{BureauExtractor, BureauFlavor};
use crate::workflows::features::{
    backup_client_variables, bureau_age_days, bureau_client_variables, monthly_series_features,
    quarterly_balance_trend, remap_behavior, FeatureRecord, FillPlan, Remapper,
};
use crate::workflows::scoring::{ModelSet, ScoringError};
use crate::workflows::segmentation::assign_bins;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Failure inside an engine once the request has been validated.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// One interchangeable underwriting engine.
pub trait DecisionEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn versions(&self) -> &EngineVersions;

    fn required_fields(&self) -> &[String] {
        &[]
    }

    fn decide(&self, request: &CreditRequest) -> Result<Decision, EngineError>;

    fn validate(&self, request: &CreditRequest) -> Result<(), ValidationError> {
        let missing = request.missing_fields(self.required_fields());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }

    /// Decide, converting any engine failure into the internal-error decision.
    fn predict(&self, request: &CreditRequest) -> Decision {
        match self.decide(request) {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    engine = %self.kind(),
                    dni = %request.dni,
                    error = %err,
                    "decision failed; answering with internal error"
                );
                Decision::internal_error(self.kind(), &request.dni, self.versions())
            }
        }
    }
}

/// Rejects every request routed to it; no model is consulted.
pub struct BlacklistEngine {
    versions: EngineVersions,
}

impl BlacklistEngine {
    pub fn new(versions: EngineVersions) -> Self {
        Self { versions }
    }
}

impl DecisionEngine for BlacklistEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Blacklist
    }

    fn versions(&self) -> &EngineVersions {
        &self.versions
    }

    fn decide(&self, request: &CreditRequest) -> Result<Decision, EngineError> {
        info!(
            dni = %request.dni,
            department = request.store_department.as_deref().unwrap_or_default(),
            "store department blacklisted"
        );
        Ok(Decision {
            engine: EngineKind::Blacklist,
            dni: request.dni.clone(),
            versions: self.versions.clone(),
            outcome: Outcome::Blacklisted {
                group: request.group.clone(),
                department: request.store_department.clone(),
            },
        })
    }
}

/// Feature preparation differs between the bureau-backed engines and the backup engine.
enum FeaturePipeline {
    Bureau {
        extractor: BureauExtractor,
        fill: FillPlan,
    },
    Demographic,
}

/// Model-backed engine: regular, no-credit-life or backup.
pub struct ScoringEngine {
    kind: EngineKind,
    tables: Arc<UnderwritingConfig>,
    remapper: Arc<Remapper>,
    models: ModelSet,
    pipeline: FeaturePipeline,
}

impl ScoringEngine {
    pub fn new(
        kind: EngineKind,
        tables: Arc<UnderwritingConfig>,
        remapper: Arc<Remapper>,
        models: ModelSet,
    ) -> Self {
        let flavor = match kind {
            EngineKind::Regular => Some(BureauFlavor::Regular),
            EngineKind::NoCreditLife => Some(BureauFlavor::NoCreditLife),
            EngineKind::Backup | EngineKind::Blacklist => None,
        };
        let pipeline = match flavor {
            Some(flavor) => FeaturePipeline::Bureau {
                extractor: BureauExtractor::new(
                    flavor,
                    tables.business_rules.competitor_nits.clone(),
                ),
                fill: tables.preprocessing.fill_plan(flavor),
            },
            None => FeaturePipeline::Demographic,
        };

        Self {
            kind,
            tables,
            remapper,
            models,
            pipeline,
        }
    }

    fn config(&self) -> &EngineConfig {
        match self.kind {
            EngineKind::Regular => &self.tables.engines.regular,
            EngineKind::NoCreditLife => &self.tables.engines.no_credit_life,
            EngineKind::Backup | EngineKind::Blacklist => &self.tables.engines.backup,
        }
    }

    /// Enriched applicant record, ready for scoring.
    pub fn features(&self, request: &CreditRequest) -> FeatureRecord {
        let mut record = request.client.clone();
        let macros = &self.tables.macro_indicators;

        match &self.pipeline {
            FeaturePipeline::Bureau { extractor, fill } => {
                let preprocessing = &self.tables.preprocessing;
                match request.bureau_xml.as_deref() {
                    Some(xml) => {
                        if let Some(bureau) = extractor.parse(xml) {
                            let kept = record.merge_absent(bureau);
                            debug!(collisions = kept.len(), "bureau features merged");
                        }
                    }
                    None => info!(dni = %request.dni, "no bureau report received"),
                }

                bureau_client_variables(&mut record, &self.remapper, macros);
                remap_behavior(
                    &mut record,
                    &preprocessing.behavior_columns,
                    &preprocessing.behavior_map,
                );
                quarterly_balance_trend(&mut record);
                monthly_series_features(&mut record, preprocessing.trend_columns(extractor.flavor()));
                record.alias("puntaje_quanto", "quanto");
                record.alias("ident_genero", "genero_exp");
                record.alias("Edad", "edad_cliente");

                let added = fill.apply(&mut record);
                bureau_age_days(&mut record);
                debug!(added, "missing columns synthesized");
            }
            FeaturePipeline::Demographic => {
                backup_client_variables(&mut record, &self.remapper, macros);
            }
        }
        record
    }

    fn score(&self, request: &CreditRequest) -> Result<Scores, EngineError> {
        let features = self.features(request);
        let (raw_h, fpd) = self.models.score(&features)?;

        let deduction = self.config().h_adjustment(request.document_type.code());
        let h = if deduction > 0.0 {
            (raw_h - deduction).max(0.0)
        } else {
            raw_h
        };
        info!(engine = %self.kind, proba_h = h, proba_fpd = fpd, "probabilities computed");
        Ok(Scores { h, fpd })
    }

    fn decision(&self, request: &CreditRequest, outcome: Outcome) -> Decision {
        Decision {
            engine: self.kind,
            dni: request.dni.clone(),
            versions: self.config().versions.clone(),
            outcome,
        }
    }
}

impl DecisionEngine for ScoringEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn versions(&self) -> &EngineVersions {
        &self.config().versions
    }

    fn required_fields(&self) -> &[String] {
        &self.config().required_fields
    }

    fn decide(&self, request: &CreditRequest) -> Result<Decision, EngineError> {
        let config = self.config();

        if config.deceased_score == Some(request.score_tier) {
            info!(dni = %request.dni, "bureau reports applicant as deceased");
            return Ok(self.decision(
                request,
                Outcome::Rejected {
                    reasons: vec![RejectionReason::Deceased],
                    scores: None,
                    offer: None,
                },
            ));
        }

        let scores = self.score(request)?;
        let group = request.group.as_deref();
        let edges = config.edges.for_group(group)?;
        let segment = assign_bins(scores.h, scores.fpd, edges);
        info!(
            engine = %self.kind,
            h_bin = segment.h_label().as_deref().unwrap_or_default(),
            f_bin = segment.f_label().as_deref().unwrap_or_default(),
            "applicant segmented"
        );

        let rules = PolicyRules {
            edges,
            diagonal: config.diagonal,
            secondary_score_rule: config.secondary_score_rule,
        };
        let reasons =
            rejection_reasons(&rules, scores.h, scores.fpd, &segment, request.secondary_score)?;

        let outcome = if reasons.is_empty() {
            let offer = approval_offer(
                &config.conditions,
                config.champion_challenger.as_ref(),
                group,
                &segment,
                &request.dni,
                &self.tables.installment_terms,
            )?;
            Outcome::Approved {
                scores,
                segment,
                offer,
            }
        } else {
            let offer = rejection_offer(request.group_label(), &reasons, &segment);
            Outcome::Rejected {
                reasons,
                scores: Some(scores),
                offer: Some(offer),
            }
        };

        let decision = self.decision(request, outcome);
        info!(engine = %self.kind, dni = %request.dni, decision = %decision.summary(), "decision made");
        Ok(decision)
    }
}
