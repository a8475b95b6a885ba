//! Request validation, engine routing, decision rules and response formatting.

pub mod domain;
pub mod engine;
pub mod offers;
pub mod policy;
pub mod response;
pub mod router;
pub mod routing;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{CreditRequest, DocumentType, ValidationError};
pub use engine::{BlacklistEngine, DecisionEngine, EngineError, ScoringEngine};
pub use offers::Offer;
pub use policy::{PolicyRules, RejectionReason};
pub use response::{
    approval_response, blacklist_response, error_response, percent, rejection_response,
    Decision, DecisionResponse, HortensiaCode, Outcome, Scores,
};
pub use router::underwriting_router;
pub use routing::{route, EngineKind};
pub use service::{EngineSet, ModelArtifacts, UnderwritingService};
