use super::domain::{CreditRequest, DocumentType};
use crate::config::BusinessRules;
use std::fmt;

/// Bureau tier reported when the bureau could not be consulted.
pub const BACKUP_TIER: i64 = 30;

/// Engine variant a request is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Regular,
    NoCreditLife,
    Backup,
    /// Automatic rejection for blacklisted store departments ("ZF").
    Blacklist,
}

impl EngineKind {
    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Regular => "regular",
            EngineKind::NoCreditLife => "no_credit_life",
            EngineKind::Backup => "backup",
            EngineKind::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn by_tier(score_tier: i64) -> EngineKind {
    match score_tier {
        BACKUP_TIER => EngineKind::Backup,
        0..=4 => EngineKind::NoCreditLife,
        _ => EngineKind::Regular,
    }
}

/// Pick the engine for a validated request. The blacklist check runs before the tier split.
pub fn route(request: &CreditRequest, rules: &BusinessRules) -> EngineKind {
    match request.document_type {
        DocumentType::NaturalPerson | DocumentType::ForeignResident => by_tier(request.score_tier),
        DocumentType::ProtectionPermit => {
            let blacklisted = request
                .store_department
                .as_deref()
                .is_some_and(|department| rules.is_blacklisted(department));
            if blacklisted {
                EngineKind::Blacklist
            } else {
                by_tier(request.score_tier)
            }
        }
    }
}
