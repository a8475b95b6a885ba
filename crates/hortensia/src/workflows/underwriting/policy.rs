use crate::config::{ConfigurationError, DiagonalRule};
use crate::workflows::segmentation::{EdgeConfig, Segment};
use std::fmt;

/// Reasons a scored application is declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// H probability below the lowest H edge.
    LowPaymentProbability,
    /// FPD probability at or above the top FPD edge of the H bin.
    HighFirstPaymentDefault,
    /// Above the diagonal cutoff.
    Diagonal,
    /// Secondary score flag.
    SecondaryScore,
    /// The bureau reports the applicant as deceased.
    Deceased,
}

impl RejectionReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectionReason::LowPaymentProbability => "H",
            RejectionReason::HighFirstPaymentDefault => "HFPD",
            RejectionReason::Diagonal => "RE",
            RejectionReason::SecondaryScore => "P3",
            RejectionReason::Deceased => "Cliente reportado como fallecido",
        }
    }

    /// Reasons as reported in `Razon_H`.
    pub fn join(reasons: &[RejectionReason]) -> String {
        reasons
            .iter()
            .map(|reason| reason.code())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Rule switches of one engine.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRules<'a> {
    pub edges: &'a EdgeConfig,
    pub diagonal: Option<DiagonalRule>,
    pub secondary_score_rule: bool,
}

/// Apply the ordered rejection rules; an empty result means approval.
///
/// H and HFPD accumulate, the diagonal replaces whatever fired before it, and the secondary score
/// only applies when nothing else did.
pub fn rejection_reasons(
    rules: &PolicyRules<'_>,
    proba_h: f64,
    proba_fpd: f64,
    segment: &Segment,
    secondary_score: bool,
) -> Result<Vec<RejectionReason>, ConfigurationError> {
    let mut reasons = Vec::new();

    let lowest_h = rules
        .edges
        .lowest_h()
        .ok_or(ConfigurationError::MissingEdges { group: None })?;
    if proba_h < lowest_h {
        reasons.push(RejectionReason::LowPaymentProbability);
    }

    let h_index = segment.h_index.unwrap_or(1);
    let top_fpd = rules
        .edges
        .fpd_edges(h_index)
        .and_then(|edges| edges.last().copied())
        .ok_or_else(|| ConfigurationError::MissingFpdEdges {
            h_bin: format!("H{h_index:02}"),
        })?;
    if proba_fpd >= top_fpd {
        reasons.push(RejectionReason::HighFirstPaymentDefault);
    }

    if rules
        .diagonal
        .is_some_and(|diagonal| diagonal.rejects(proba_h, proba_fpd))
    {
        reasons = vec![RejectionReason::Diagonal];
    } else if rules.secondary_score_rule && reasons.is_empty() && secondary_score {
        reasons.push(RejectionReason::SecondaryScore);
    }

    Ok(reasons)
}
