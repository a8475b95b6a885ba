use std::collections::BTreeMap;

use crate::config::{ConfigurationError, DiagonalRule};
use crate::workflows::segmentation::{assign_bins, EdgeConfig, Segment};
use crate::workflows::underwriting::policy::{rejection_reasons, PolicyRules, RejectionReason};

fn edges() -> EdgeConfig {
    EdgeConfig::new(
        vec![0.2, 0.4, 0.6, 1.0],
        BTreeMap::from([
            ("1".to_string(), vec![0.0, 0.1, 0.3]),
            ("2".to_string(), vec![0.0, 0.15, 0.35]),
            ("3".to_string(), vec![0.0, 0.2, 0.4]),
        ]),
    )
}

fn reasons(
    edges: &EdgeConfig,
    diagonal: Option<DiagonalRule>,
    proba_h: f64,
    proba_fpd: f64,
    secondary_score: bool,
) -> Vec<RejectionReason> {
    let rules = PolicyRules {
        edges,
        diagonal,
        secondary_score_rule: true,
    };
    let segment = assign_bins(proba_h, proba_fpd, edges);
    rejection_reasons(&rules, proba_h, proba_fpd, &segment, secondary_score)
        .expect("edges configured")
}

const SCAN: DiagonalRule = DiagonalRule::Scan {
    from: 40,
    to: 60,
    m: -1.0,
    b: 0.9,
};

#[test]
fn low_h_and_high_fpd_accumulate() {
    let edges = edges();
    assert_eq!(
        reasons(&edges, Some(SCAN), 0.1, 0.35, false),
        vec![
            RejectionReason::LowPaymentProbability,
            RejectionReason::HighFirstPaymentDefault
        ]
    );
    assert_eq!(
        RejectionReason::join(&reasons(&edges, Some(SCAN), 0.1, 0.35, false)),
        "H+HFPD"
    );
}

#[test]
fn fpd_cutoff_follows_the_h_bin() {
    let edges = edges();
    assert!(reasons(&edges, None, 0.7, 0.35, false).is_empty());
    assert_eq!(
        reasons(&edges, None, 0.3, 0.3, false),
        vec![RejectionReason::HighFirstPaymentDefault]
    );
}

#[test]
fn diagonal_replaces_earlier_reasons() {
    let edges = edges();
    assert_eq!(
        reasons(&edges, Some(SCAN), 0.5, 0.5, true),
        vec![RejectionReason::Diagonal]
    );
}

#[test]
fn secondary_score_only_applies_when_nothing_else_fired() {
    let edges = edges();
    assert_eq!(
        reasons(&edges, Some(SCAN), 0.7, 0.1, true),
        vec![RejectionReason::SecondaryScore]
    );
    assert_eq!(
        reasons(&edges, Some(SCAN), 0.1, 0.05, true),
        vec![RejectionReason::LowPaymentProbability]
    );
    assert!(reasons(&edges, Some(SCAN), 0.7, 0.1, false).is_empty());
}

#[test]
fn secondary_score_is_ignored_when_the_rule_is_off() {
    let edges = edges();
    let rules = PolicyRules {
        edges: &edges,
        diagonal: None,
        secondary_score_rule: false,
    };
    let segment = assign_bins(0.7, 0.1, &edges);
    let reasons = rejection_reasons(&rules, 0.7, 0.1, &segment, true).expect("edges configured");
    assert!(reasons.is_empty());
}

#[test]
fn missing_fpd_edges_are_a_configuration_error() {
    let edges = EdgeConfig::new(vec![0.2, 0.6, 1.0], BTreeMap::new());
    let rules = PolicyRules {
        edges: &edges,
        diagonal: None,
        secondary_score_rule: false,
    };
    let error = rejection_reasons(&rules, 0.7, 0.1, &Segment::default(), false)
        .expect_err("no fpd edges");
    assert_eq!(
        error,
        ConfigurationError::MissingFpdEdges {
            h_bin: "H01".to_string()
        }
    );
}
