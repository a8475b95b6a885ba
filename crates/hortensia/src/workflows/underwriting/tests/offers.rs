use super::common::*;
use serde_json::json;

use crate::config::{ChampionChallenger, ConfigurationError};
use crate::workflows::segmentation::Segment;
use crate::workflows::underwriting::offers::{
    approval_offer, is_challenger, rejection_offer, segment_tag,
};
use crate::workflows::underwriting::policy::RejectionReason;

fn segment(h: usize, f: usize) -> Segment {
    Segment {
        h_index: Some(h),
        f_index: Some(f),
    }
}

fn split() -> ChampionChallenger {
    config()
        .engines
        .regular
        .champion_challenger
        .clone()
        .expect("split configured")
}

#[test]
fn challenger_arm_needs_group_segment_and_even_numeric_dni() {
    let split = split();
    assert!(is_challenger(&split, "A", &segment(3, 1), "1234"));
    assert!(!is_challenger(&split, "A", &segment(3, 1), "1235"));
    assert!(!is_challenger(&split, "A", &segment(3, 1), "12a4"));
    assert!(!is_challenger(&split, "A", &segment(3, 1), ""));
    assert!(!is_challenger(&split, "B", &segment(3, 1), "1234"));
    assert!(!is_challenger(&split, "A", &segment(2, 1), "1234"));
}

#[test]
fn challenger_approvals_are_priced_from_the_challenger_table() {
    let config = config();
    let engine = &config.engines.regular;
    let offer = approval_offer(
        &engine.conditions,
        engine.champion_challenger.as_ref(),
        Some("A"),
        &segment(3, 1),
        "1234",
        &config.installment_terms,
    )
    .expect("conditions configured");

    assert_eq!(offer.grupo_cliente, "A-2-H03_F01");
    assert_eq!(offer.list_price, Some(json!(1500000)));
    assert_eq!(offer.installment_terms, Some(vec![6, 12, 18]));
}

#[test]
fn control_approvals_keep_the_plain_group() {
    let config = config();
    let engine = &config.engines.regular;
    let offer = approval_offer(
        &engine.conditions,
        engine.champion_challenger.as_ref(),
        Some("A"),
        &segment(3, 1),
        "1235",
        &config.installment_terms,
    )
    .expect("conditions configured");

    assert_eq!(offer.grupo_cliente, "A-H03_F01");
    assert_eq!(offer.max_amount, Some(json!(900000)));
    assert_eq!(offer.financing_options, Some(json!([0.3, 0.4])));
}

#[test]
fn group_keyed_conditions_ignore_the_variant() {
    let config = config();
    let engine = &config.engines.no_credit_life;
    let offer = approval_offer(
        &engine.conditions,
        None,
        Some("A"),
        &segment(3, 1),
        "1234",
        &config.installment_terms,
    )
    .expect("conditions configured");
    assert_eq!(offer.grupo_cliente, "A-H03_F01");
    assert_eq!(offer.accessories_amount, Some(json!(0)));
}

#[test]
fn unpriced_segments_report_missing_conditions() {
    let config = config();
    let engine = &config.engines.regular;
    let error = approval_offer(
        &engine.conditions,
        engine.champion_challenger.as_ref(),
        Some("A"),
        &segment(1, 2),
        "1234",
        &config.installment_terms,
    )
    .expect_err("H01_F02 not priced");

    match error {
        ConfigurationError::MissingConditions {
            key,
            group,
            variant,
        } => {
            assert_eq!(key, "H01_F02");
            assert_eq!(group.as_deref(), Some("A"));
            assert_eq!(variant.as_deref(), Some("Estandar"));
        }
        other => panic!("expected missing conditions, got {other:?}"),
    }
}

#[test]
fn rejection_offers_only_carry_the_group() {
    let offer = rejection_offer(
        "A",
        &[RejectionReason::LowPaymentProbability],
        &Segment::default(),
    );
    assert_eq!(offer.grupo_cliente, "A-H0_F0");
    assert_eq!(offer.list_price, None);

    let offer = rejection_offer("A", &[RejectionReason::SecondaryScore], &segment(3, 1));
    assert_eq!(offer.grupo_cliente, "A-H03_F01");

    let partial = Segment {
        h_index: Some(2),
        f_index: None,
    };
    assert_eq!(segment_tag(&partial), "H02_F0");
}

#[test]
fn rejection_offer_serializes_without_pricing_fields() {
    let offer = rejection_offer("", &[RejectionReason::Diagonal], &segment(2, 1));
    assert_eq!(
        serde_json::to_value(&offer).expect("offer serializes"),
        json!({"grupo_cliente": "-H0_F0"})
    );
}
