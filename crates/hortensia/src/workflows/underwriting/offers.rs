use super::policy::RejectionReason;
use crate::config::{ChampionChallenger, ConditionsTable, ConfigurationError, CreditTerms};
use crate::workflows::segmentation::Segment;
use serde::Serialize;
use tracing::info;

/// Variant used for conditions lookups when no champion/challenger split applies.
const CONTROL_VARIANT: &str = "Estandar";

/// Commercial counter-offer attached to a decision.
///
/// Rejections only carry `grupo_cliente`; the pricing fields are filled for approvals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    #[serde(rename = "List_price", skip_serializing_if = "Option::is_none")]
    pub list_price: Option<serde_json::Value>,
    #[serde(rename = "Monto_max", skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<serde_json::Value>,
    #[serde(rename = "Opciones_finan", skip_serializing_if = "Option::is_none")]
    pub financing_options: Option<serde_json::Value>,
    #[serde(rename = "lapso_cuotas", skip_serializing_if = "Option::is_none")]
    pub installment_terms: Option<Vec<u32>>,
    #[serde(rename = "valor_accesorios", skip_serializing_if = "Option::is_none")]
    pub accessories_amount: Option<serde_json::Value>,
    pub grupo_cliente: String,
}

impl Offer {
    pub fn group_only(grupo_cliente: String) -> Self {
        Self {
            list_price: None,
            max_amount: None,
            financing_options: None,
            installment_terms: None,
            accessories_amount: None,
            grupo_cliente,
        }
    }

    fn priced(terms: &CreditTerms, installment_terms: &[u32], grupo_cliente: String) -> Self {
        Self {
            list_price: Some(terms.list_price.clone()),
            max_amount: Some(terms.financial_amount.clone()),
            financing_options: Some(terms.percentaje.clone()),
            installment_terms: Some(installment_terms.to_vec()),
            accessories_amount: Some(terms.accesories_amount.clone()),
            grupo_cliente,
        }
    }

    /// The same offer without pricing.
    pub fn reduced(&self) -> Self {
        Self::group_only(self.grupo_cliente.clone())
    }
}

/// `H03_F01`, with `H0`/`F0` standing in for unassigned bins.
pub fn segment_tag(segment: &Segment) -> String {
    format!(
        "{}_{}",
        segment.h_label().unwrap_or_else(|| "H0".to_string()),
        segment.f_label().unwrap_or_else(|| "F0".to_string())
    )
}

/// Offer reduced to the client group: `{group}-H0_F0`, or the segment for a secondary-score decline.
pub fn rejection_offer(group: &str, reasons: &[RejectionReason], segment: &Segment) -> Offer {
    let tag = if reasons == [RejectionReason::SecondaryScore] {
        segment_tag(segment)
    } else {
        "H0_F0".to_string()
    };
    Offer::group_only(format!("{group}-{tag}"))
}

/// Whether the approved applicant falls into the challenger arm of the A/B split.
///
/// Only applicants with an all-digit, even national id are moved.
pub fn is_challenger(
    split: &ChampionChallenger,
    group: &str,
    segment: &Segment,
    dni: &str,
) -> bool {
    let even_dni = !dni.is_empty()
        && dni.bytes().all(|byte| byte.is_ascii_digit())
        && dni
            .bytes()
            .last()
            .is_some_and(|digit| (digit - b'0') % 2 == 0);

    split.group == group
        && segment.h_label().as_deref() == Some(split.h_bin.as_str())
        && segment.f_label().as_deref() == Some(split.f_bin.as_str())
        && even_dni
}

/// Price an approved applicant from the conditions table.
pub fn approval_offer(
    conditions: &ConditionsTable,
    split: Option<&ChampionChallenger>,
    group: Option<&str>,
    segment: &Segment,
    dni: &str,
    installment_terms: &[u32],
) -> Result<Offer, ConfigurationError> {
    let group_label = group.unwrap_or_default();
    let key = segment.key().ok_or_else(|| ConfigurationError::MissingConditions {
        key: segment_tag(segment),
        group: group.map(str::to_string),
        variant: None,
    })?;

    let (variant, client_group) = match split {
        Some(split) if is_challenger(split, group_label, segment, dni) => {
            info!(group = group_label, segment = %key, "challenger conditions applied");
            (
                split.challenger_variant.as_str(),
                format!("{group_label}{}", split.suffix),
            )
        }
        Some(split) => (split.control_variant.as_str(), group_label.to_string()),
        None => (CONTROL_VARIANT, group_label.to_string()),
    };

    let terms = conditions.terms(variant, group, &key)?;
    Ok(Offer::priced(
        terms,
        installment_terms,
        format!("{client_group}-{key}"),
    ))
}
