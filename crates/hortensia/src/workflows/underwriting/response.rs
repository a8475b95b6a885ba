use super::offers::Offer;
use super::policy::RejectionReason;
use super::routing::EngineKind;
use crate::config::EngineVersions;
use crate::workflows::segmentation::Segment;
use serde::{Serialize, Serializer};

const MAIN_VERSION_LABEL: &str = "hortensia_contraofertas";
const FPD_VERSION_LABEL: &str = "fpd_hortensia";
const INTERNAL_ERROR: &str = "Error Interno";

/// `CodigoHortensia` values. The internal-error code is serialized as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HortensiaCode {
    Rejected,
    Approved,
    Blacklisted,
    InternalError,
}

impl Serialize for HortensiaCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HortensiaCode::Rejected => serializer.serialize_str("0"),
            HortensiaCode::Approved => serializer.serialize_str("2"),
            HortensiaCode::Blacklisted => serializer.serialize_str("4"),
            HortensiaCode::InternalError => serializer.serialize_u8(99),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub h: f64,
    pub fpd: f64,
}

/// `round(p * 100, 2)` with at least one fractional digit, e.g. `50.0` or `12.35`.
pub fn percent(probability: f64) -> String {
    let value = probability * 100.0;
    if !value.is_finite() {
        return String::new();
    }
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded}")
    }
}

/// Wire shape shared by every outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResponse {
    pub dni_cliente_consultado: String,
    #[serde(rename = "Motor")]
    pub motor: String,
    #[serde(rename = "Motor_FPD_Version")]
    pub motor_fpd_version: String,
    #[serde(rename = "Respuesta")]
    pub respuesta: String,
    #[serde(rename = "Razon_H")]
    pub razon_h: String,
    #[serde(rename = "CodigoHortensia")]
    pub codigo: HortensiaCode,
    #[serde(rename = "Puntuacion_H", skip_serializing_if = "Option::is_none")]
    pub puntuacion_h: Option<String>,
    #[serde(rename = "Puntuacion_HFPD", skip_serializing_if = "Option::is_none")]
    pub puntuacion_hfpd: Option<String>,
    #[serde(rename = "Contraofertas", skip_serializing_if = "Option::is_none")]
    pub contraofertas: Option<Offer>,
    #[serde(rename = "Mensaje", skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grupo_retailer: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departamento: Option<serde_json::Value>,
}

impl DecisionResponse {
    fn base(versions: &EngineVersions, dni: &str, code: HortensiaCode) -> Self {
        Self {
            dni_cliente_consultado: dni.to_string(),
            motor: versions.h.resolve(MAIN_VERSION_LABEL),
            motor_fpd_version: versions.fpd.resolve(FPD_VERSION_LABEL),
            respuesta: String::new(),
            razon_h: String::new(),
            codigo: code,
            puntuacion_h: None,
            puntuacion_hfpd: None,
            contraofertas: None,
            mensaje: None,
            grupo_retailer: None,
            departamento: None,
        }
    }
}

pub fn rejection_response(
    versions: &EngineVersions,
    dni: &str,
    reasons: &str,
    code: HortensiaCode,
    scores: Option<Scores>,
    offer: Option<&Offer>,
    only_group: bool,
) -> DecisionResponse {
    let mut response = DecisionResponse::base(versions, dni, code);
    response.respuesta = if code == HortensiaCode::Rejected {
        format!("Rechazado, {reasons}")
    } else {
        "Rechazado".to_string()
    };
    response.razon_h = reasons.to_string();
    if let Some(scores) = scores {
        response.puntuacion_h = Some(percent(scores.h));
        response.puntuacion_hfpd = Some(percent(scores.fpd));
    }
    response.contraofertas = offer.map(|offer| {
        if only_group {
            offer.reduced()
        } else {
            offer.clone()
        }
    });
    response
}

pub fn approval_response(
    versions: &EngineVersions,
    dni: &str,
    scores: Option<Scores>,
    offer: Option<&Offer>,
) -> DecisionResponse {
    let mut response = DecisionResponse::base(versions, dni, HortensiaCode::Approved);
    response.respuesta = "Aprobado".to_string();
    response.razon_h = "Aprobado".to_string();
    response.puntuacion_h = Some(scores.map(|scores| percent(scores.h)).unwrap_or_default());
    response.puntuacion_hfpd = Some(scores.map(|scores| percent(scores.fpd)).unwrap_or_default());
    response.contraofertas = offer.cloned();
    response
}

pub fn error_response(versions: &EngineVersions, dni: &str) -> DecisionResponse {
    let mut response = DecisionResponse::base(versions, dni, HortensiaCode::InternalError);
    response.respuesta = INTERNAL_ERROR.to_string();
    response.razon_h = INTERNAL_ERROR.to_string();
    response.mensaje = Some(format!("{INTERNAL_ERROR}."));
    response
}

pub fn blacklist_response(
    versions: &EngineVersions,
    dni: &str,
    group: Option<&str>,
    department: Option<&str>,
) -> DecisionResponse {
    let text = |value: Option<&str>| {
        value
            .map(|value| serde_json::Value::String(value.to_string()))
            .unwrap_or(serde_json::Value::Null)
    };
    let mut response = rejection_response(
        versions,
        dni,
        "ZF",
        HortensiaCode::Blacklisted,
        None,
        None,
        true,
    );
    response.respuesta = "Rechazado, ZF".to_string();
    response.grupo_retailer = Some(text(group));
    response.departamento = Some(text(department));
    response
}

/// What happened to an application.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Approved {
        scores: Scores,
        segment: Segment,
        offer: Offer,
    },
    Rejected {
        reasons: Vec<RejectionReason>,
        scores: Option<Scores>,
        offer: Option<Offer>,
    },
    Blacklisted {
        group: Option<String>,
        department: Option<String>,
    },
    InternalError,
}

/// Final, immutable result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub engine: EngineKind,
    pub dni: String,
    pub versions: EngineVersions,
    pub outcome: Outcome,
}

impl Decision {
    pub fn internal_error(engine: EngineKind, dni: &str, versions: &EngineVersions) -> Self {
        Self {
            engine,
            dni: dni.to_string(),
            versions: versions.clone(),
            outcome: Outcome::InternalError,
        }
    }

    pub fn code(&self) -> HortensiaCode {
        match self.outcome {
            Outcome::Approved { .. } => HortensiaCode::Approved,
            Outcome::Rejected { .. } => HortensiaCode::Rejected,
            Outcome::Blacklisted { .. } => HortensiaCode::Blacklisted,
            Outcome::InternalError => HortensiaCode::InternalError,
        }
    }

    pub fn summary(&self) -> String {
        match &self.outcome {
            Outcome::Approved { segment, .. } => match segment.key() {
                Some(key) => format!("approved in segment {key}"),
                None => "approved".to_string(),
            },
            Outcome::Rejected { reasons, .. } => {
                format!("rejected: {}", RejectionReason::join(reasons))
            }
            Outcome::Blacklisted { .. } => "rejected: blacklisted store department".to_string(),
            Outcome::InternalError => "internal error".to_string(),
        }
    }

    /// Response body; declined offers are reduced to the client group.
    pub fn to_response(&self) -> DecisionResponse {
        self.render(true)
    }

    /// Response body keeping any offer detail on declines.
    pub fn to_detailed_response(&self) -> DecisionResponse {
        self.render(false)
    }

    fn render(&self, only_group: bool) -> DecisionResponse {
        match &self.outcome {
            Outcome::Approved { scores, offer, .. } => {
                approval_response(&self.versions, &self.dni, Some(*scores), Some(offer))
            }
            Outcome::Rejected {
                reasons,
                scores,
                offer,
            } => rejection_response(
                &self.versions,
                &self.dni,
                &RejectionReason::join(reasons),
                HortensiaCode::Rejected,
                *scores,
                offer.as_ref(),
                only_group,
            ),
            Outcome::Blacklisted { group, department } => blacklist_response(
                &self.versions,
                &self.dni,
                group.as_deref(),
                department.as_deref(),
            ),
            Outcome::InternalError => error_response(&self.versions, &self.dni),
        }
    }
}
