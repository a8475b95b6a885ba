use crate::workflows::features::{FeatureRecord, FieldValue};
use serde_json::Value;
use std::fmt;

/// Request-shape problems, reported to the caller as a client error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("El cuerpo debe ser un objeto JSON")]
    NotAnObject,
    #[error("Falta el objeto 'cliente'")]
    MissingClient,
    #[error("Faltan claves en 'cliente': {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("Valor no numérico en 'cliente.{field}'")]
    NotNumeric { field: String },
    #[error("Tipo de documento no soportado: {0}")]
    UnsupportedDocument(i64),
}

/// Identity documents the router knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    NaturalPerson,
    ForeignResident,
    /// Temporary protection permit; subject to the store-department blacklist.
    ProtectionPermit,
}

impl DocumentType {
    pub fn from_code(code: i64) -> Result<Self, ValidationError> {
        match code {
            1 => Ok(Self::NaturalPerson),
            4 => Ok(Self::ForeignResident),
            6 => Ok(Self::ProtectionPermit),
            other => Err(ValidationError::UnsupportedDocument(other)),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::NaturalPerson => 1,
            Self::ForeignResident => 4,
            Self::ProtectionPermit => 6,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A validated underwriting request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditRequest {
    /// Applicant fields as received; engines enrich a copy.
    pub client: FeatureRecord,
    pub bureau_xml: Option<String>,
    pub group: Option<String>,
    pub document_type: DocumentType,
    /// Coarse bureau tier carried in `score_experian`.
    pub score_tier: i64,
    pub store_department: Option<String>,
    /// National id as reported back, empty when absent.
    pub dni: String,
    pub secondary_score: bool,
}

const REQUIRED_CLIENT_FIELDS: [&str; 2] = ["tipo_documento", "score_experian"];

impl CreditRequest {
    pub fn from_payload(payload: &Value) -> Result<Self, ValidationError> {
        let body = payload.as_object().ok_or(ValidationError::NotAnObject)?;
        let client = body
            .get("cliente")
            .and_then(Value::as_object)
            .ok_or(ValidationError::MissingClient)?;

        let missing: Vec<String> = REQUIRED_CLIENT_FIELDS
            .iter()
            .filter(|field| !client.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let record = FeatureRecord::from_json_object(client);
        let document_type = DocumentType::from_code(integer_field(&record, "tipo_documento")?)?;
        let score_tier = integer_field(&record, "score_experian")?;

        let group = ["grupo_tienda", "grupo_retailer"]
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(non_empty_label);
        let bureau_xml = body
            .get("experianXML")
            .and_then(Value::as_str)
            .filter(|xml| !xml.trim().is_empty())
            .map(str::to_string);
        let store_department = record
            .get("departamento_tienda")
            .and_then(FieldValue::label);
        let dni = record
            .get("dni_cliente")
            .and_then(FieldValue::label)
            .filter(|dni| dni != "0")
            .unwrap_or_default();
        let secondary_score = record
            .get("p3")
            .map(|value| value.as_f64())
            .is_some_and(|value| value.is_finite() && value.trunc() != 0.0);

        Ok(Self {
            client: record,
            bureau_xml,
            group,
            document_type,
            score_tier,
            store_department,
            dni,
            secondary_score,
        })
    }

    pub fn group_label(&self) -> &str {
        self.group.as_deref().unwrap_or_default()
    }

    /// Fields from `required` the applicant record does not carry.
    pub fn missing_fields(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|field| !self.client.contains(field))
            .cloned()
            .collect()
    }
}

fn integer_field(record: &FeatureRecord, field: &str) -> Result<i64, ValidationError> {
    let value = record.number(field);
    if value.is_finite() {
        Ok(value.trunc() as i64)
    } else {
        Err(ValidationError::NotNumeric {
            field: field.to_string(),
        })
    }
}

fn non_empty_label(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.is_empty() => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
