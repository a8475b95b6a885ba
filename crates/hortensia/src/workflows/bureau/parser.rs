use super::BureauParseError;
use crate::workflows::features::normalizer::{is_plain_decimal, parse_iso_date, parse_numeric};
use crate::workflows::features::{FeatureRecord, FieldValue};
use roxmltree::{Document, Node};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fields that keep their raw text after extraction; everything else is coerced to a number.
const CATEGORICAL_FIELDS: &[&str] = &[
    "fechaConsulta",
    "fecha_max_vencimiento",
    "ciudad_exp",
    "departamento_exp",
    "agr_prinp_antiguedadDesde",
    "ahorros_fechaApertura_reciente",
    "cartera_fechaApertura_reciente",
    "tdc_fechaApertura_reciente",
];

const PRINCIPAL_KEYS: &[&str] = &[
    "creditoVigentes",
    "creditosCerrados",
    "creditosActualesNegativos",
    "histNegUlt12Meses",
    "cuentasAbiertasAHOCCB",
    "cuentasCerradasAHOCCB",
    "consultadasUlt6meses",
    "desacuerdosALaFecha",
    "antiguedadDesde",
    "reclamosVigentes",
];

const BALANCE_KEYS: &[&str] = &[
    "saldoTotalEnMora",
    "saldoM30",
    "saldoM60",
    "saldoM90",
    "cuotaMensual",
    "saldoCreditoMasAlto",
    "saldoTotal",
];

const AVERAGE_KEYS: &[&str] = &["cuota", "porcentajeUso", "totalCerradas", "totalAbiertas", "saldo"];

const QUARTER_KEYS: &[&str] = &["cuota", "cupoTotal", "moraMaxima", "saldo", "porcentajeUso"];

const MICRO_BALANCE_KEYS: &[&str] = &[
    "saldoDeudaTotalMora",
    "saldoDeudaTotal",
    "numCreditosMayorIgual60",
    "totalCuentasMora",
    "numCreditos30",
];

const ACTIVE_CARD_STATES: &[&str] = &["01", "13", "14", "15", "16"];

/// Flat fields of one report plus what the derived passes need to know about it.
#[derive(Debug)]
pub(crate) struct Extraction {
    pub record: FeatureRecord,
    pub inquiries: usize,
}

/// Drop an optional `<?xml ...?>` declaration.
pub(crate) fn strip_prolog(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some((_, rest)) = trimmed.split_once("?>") {
            return rest;
        }
    }
    xml
}

pub(crate) fn extract(xml: &str) -> Result<Extraction, BureauParseError> {
    let document = Document::parse(strip_prolog(xml))?;
    let informe = document
        .root_element()
        .descendants()
        .find(|node| node.has_tag_name("Informe"))
        .ok_or(BureauParseError::MissingReport)?;

    let mut record = FeatureRecord::new();
    identification(informe, &mut record);
    savings(informe, &mut record);
    credit_accounts(informe, &mut record);
    cards(informe, &mut record);
    let inquiries = inquiries(informe, &mut record);
    aggregated(informe, &mut record);
    microcredit(informe, &mut record);
    balance_sums(informe, &mut record);

    debug!(fields = record.len(), inquiries, "bureau report flattened");
    coerce_numeric(&mut record);
    Ok(Extraction { record, inquiries })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|candidate| candidate.has_tag_name(name))
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |candidate| candidate.has_tag_name(name))
}

fn attr(node: Option<Node<'_, '_>>, key: &str) -> String {
    node.and_then(|node| node.attribute(key))
        .unwrap_or_default()
        .to_string()
}

fn attr_or(node: Node<'_, '_>, key: &str, default: &str) -> String {
    node.attribute(key).unwrap_or(default).to_string()
}

/// Most recent non-blank date string; ISO dates compare correctly as text.
fn latest(values: impl Iterator<Item = String>) -> String {
    values
        .filter(|value| !value.trim().is_empty())
        .max()
        .unwrap_or_default()
}

fn identification(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    record.insert("fechaConsulta", attr(Some(informe), "fechaConsulta"));
    record.insert(
        "identificacionDigitada",
        attr(Some(informe), "identificacionDigitada"),
    );

    let identity = child(informe, "NaturalNacional").and_then(|node| child(node, "Identificacion"));
    for key in ["ciudad", "departamento", "genero"] {
        record.insert(format!("{key}_exp"), attr(identity, key));
    }

    let score = child(informe, "Score");
    record.insert("puntaje_experian", attr(score, "puntaje"));

    let reasons: Vec<String> = score
        .map(|node| {
            children(node, "Razon")
                .map(|reason| attr_or(reason, "codigo", ""))
                .collect()
        })
        .unwrap_or_default();
    for index in 0..2 {
        let value = reasons
            .get(index)
            .map(|code| FieldValue::from(code.as_str()))
            .unwrap_or(FieldValue::Missing);
        record.insert(format!("razon_codigo_{}", index + 1), value);
    }
}

fn savings(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    let accounts: Vec<Node> = children(informe, "CuentaAhorro").collect();
    record.insert(
        "ahorros_fechaApertura_reciente",
        latest(accounts.iter().map(|a| attr_or(*a, "fechaApertura", ""))),
    );
    record.set_number("Ctas_pCliente", accounts.len() as f64);
    let sector_one = accounts
        .iter()
        .filter(|account| account.attribute("sector") == Some("1"))
        .count();
    record.set_number("Cuentas_sector1", sector_one as f64);
}

fn credit_accounts(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    let accounts: Vec<Node> = children(informe, "CuentaCartera").collect();

    record.insert(
        "fecha_max_vencimiento",
        latest(accounts.iter().map(|a| attr_or(*a, "fechaVencimiento", ""))),
    );

    let mut per_sector: HashMap<String, usize> = HashMap::new();
    let mut opened = Vec::new();
    for (position, account) in accounts.iter().enumerate() {
        let account_index = position + 1;
        let sector = attr_or(*account, "sector", "");

        if let Some(date) = account.attribute("fechaApertura").and_then(parse_iso_date) {
            opened.push(date);
        }

        if let Some(values) = child(*account, "Valores") {
            for value in children(values, "Valor") {
                let counter = per_sector.entry(sector.clone()).or_default();
                *counter += 1;
                let prefix = format!("Sector{sector}_{counter}");
                record.insert(format!("{prefix}_cuota"), attr_or(value, "cuota", ""));
                record.insert(
                    format!("{prefix}_totalCuotas"),
                    attr_or(value, "totalCuotas", ""),
                );
                record.insert(
                    format!("{prefix}_cuotasCanceladas"),
                    attr_or(value, "cuotasCanceladas", ""),
                );
            }
        }

        if let Some(states) = child(*account, "Estados") {
            for (state_position, state) in children(states, "EstadoCuenta").enumerate() {
                record.insert(
                    format!("Cartera_{account_index}_{}_codigo", state_position + 1),
                    attr_or(state, "codigo", ""),
                );
            }
        }
    }

    let most_recent = opened
        .iter()
        .max()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    record.insert("cartera_fechaApertura_reciente", most_recent);

    let characteristic = |key: &str, expected: &str| {
        accounts
            .iter()
            .filter_map(|account| child(*account, "Caracteristicas"))
            .filter(|node| node.attribute(key) == Some(expected))
            .count() as f64
    };
    record.set_number("CC_TipoContrato_1", characteristic("tipoContrato", "1"));
    record.set_number("cc_tpobl_2_con", characteristic("tipoObligacion", "2"));
}

fn cards(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    record.insert(
        "tdc_fechaApertura_reciente",
        latest(children(informe, "TarjetaCredito").map(|card| attr_or(card, "fechaApertura", ""))),
    );
}

/// Inquiries grouped by account type (sorted), indexed per group in document order.
fn inquiries(informe: Node<'_, '_>, record: &mut FeatureRecord) -> usize {
    let mut by_type: BTreeMap<String, Vec<Node>> = BTreeMap::new();
    let mut total = 0usize;
    for inquiry in children(informe, "Consulta") {
        by_type
            .entry(attr_or(inquiry, "tipoCuenta", ""))
            .or_default()
            .push(inquiry);
        total += 1;
    }

    for (kind, group) in &by_type {
        for (position, inquiry) in group.iter().enumerate() {
            let prefix = format!("Consulta_{kind}_{}", position + 1);
            record.insert(format!("{prefix}_cantidad"), attr_or(*inquiry, "cantidad", ""));
            record.insert(
                format!("{prefix}_nitSuscriptor"),
                attr_or(*inquiry, "nitSuscriptor", ""),
            );
            record.insert(format!("{prefix}_fecha"), attr_or(*inquiry, "fecha", ""));
        }
    }
    total
}

fn aggregated(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    let products = child(informe, "productosValores");
    record.insert("quanto", attr(products, "valor1"));
    record.insert("quanto_pct", attr(products, "valor1smlv"));

    let info = child(informe, "InfoAgregada");
    let summary = info.and_then(|node| child(node, "Resumen"));

    let principal = summary.and_then(|node| child(node, "Principales"));
    for key in PRINCIPAL_KEYS {
        record.insert(format!("agr_prinp_{key}"), attr(principal, key));
    }

    let balances = summary.and_then(|node| child(node, "Saldos"));
    for key in BALANCE_KEYS {
        record.insert(format!("agr_saldos_{key}"), attr(balances, key));
    }
    if let Some(balances) = balances {
        for (position, month) in children(balances, "Mes").enumerate() {
            let index = position + 1;
            record.insert(
                format!("saldoTotalMora_{index}"),
                attr_or(month, "saldoTotalMora", ""),
            );
            record.insert(format!("saldoTotal_{index}"), attr_or(month, "saldoTotal", ""));
        }
    }

    if let Some(behavior) = summary.and_then(|node| child(node, "Comportamiento")) {
        for (position, month) in children(behavior, "Mes").enumerate() {
            let index = position + 1;
            record.insert(
                format!("comportamiento_{index}"),
                attr_or(month, "comportamiento", ""),
            );
            record.insert(format!("cantidad_{index}"), attr_or(month, "cantidad", ""));
        }
    }

    if let Some(portfolio) = info.and_then(|node| child(node, "ComposicionPortafolio")) {
        for (position, account_type) in children(portfolio, "TipoCuenta").enumerate() {
            let index = position + 1;
            record.insert(format!("total_tipo_{index}"), attr_or(account_type, "tipo", ""));
            record.insert(
                format!("total_cantidad_{index}"),
                attr_or(account_type, "cantidad", ""),
            );

            let kind = attr_or(account_type, "tipo", "tipo");
            for (state_position, state) in children(account_type, "Estado").enumerate() {
                let code = attr_or(state, "codigo", "");
                if code == "Al dia" || code == "Activa" {
                    record.insert(
                        format!("{kind}_{code}_cantidad_{}", state_position + 1),
                        attr_or(state, "cantidad", ""),
                    );
                }
            }
        }
    }

    if let Some(evolution) = info.and_then(|node| child(node, "EvolucionDeuda")) {
        if let Some(average) = evolution
            .descendants()
            .find(|node| node.has_tag_name("AnalisisPromedio"))
        {
            for key in AVERAGE_KEYS {
                record.insert(format!("agr_analisisPromedio_{key}"), attr_or(average, key, ""));
            }
        }

        let quarters = evolution
            .descendants()
            .filter(|node| node.has_tag_name("Trimestre"));
        for (position, quarter) in quarters.enumerate() {
            for key in QUARTER_KEYS {
                record.insert(
                    format!("trimestre_{}_{key}", position + 1),
                    attr_or(quarter, key, "missing"),
                );
            }
        }
    }
}

fn microcredit(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    let Some(micro) = child(informe, "InfoAgregadaMicrocredito") else {
        return;
    };
    let summary = child(micro, "Resumen");

    let closed = summary
        .and_then(|node| child(node, "PerfilGeneral"))
        .and_then(|node| child(node, "CreditosCerrados"));
    if let Some(closed) = closed {
        record.insert("Cc_sectorTelcos", attr_or(closed, "sectorTelcos", ""));
        record.insert(
            "Cc_totalComoPrincipal",
            attr_or(closed, "totalComoPrincipal", ""),
        );
    }

    if let Some(evolution) = child(micro, "EvolucionDeuda") {
        let telcos = children(evolution, "EvolucionDeudaSector")
            .filter(|sector| sector.attribute("codSector") == Some("4"));
        for sector in telcos {
            for account_type in children(sector, "EvolucionDeudaTipoCuenta") {
                let kind = attr_or(account_type, "tipoCuenta", "");
                let quarters = children(account_type, "EvolucionDeudaValorTrimestre").take(3);
                for (position, quarter) in quarters.enumerate() {
                    record.insert(
                        format!("{kind}_trim_{}_saldoMora", position + 1),
                        attr_or(quarter, "saldoMora", ""),
                    );
                }
            }
        }
    }

    if let Some(vector) = summary.and_then(|node| child(node, "VectorSaldosYMoras")) {
        for (position, entry) in children(vector, "SaldosYMoras").enumerate() {
            for key in MICRO_BALANCE_KEYS {
                record.insert(format!("{key}_{}", position + 1), attr_or(entry, key, ""));
            }
        }
    }
}

fn account_values<'a, 'input: 'a>(
    informe: Node<'a, 'input>,
    product: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    informe
        .descendants()
        .filter(move |node| node.has_tag_name(product))
        .filter_map(|node| child(node, "Valores"))
        .flat_map(|values| children(values, "Valor"))
}

fn sum_plain(values: impl Iterator<Item = Option<String>>) -> f64 {
    values
        .flatten()
        .filter(|raw| is_plain_decimal(raw))
        .filter_map(|raw| parse_numeric(&raw))
        .sum()
}

fn balance_sums(informe: Node<'_, '_>, record: &mut FeatureRecord) {
    let sum_of = |product: &'static str, key: &'static str| {
        sum_plain(account_values(informe, product).map(|value| value.attribute(key).map(str::to_string)))
    };

    record.set_number("cartera_saldo_actual", sum_of("CuentaCartera", "saldoActual"));
    record.set_number("cartera_saldo_mora", sum_of("CuentaCartera", "saldoMora"));
    record.set_number("tdc_saldo_actual", sum_of("TarjetaCredito", "saldoActual"));
    record.set_number("tdc_saldo_mora", sum_of("TarjetaCredito", "saldoMora"));

    let active_initial: f64 = account_values(informe, "CuentaCartera")
        .filter(|value| {
            value
                .attribute("saldoActual")
                .filter(|raw| is_plain_decimal(raw))
                .and_then(parse_numeric)
                .is_some_and(|balance| balance != 0.0)
        })
        .filter_map(|value| value.attribute("valorInicial").and_then(parse_numeric))
        .sum();
    record.set_number("cartera_valorInicial_activa", active_initial);

    let active_limit: f64 = informe
        .descendants()
        .filter(|node| node.has_tag_name("TarjetaCredito"))
        .filter(|card| {
            let last_state = child(*card, "Estados")
                .and_then(|states| children(states, "EstadoCuenta").last())
                .and_then(|state| state.attribute("codigo"));
            last_state.is_some_and(|code| ACTIVE_CARD_STATES.contains(&code))
        })
        .filter_map(|card| child(card, "Valores"))
        .map(|values| {
            sum_plain(children(values, "Valor").map(|value| value.attribute("cupoTotal").map(str::to_string)))
        })
        .sum();
    record.set_number("tdc_cupototal_activo", active_limit);
}

fn is_categorical(key: &str) -> bool {
    if CATEGORICAL_FIELDS.contains(&key) {
        return true;
    }
    if let Some(month) = key.strip_prefix("comportamiento_") {
        return month.parse::<u32>().is_ok_and(|month| (1..=24).contains(&month));
    }
    if let Some(quarter) = key.strip_prefix("total_tipo_") {
        return matches!(quarter, "1" | "2" | "3");
    }
    if matches!(
        key,
        "trimestre_1_moraMaxima" | "trimestre_2_moraMaxima" | "trimestre_3_moraMaxima"
    ) {
        return true;
    }
    key.starts_with("Consulta_") && key.ends_with("_fecha")
}

/// Best-effort numeric coercion of every non-categorical text field.
fn coerce_numeric(record: &mut FeatureRecord) {
    let textual = record.keys_matching(|key| !is_categorical(key));
    for key in textual {
        let coerced = match record.get(&key) {
            Some(FieldValue::Text(raw)) => Some(
                parse_numeric(raw)
                    .map(FieldValue::number)
                    .unwrap_or(FieldValue::Missing),
            ),
            _ => None,
        };
        if let Some(value) = coerced {
            record.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prolog_is_removed_before_parsing() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Informes/>";
        assert_eq!(strip_prolog(xml), "<Informes/>");
        assert_eq!(strip_prolog("<Informes/>"), "<Informes/>");
    }

    #[test]
    fn categorical_allow_list_is_exact() {
        assert!(is_categorical("fechaConsulta"));
        assert!(is_categorical("comportamiento_24"));
        assert!(!is_categorical("comportamiento_25"));
        assert!(is_categorical("total_tipo_3"));
        assert!(!is_categorical("total_tipo_4"));
        assert!(is_categorical("Consulta_SFI_1_fecha"));
        assert!(!is_categorical("Consulta_SFI_1_cantidad"));
        assert!(is_categorical("trimestre_2_moraMaxima"));
        assert!(!is_categorical("trimestre_2_saldo"));
    }

    #[test]
    fn report_without_informe_is_rejected() {
        let error = extract("<Otro><Nada/></Otro>").expect_err("no report");
        assert!(matches!(error, BureauParseError::MissingReport));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let error = extract("<Informe><Score></Informe>").expect_err("malformed");
        assert!(matches!(error, BureauParseError::Malformed(_)));
    }

    #[test]
    fn root_informe_is_accepted() {
        let extraction = extract(r#"<Informe fechaConsulta="2024-05-10T08:00:00"/>"#)
            .expect("report at root");
        assert_eq!(
            extraction.record.text("fechaConsulta"),
            Some("2024-05-10T08:00:00")
        );
        assert_eq!(extraction.record.number("Ctas_pCliente"), 0.0);
        assert_eq!(extraction.record.text("cartera_fechaApertura_reciente"), Some(""));
        assert!(extraction.record.number("quanto").is_nan());
    }
}
