//! Credit bureau report extraction.
//!
//! [`BureauExtractor::parse`] flattens an XML report into a single [`FeatureRecord`] and runs the
//! derived passes over it. A report that cannot be read yields `None`; callers continue without
//! bureau features.

mod derived;
mod parser;

use crate::workflows::features::FeatureRecord;
use std::fmt;
use tracing::{debug, warn};

/// Which engine the report is extracted for; a handful of derived ratios differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BureauFlavor {
    Regular,
    NoCreditLife,
}

impl fmt::Display for BureauFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BureauFlavor::Regular => f.write_str("regular"),
            BureauFlavor::NoCreditLife => f.write_str("no_credit_life"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BureauParseError {
    #[error("bureau report is not well-formed XML: {0}")]
    Malformed(#[from] roxmltree::Error),
    #[error("bureau report has no Informe element")]
    MissingReport,
}

#[derive(Debug, Clone)]
pub struct BureauExtractor {
    flavor: BureauFlavor,
    competitor_nits: Vec<u64>,
}

impl BureauExtractor {
    pub fn new(flavor: BureauFlavor, competitor_nits: Vec<u64>) -> Self {
        Self {
            flavor,
            competitor_nits,
        }
    }

    pub fn flavor(&self) -> BureauFlavor {
        self.flavor
    }

    /// Flatten and enrich a report, or `None` when it cannot be read.
    pub fn parse(&self, xml: &str) -> Option<FeatureRecord> {
        match self.try_parse(xml) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(flavor = %self.flavor, error = %err, "ignoring unreadable bureau report");
                None
            }
        }
    }

    pub fn try_parse(&self, xml: &str) -> Result<FeatureRecord, BureauParseError> {
        let parser::Extraction {
            mut record,
            inquiries,
        } = parser::extract(xml)?;
        derived::apply(&mut record, self.flavor, &self.competitor_nits, inquiries);
        debug!(flavor = %self.flavor, fields = record.len(), "bureau features extracted");
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Informes>
  <Informe fechaConsulta="2024-05-10T09:15:00" identificacionDigitada="1012345678">
    <NaturalNacional>
      <Identificacion ciudad="MEDELLIN" departamento="ANTIOQUIA" genero="4"/>
    </NaturalNacional>
    <Score puntaje="712">
      <Razon codigo="00042"/>
      <Razon codigo="00007"/>
    </Score>
    <CuentaAhorro fechaApertura="2019-02-01" sector="1"/>
    <CuentaAhorro fechaApertura="2021-07-15" sector="2"/>
    <CuentaCartera sector="1" fechaApertura="2023-01-15" fechaVencimiento="2026-01-15">
      <Caracteristicas tipoContrato="1" tipoObligacion="2"/>
      <Valores>
        <Valor cuota="120" totalCuotas="24" cuotasCanceladas="12" saldoActual="1500" saldoMora="0" valorInicial="3000"/>
      </Valores>
      <Estados>
        <EstadoCuenta codigo="01"/>
      </Estados>
    </CuentaCartera>
    <CuentaCartera sector="3" fechaApertura="2023-11-02" fechaVencimiento="2025-05-02">
      <Caracteristicas tipoContrato="2" tipoObligacion="2"/>
      <Valores>
        <Valor cuota="80" totalCuotas="12" cuotasCanceladas="3" saldoActual="-1" saldoMora="40.5" valorInicial="900"/>
      </Valores>
      <Estados>
        <EstadoCuenta codigo="02"/>
        <EstadoCuenta codigo="13"/>
      </Estados>
    </CuentaCartera>
    <TarjetaCredito fechaApertura="2022-06-30">
      <Valores>
        <Valor saldoActual="600" saldoMora="0" cupoTotal="2000"/>
      </Valores>
      <Estados>
        <EstadoCuenta codigo="06"/>
        <EstadoCuenta codigo="01"/>
      </Estados>
    </TarjetaCredito>
    <Consulta tipoCuenta="SFI" cantidad="2" nitSuscriptor="901344787" fecha="2024-05-02"/>
    <Consulta tipoCuenta="COM" cantidad="1" nitSuscriptor="800100200" fecha="2024-02-11"/>
    <productosValores valor1="1800" valor1smlv="1.4"/>
    <InfoAgregada>
      <Resumen>
        <Principales creditoVigentes="2" creditosCerrados="1" creditosActualesNegativos="1" antiguedadDesde="2019-02-01" consultadasUlt6meses="3"/>
        <Saldos saldoTotalEnMora="40" cuotaMensual="200" saldoTotal="2100">
          <Mes saldoTotalMora="40" saldoTotal="2100"/>
          <Mes saldoTotalMora="0" saldoTotal="2000"/>
          <Mes saldoTotalMora="0" saldoTotal="1900"/>
        </Saldos>
        <Comportamiento>
          <Mes comportamiento="N" cantidad="2"/>
          <Mes comportamiento="1" cantidad="1"/>
        </Comportamiento>
      </Resumen>
      <ComposicionPortafolio>
        <TipoCuenta tipo="AHO" cantidad="2">
          <Estado codigo="Activa" cantidad="1"/>
          <Estado codigo="Cancelada" cantidad="1"/>
        </TipoCuenta>
        <TipoCuenta tipo="CAB" cantidad="2">
          <Estado codigo="Al dia" cantidad="1"/>
        </TipoCuenta>
      </ComposicionPortafolio>
      <EvolucionDeuda>
        <AnalisisPromedio cuota="180" porcentajeUso="30" saldo="2000"/>
        <Trimestres>
          <Trimestre cuota="200" cupoTotal="2000" moraMaxima="M 30" saldo="2100" porcentajeUso="40"/>
          <Trimestre cuota="180" cupoTotal="2000" moraMaxima="M 0" saldo="1800" porcentajeUso="30"/>
          <Trimestre cuota="150" cupoTotal="2000" moraMaxima="M 0" saldo="1500" porcentajeUso="30"/>
        </Trimestres>
      </EvolucionDeuda>
    </InfoAgregada>
    <InfoAgregadaMicrocredito>
      <Resumen>
        <PerfilGeneral>
          <CreditosCerrados sectorTelcos="1" totalComoPrincipal="3"/>
        </PerfilGeneral>
        <VectorSaldosYMoras>
          <SaldosYMoras saldoDeudaTotalMora="10" saldoDeudaTotal="100" numCreditosMayorIgual60="0" totalCuentasMora="1" numCreditos30="1"/>
        </VectorSaldosYMoras>
      </Resumen>
      <EvolucionDeuda>
        <EvolucionDeudaSector codSector="4">
          <EvolucionDeudaTipoCuenta tipoCuenta="CTC">
            <EvolucionDeudaValorTrimestre saldoMora="10"/>
            <EvolucionDeudaValorTrimestre saldoMora="20"/>
            <EvolucionDeudaValorTrimestre saldoMora="30"/>
            <EvolucionDeudaValorTrimestre saldoMora="99"/>
          </EvolucionDeudaTipoCuenta>
        </EvolucionDeudaSector>
      </EvolucionDeuda>
    </InfoAgregadaMicrocredito>
  </Informe>
</Informes>"#;
