use hortensia::config::UnderwritingConfig;
use hortensia::error::AppError;
use hortensia::workflows::underwriting::UnderwritingService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Read the underwriting tables and load every model artifact they reference.
pub(crate) fn load_service(path: &Path) -> Result<Arc<UnderwritingService>, AppError> {
    let config = Arc::new(UnderwritingConfig::load(path)?);
    info!(
        config = %path.display(),
        installment_terms = config.installment_terms.len(),
        blacklisted_departments = config.business_rules.blacklisted_departments.len(),
        "underwriting tables loaded"
    );

    let service = UnderwritingService::from_config(config)?;
    Ok(Arc::new(service))
}
