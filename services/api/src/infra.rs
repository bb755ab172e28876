use kpi_tracker::error::AppError;
use kpi_tracker::kpi::domain::KpiEntry;
use kpi_tracker::kpi::memory::{InMemoryStores, KpiSeed, SeedError};
use kpi_tracker::kpi::repository::EntryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Empty stores when no seed is configured.
pub(crate) fn load_stores(seed_path: Option<&Path>) -> Result<InMemoryStores, AppError> {
    let Some(path) = seed_path else {
        info!("no seed configured, starting with empty stores");
        return Ok(InMemoryStores::default());
    };

    let seed = KpiSeed::from_path(path)?;
    info!(
        path = %path.display(),
        templates = seed.templates.len(),
        members = seed.members.len(),
        "seed loaded"
    );
    Ok(InMemoryStores::seeded(seed)?)
}

/// Loads a JSON array of previously exported entries.
pub(crate) async fn import_entries(
    stores: &InMemoryStores,
    path: &Path,
) -> Result<usize, AppError> {
    let file = File::open(path)?;
    let entries: Vec<KpiEntry> = serde_json::from_reader(file).map_err(SeedError::from)?;
    let imported = stores
        .entries
        .insert_many(entries)
        .await
        .map_err(SeedError::from)?;
    info!(path = %path.display(), imported, "entries imported");
    Ok(imported)
}
