use crate::cli::ServeArgs;
use crate::infra::{load_stores, AppState};
use crate::routes::with_kpi_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use kpi_tracker::config::AppConfig;
use kpi_tracker::error::AppError;
use kpi_tracker::kpi::{KpiApi, SystemClock};
use kpi_tracker::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stores = load_stores(config.kpi.seed_path.as_deref())?;
    let clock = Arc::new(SystemClock::new(config.kpi.utc_offset()?));
    let api = KpiApi::new(stores.bundle(), &config.kpi, clock);

    if config.kpi.scheduler_enabled {
        let jobs = api.scheduler.start_all().await?;
        for job in &jobs {
            info!(job = %job.name, next_run = ?job.next_run, "scheduler job armed");
        }
    }

    let app = with_kpi_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "kpi tracker ready");

    axum::serve(listener, app).await?;
    Ok(())
}
