use std::sync::Arc;

use clap::Parser;
use platform::event_bus::EventBus;
use platform::http::{make_router, HttpState};
use platform::lifecycle::LifecycleManager;
use platform::service_engine::{ServiceEngine, ServiceEngineLifecycle};
use platform::services::{AccountsService, AutomationService, DatalinkService, OracleService};
use platform_types::AuditEntry;
use utils::config::{CliArgs, Config};
use utils::context::AppContext;
use utils::storage::FileStore;
use utils::telemetry::{init_tracing, Metrics};

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let config = Config::load(cli)?;

    init_tracing(config.tracing_env_filter());

    let ctx = AppContext::new();
    let metrics = Arc::new(Metrics::new());
    let bus = EventBus::new(metrics.bus.clone());
    let lifecycle = Arc::new(LifecycleManager::new());

    let audit_path = config.data_dir.join("audit.jsonl");
    let audit = Arc::new(FileStore::<AuditEntry>::new(audit_path)?);

    let services: Vec<Arc<dyn ServiceEngine>> = vec![
        Arc::new(AccountsService::new()),
        Arc::new(DatalinkService::new(bus.clone())),
        Arc::new(AutomationService::new()),
        Arc::new(OracleService::new(
            config.runner_token_allowlist.clone(),
            config.oracle_http_allowlist.clone(),
            config.oracle_max_size,
        )),
    ];

    for service in &services {
        lifecycle.register(Arc::new(ServiceEngineLifecycle {
            service: service.clone(),
        }))?;
    }

    let state = HttpState::new(
        config.clone(),
        services,
        lifecycle.clone(),
        bus,
        metrics,
        audit,
    );

    ctx.rt.clone().block_on(async move {
        lifecycle.start().await?;

        let mut shutdown_signal = ctx.get_kill_receiver();
        let router = make_router(state, config.admin_bearer_token.clone());
        let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
        tracing::info!("platform server starting on {}", listener.local_addr()?);

        let ctrlc_ctx = ctx.clone();
        ctrlc::set_handler(move || ctrlc_ctx.kill()).ok();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal.recv().await.ok();
                tracing::info!("platform server shutting down");
            })
            .await?;

        lifecycle.stop().await.map_err(anyhow::Error::msg)?;

        anyhow::Ok(())
    })
}
