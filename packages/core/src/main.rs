use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;

use workflow_manager::accessor::WorkflowAccessor;
use workflow_manager::api::{self, health::HealthState, workflow::WorkflowApiState};
use workflow_manager::cache::IntervalCache;
use workflow_manager::cli::Cli;
use workflow_manager::config::Config;
use workflow_manager::db;
use workflow_manager::error::AppError;
use workflow_manager::logging::init_logging;
use workflow_manager::metrics::AppMetrics;
use workflow_manager::publisher::{BroadcastPublisher, SystemEventPublisher, WebhookPublisher};
use workflow_manager::repository::IntervalRepository;
use workflow_manager::retry::RetryingIntervalSource;
use workflow_manager::scheduler::IntervalCacheScheduler;
use workflow_manager::updater::IntervalCacheUpdater;
use workflow_manager::workflow::load_workflow;

/// Capacity of the in-process event channel used without an event bus.
const BROADCAST_CAPACITY: usize = 1024;

fn exit_on_error<T>(result: Result<T, AppError>) -> T {
    result.unwrap_or_else(|err| {
        tracing::error!("{}", err);
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = exit_on_error(
        Config::from_env()
            .and_then(|config| config.apply_cli(&cli))
            .map_err(AppError::Config),
    );
    tracing::info!("Service starting with config: {:?}", config);

    let workflow = Arc::new(exit_on_error(
        load_workflow(&config.workflow_definition_path).map_err(AppError::from),
    ));

    let pool = exit_on_error(
        db::create_pool(&config.database_url)
            .await
            .map_err(|err| AppError::Internal(format!("Failed to open backing store: {}", err))),
    );
    let repository = Arc::new(IntervalRepository::new(pool));

    let cache = Arc::new(IntervalCache::new());
    let accessor = Arc::new(WorkflowAccessor::new(workflow.clone(), cache.clone()));

    let source = Arc::new(RetryingIntervalSource::new(repository, config.retry_policy()));
    let updater = IntervalCacheUpdater::new(
        workflow.clone(),
        cache.clone(),
        source,
        config.initial_modification_time,
    );

    let publisher: Arc<dyn SystemEventPublisher + Send + Sync> = match &config.event_bus_url {
        Some(url) => {
            tracing::info!(
                "Publishing interval events to {} (timeout {:?})",
                url,
                config.event_bus_timeout()
            );
            Arc::new(exit_on_error(
                WebhookPublisher::new(url.clone(), config.event_bus_timeout())
                    .map_err(|err| AppError::Config(err.to_string())),
            ))
        }
        None => {
            tracing::info!("No EVENT_BUS_URL set; publishing interval events in-process");
            Arc::new(BroadcastPublisher::new(BROADCAST_CAPACITY))
        }
    };

    let metrics = Arc::new(exit_on_error(AppMetrics::new().map_err(|err| {
        AppError::Internal(format!("Failed to register metrics: {}", err))
    })));

    // ---- Cache synchronisation ----
    let shutdown = CancellationToken::new();
    let scheduler = IntervalCacheScheduler::new(
        updater,
        cache.clone(),
        publisher.clone(),
        metrics.clone(),
        config.scheduler_config(),
    );
    let health = HealthState::new(cache.clone(), scheduler.status());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    // ---- HTTP ----
    let state = Arc::new(WorkflowApiState {
        accessor,
        publisher,
        metrics,
        event_type: config.interval_event_type.clone(),
    });
    let app = api::create_router(state, health);

    let listener = exit_on_error(
        tokio::net::TcpListener::bind(&config.api_bind_addr)
            .await
            .map_err(|err| {
                AppError::Config(format!("Cannot bind {}: {}", config.api_bind_addr, err))
            }),
    );
    tracing::info!("Workflow manager listening on {}", config.api_bind_addr);

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await;

    shutdown.cancel();
    if let Err(err) = scheduler_handle.await {
        tracing::error!("Interval synchronisation task panicked: {}", err);
    }

    if let Err(err) = served {
        tracing::error!("HTTP server error: {}", err);
        std::process::exit(1);
    }

    tracing::info!("Workflow manager stopped");
}
