use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use scheduling_cell::services::{
    locks::{DayLockProvider, InProcessDayLocks, RedisDayLocks},
    notifier::TracingNotifier,
    scheduling::ScheduleService,
    store::{InMemoryScheduleStore, ScheduleStore},
    supabase_store::SupabaseScheduleStore,
};
use shared_config::{AppConfig, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic schedule API server");

    let config = AppConfig::from_env();
    let service = Arc::new(build_service(&config).await);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(service).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(cors),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_service(config: &AppConfig) -> ScheduleService {
    let store: Arc<dyn ScheduleStore> = match config.schedule_store {
        StoreBackend::Supabase => {
            info!("Using Supabase schedule store at {}", config.supabase_url);
            Arc::new(SupabaseScheduleStore::new(config))
        }
        StoreBackend::Memory => {
            info!("Using in-memory schedule store");
            Arc::new(InMemoryScheduleStore::new())
        }
    };

    let locks: Arc<dyn DayLockProvider> = if config.is_redis_configured() {
        match RedisDayLocks::new(config).await {
            Ok(locks) => Arc::new(locks),
            Err(e) => {
                warn!("Redis day locks unavailable ({}), falling back to in-process locks", e);
                Arc::new(InProcessDayLocks::from_config(config))
            }
        }
    } else {
        info!("REDIS_URL not set, using in-process day locks");
        Arc::new(InProcessDayLocks::from_config(config))
    };

    ScheduleService::new(store, locks, Arc::new(TracingNotifier)).with_config(config)
}
