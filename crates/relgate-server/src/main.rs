use std::sync::Arc;

use clap::Parser;
use relgate_server::auth;
use relgate_server::cli::{Cli, Command};
use relgate_server::config::{AppConfig, LogFormat, StoreBackend};
use relgate_server::grpc::DecisionServiceImpl;
use relgate_server::health::create_health_service;
use relgate_server::metrics::Metrics;
use relgate_server::middleware::auth::AdminAuthState;
use relgate_server::proto::relgate::v1::decision_service_server::DecisionServiceServer;
use relgate_server::rest;
use relgate_server::service::{Backend, RelgateService};
use relgate_server::shadow::{LogSink, ShadowRecorder};
use relgate_server::telemetry;
use relgate_storage::{InMemoryStore, KeySpace, RedisStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const MAX_GRPC_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MB

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    // OTel layer is typed to bare Registry, so it must be added first.
    let registry = tracing_subscriber::registry();

    #[cfg(feature = "telemetry")]
    let otel_provider = telemetry::init_telemetry(&config.tracing);

    #[cfg(feature = "telemetry")]
    let otel_layer = otel_provider.as_ref().map(telemetry::make_otel_layer);

    #[cfg(feature = "telemetry")]
    let registry = registry.with(otel_layer);

    #[cfg(not(feature = "telemetry"))]
    let _ = telemetry::init_telemetry(&config.tracing);

    let registry = registry.with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            registry.with(fmt_layer).init();
        }
    }

    #[cfg(feature = "telemetry")]
    if otel_provider.is_some() {
        tracing::info!("OpenTelemetry tracing enabled");
    }

    // Keep the provider alive for the process lifetime.
    #[cfg(feature = "telemetry")]
    if let Some(provider) = otel_provider {
        std::mem::forget(provider);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::CreateAdminKey) => run_create_admin_key(),
        Some(Command::Serve) | None => {
            init_logging(&config);
            run_serve(config).await
        }
    }
}

fn run_check_config(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Configuration is valid");
    println!("  gRPC:               {}", config.grpc_addr());
    println!("  REST:               {}", config.rest_addr());
    println!("  Store backend:      {:?}", config.store.backend);
    println!("  Store timeout:      {:?}", config.store_timeout());
    println!("  Poll interval:      {:?}", config.poll_interval());
    println!("  Revocation check:   {}", config.decision.revocation_check_enabled);
    println!("  Shadow mode:        {}", config.decision.shadow_mode_enabled);
    println!("  Default policy:     {:?}", config.decision.default_policy);
    println!("  ACL strategy:       {:?}", config.decision.acl_strategy);
    println!(
        "  Admin auth:         {}",
        if config.admin.key_hash.is_some() { "key" } else { "open" }
    );
    Ok(())
}

fn run_create_admin_key() -> Result<(), Box<dyn std::error::Error>> {
    let (full_key, secret) = auth::generate_admin_key();
    let key_hash = auth::hash_secret(&secret)?;

    println!("Admin key created");
    println!("  Admin key: {full_key}");
    println!("  Key hash:  {key_hash}");
    println!();
    println!("Set [admin].key_hash (or RELGATE_ADMIN_KEY_HASH) to the hash.");
    println!("Store the key securely; it will not be shown again.");
    Ok(())
}

async fn run_serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        grpc_addr = %config.grpc_addr(),
        rest_addr = %config.rest_addr(),
        backend = ?config.store.backend,
        "starting relgate"
    );

    match config.store.backend {
        StoreBackend::Memory => {
            let store = match config.store.seed_file {
                Some(ref path) => InMemoryStore::from_seed_file(path)?,
                None => {
                    tracing::warn!("memory backend without seed file; starting empty");
                    InMemoryStore::new()
                }
            };
            serve(config, Arc::new(store)).await
        }
        StoreBackend::Redis => {
            let keys = KeySpace::new(config.store.key_prefix.clone());
            let store = RedisStore::connect(&config.store.redis_url, keys).await?;
            serve(config, Arc::new(store)).await
        }
    }
}

async fn serve<B: Backend>(
    config: AppConfig,
    backend: Arc<B>,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new());

    let shadow = if config.decision.shadow_mode_enabled {
        let (recorder, _worker) =
            ShadowRecorder::spawn(config.shadow.queue_capacity, LogSink, Arc::clone(&metrics));
        tracing::info!(capacity = config.shadow.queue_capacity, "shadow mode enabled");
        Some(recorder)
    } else {
        None
    };

    let service = Arc::new(RelgateService::from_config(&config, backend, metrics, shadow).await?);

    let admin_auth = AdminAuthState::from_config(config.admin.key_hash.as_deref());
    if admin_auth.is_dev_mode() {
        tracing::warn!("no admin key hash configured; admin endpoints are unauthenticated");
    }

    let health_service = create_health_service::<B>().await;
    let decision_svc = DecisionServiceServer::new(DecisionServiceImpl::new(Arc::clone(&service)))
        .max_decoding_message_size(MAX_GRPC_MESSAGE_SIZE);

    let rest_router = rest::create_router(
        rest::AppState {
            service: Arc::clone(&service),
        },
        admin_auth,
    );

    let grpc_addr = config.grpc_addr().parse()?;
    let rest_addr: std::net::SocketAddr = config.rest_addr().parse()?;

    let (shutdown_tx, _) = watch::channel(());
    let shutdown_rx_rest = shutdown_tx.subscribe();
    let mut shutdown_rx_cache = shutdown_tx.subscribe();

    let coordinator = service.coordinator();
    let cache_task = tokio::spawn(async move {
        coordinator
            .run(async move {
                let _ = shutdown_rx_cache.changed().await;
            })
            .await;
    });

    tracing::info!(%grpc_addr, "gRPC server listening");
    tracing::info!(%rest_addr, "REST server listening");

    let grpc_server = tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(decision_svc)
        .serve_with_shutdown(grpc_addr, shutdown_signal(shutdown_tx));

    let rest_listener = tokio::net::TcpListener::bind(rest_addr).await?;
    let rest_server = axum::serve(rest_listener, rest_router).with_graceful_shutdown(async move {
        let mut rx = shutdown_rx_rest;
        let _ = rx.changed().await;
    });

    tokio::select! {
        result = grpc_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "gRPC server error");
            }
        }
        result = rest_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "REST server error");
            }
        }
    }

    cache_task.abort();
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { tracing::info!("received SIGINT"); }
                _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, using SIGINT only");
            let _ = ctrl_c.await;
            tracing::info!("received SIGINT");
        }
    }

    let _ = shutdown_tx.send(());
}
