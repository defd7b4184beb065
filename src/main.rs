use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use statusbridge::application::{
    KeyValueStore, PersistenceAdapter, RecoveryCoordinator, SinkGateway, SourceClient,
    SubscriptionRegistry, SyncService,
};
use statusbridge::domain::OwnerScopeId;
use statusbridge::infrastructure::{
    console_gateway::ConsoleGateway, fake_source::FakeSourceClient, http_source::HttpSourceClient,
    memory_store::InMemoryKvStore, sqlite_store::SqliteKvStore, telegram_gateway::TelegramGateway,
};
use statusbridge::interfaces::config::Config;
use statusbridge::interfaces::http_api::{build_router, ApiState};

#[derive(Parser, Debug)]
#[command(name = "statusbridge")]
struct Args {
    /// Path to config.yaml
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Do not talk to the real sink (console output only)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("statusbridge=info".parse().unwrap()),
        )
        .init();
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env"));
    }
    let args = Args::parse();

    // 1) load config
    let cfg = match Config::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // 2) build infra
    let store: Arc<dyn KeyValueStore> = match &cfg.database_url {
        Some(url) => match SqliteKvStore::new(url).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!("Failed to open store {url}: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("database_url not set, state will not survive restarts");
            Arc::new(InMemoryKvStore::new())
        }
    };

    let gateway: Arc<dyn SinkGateway> = if args.dry_run {
        tracing::warn!("--dry-run enabled: only console output");
        Arc::new(ConsoleGateway::new())
    } else if let Some(token) = &cfg.telegram_bot_token {
        Arc::new(TelegramGateway::new(token))
    } else {
        tracing::warn!("telegram_bot_token not set, falling back to console output");
        Arc::new(ConsoleGateway::new())
    };

    let source: Arc<dyn SourceClient> = match &cfg.source_base_url {
        Some(url) => Arc::new(HttpSourceClient::new(url.clone(), cfg.source_token.clone())),
        None => {
            tracing::warn!("source_base_url not set, reconciliation fetches will find nothing");
            Arc::new(FakeSourceClient::new())
        }
    };

    let persistence = PersistenceAdapter::new(store);
    let service = SyncService::new(
        SubscriptionRegistry::new(),
        gateway,
        persistence,
        cfg.cooldown(),
    );

    // 3) recover persisted watchers before accepting live traffic
    let recovery = RecoveryCoordinator::new(service.clone(), source);
    for scope in &cfg.scopes {
        recovery.recover_scope(&OwnerScopeId::new(scope.clone())).await;
    }

    // 4) serve
    let state = ApiState {
        service,
        api_token: cfg.api_token.clone(),
    };
    let addr = cfg.listen_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "listening");

    if let Err(e) = axum::serve(listener, build_router(state)).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
