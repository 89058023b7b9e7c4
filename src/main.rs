use clap::Parser;
use srdt_gateway::{
    config::Config,
    db::{self, ConversationStore},
    inference::HttpInferenceClient,
    llm::ModelCatalog,
    middleware::SessionVerifier,
    pipeline::{Pipeline, PipelineSettings},
    routes::create_router,
    utils::init_tracing,
    bind_listener, AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "srdt-gateway", version, about = "Labor-law assistant API gateway")]
struct Cli {
    /// Overrides PORT
    #[arg(long)]
    port: Option<u16>,

    /// Start without applying pending database migrations
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    info!("Configuration loaded: {:?}", config.server);

    // Connect to database, when configured
    let pool = db::create_pool(&config.database).await?;
    if let Some(pool) = &pool {
        if cli.skip_migrations {
            info!("Skipping database migrations");
        } else {
            db::run_migrations(pool).await?;
        }
    }

    // No overall timeout: generation streams stay open for the whole answer
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let pipeline = Pipeline::new(
        Arc::new(HttpInferenceClient::new(http.clone(), &config.inference)),
        ModelCatalog::from_config(&config.models),
        PipelineSettings {
            answer_type: config.pipeline.answer_type,
            agreements_site_url: config.agreements.site_url.clone(),
        },
    );

    // Create shared state
    let state = AppState {
        sessions: SessionVerifier::new(
            &config.auth.session_secret,
            config.auth.allowed_email_domains.clone(),
        ),
        conversations: pool.clone().map(ConversationStore::new),
        pipeline,
        http,
        config: config.clone(),
    };

    let app = create_router(state);

    // Start server
    let listener = bind_listener(&config.server).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    if let Some(pool) = pool {
        db::close_pool(&pool, Duration::from_secs(5)).await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
