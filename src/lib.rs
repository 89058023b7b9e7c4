// SRDT Gateway - orchestration API for a French labor-law assistant

pub mod config;
pub mod db;
pub mod history;   // Client-side conversation history model
pub mod inference; // External anonymize/search/rerank/generate API
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}

/// Listen on `host:port`; `host` may be a name or a bare IPv6 address
pub async fn bind_listener(server: &config::ServerConfig) -> std::io::Result<tokio::net::TcpListener> {
    let host = server.host.trim_start_matches('[').trim_end_matches(']');
    tokio::net::TcpListener::bind((host, server.port)).await
}
