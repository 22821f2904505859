//! API Gateway Library
//!
//! The HTTP facade over the user and credential services. Storage, hashing
//! and lookups all live in the service crates; this crate only binds JSON,
//! calls them and maps their errors to responses.

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use tracing::info;

use auth_service_lib::build_auth_service;
use user_service_lib::build_user_service;

use crate::config::GatewayConfig;
use crate::routes::create_router;
use crate::state::AppState;

/// Connect storage, wire the services and serve HTTP until shutdown.
pub async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Connect the storage backend (fatal once retries are exhausted)
    let user_service = build_user_service(&config.user_service).await?;
    let auth_service = build_auth_service(user_service.clone());

    let state = AppState::new(auth_service, user_service);
    let app = create_router(state);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
