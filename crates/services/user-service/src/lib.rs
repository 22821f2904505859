//! User Service Library
//!
//! This crate provides the record store drivers, the user repository built on
//! top of them and the user service consumed by the credential layer and the
//! HTTP gateway.

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;
pub mod store;

use std::sync::Arc;

use tracing::info;

use common::AppResult;

pub use crate::infra::connect_store;

use crate::config::UserServiceConfig;
use crate::repository::UserStore;
use crate::service::{UserManager, UserService};

/// Connect the configured backend and wire repository and service.
pub async fn build_user_service(config: &UserServiceConfig) -> AppResult<Arc<dyn UserService>> {
    let store = connect_store(&config.backend, &config.retry).await?;
    info!(backend = store.backend(), "Storage backend ready");

    let user_repo = Arc::new(UserStore::new(store));
    Ok(Arc::new(UserManager::new(user_repo)))
}
