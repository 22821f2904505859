//! Auth Service Library
//!
//! This crate provides the credential layer: registration hashes the password
//! before the user reaches storage, login verifies against the stored hash.

pub mod service;

use std::sync::Arc;

use user_service_lib::service::UserService;

use crate::service::{AuthService, Authenticator};

/// Build the credential layer over an existing user service.
pub fn build_auth_service(users: Arc<dyn UserService>) -> Arc<dyn AuthService> {
    Arc::new(Authenticator::new(users))
}
