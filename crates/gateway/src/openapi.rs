//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::handlers::auth_handler::{LoginRequest, MessageResponse, RegisterRequest};
use crate::handlers::health_handler::HealthResponse;
use domain::UserResponse;

/// API documentation struct.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth_handler::register,
        crate::handlers::auth_handler::login,
        crate::handlers::user_handler::list_users,
        crate::handlers::user_handler::search,
        crate::handlers::health_handler::health_check,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            MessageResponse,
            UserResponse,
            HealthResponse,
        )
    ),
    tags(
        (name = "Authentication", description = "Registration and login"),
        (name = "Users", description = "User listing and search"),
        (name = "Health", description = "Storage backend liveness"),
    )
)]
pub struct ApiDoc;
