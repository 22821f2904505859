//! User handlers.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use common::AppResult;
use domain::UserResponse;

use crate::state::AppState;

/// Search parameters; `username` takes precedence over `id`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Exact username
    pub username: Option<String>,
    /// User identifier
    pub id: Option<String>,
}

/// Search result: the matching user, or `{}` when no criterion was given
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Found(UserResponse),
    Empty {},
}

/// Create user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/search", get(search))
}

/// List all users
#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "List of all users", body = Vec<UserResponse>),
        (status = 500, description = "Storage error")
    )
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.user_service.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Find one user by username or id
#[utoipa::path(
    get,
    path = "/search",
    tag = "Users",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching user, or an empty object without criteria", body = UserResponse),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "User not found")
    )
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let username = params.username.filter(|u| !u.is_empty());
    let id = params.id.filter(|i| !i.is_empty());

    let user = match (username, id) {
        (Some(username), _) => state.user_service.get_user_by_username(&username).await?,
        (None, Some(id)) => state.user_service.get_user(&id).await?,
        (None, None) => return Ok(Json(SearchResponse::Empty {})),
    };

    Ok(Json(SearchResponse::Found(UserResponse::from(user))))
}
