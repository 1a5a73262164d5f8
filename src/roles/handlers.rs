use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    roles::{dto::RoleRequest, repo_types::Role},
    state::AppState,
    users::services::require_admin,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route(
            "/roles/:id",
            get(get_role).patch(update_role).delete(delete_role),
        )
}

#[instrument(skip(state))]
pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    Ok(Json(Role::list(&state.db).await?))
}

#[instrument(skip(state))]
pub async fn get_role(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<Role>> {
    Role::find_by_id(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Role"))
}

#[instrument(skip(state, payload))]
pub async fn create_role(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppJson(payload): AppJson<RoleRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let name = payload.validated_name()?;
    require_admin(&state.db, caller).await?;
    let role = Role::create(&state.db, &name).await?;
    info!(role_id = role.id, name = %role.name, by = caller, "role created");
    Ok((StatusCode::CREATED, Json(role)))
}

#[instrument(skip(state, payload))]
pub async fn update_role(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<RoleRequest>,
) -> AppResult<Json<Role>> {
    let name = payload.validated_name()?;
    require_admin(&state.db, caller).await?;
    Role::rename(&state.db, id, &name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Role"))
}

/// Roles still assigned to users cannot be deleted (409).
#[instrument(skip(state))]
pub async fn delete_role(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    require_admin(&state.db, caller).await?;
    if !Role::delete(&state.db, id).await? {
        return Err(AppError::not_found("Role"));
    }
    info!(role_id = id, by = caller, "role deleted");
    Ok(StatusCode::NO_CONTENT)
}
