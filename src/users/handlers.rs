use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{AuthUser, JwtKeys},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery, Pagination},
    roles::repo_types::Role,
    state::AppState,
    users::{
        dto::{
            AuthResponse, ChangePasswordRequest, ChangeRoleRequest, LoginRequest, PublicUser,
            RefreshRequest, RegisterRequest, UpdateProfileRequest,
        },
        repo_types::{ProfileChanges, User},
        services::{self, Registration},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/refresh", post(refresh))
        .route("/users/me", get(get_me))
}

pub fn crud_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(register))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/users/:id/password", patch(change_password))
        .route("/users/:id/role", patch(change_role))
}

fn issue_tokens(state: &AppState, user: PublicUser) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    Ok(AuthResponse {
        access_token: keys.sign_access(user.id)?,
        refresh_token: keys.sign_refresh(user.id)?,
        user,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let registration = Registration::try_from(payload)?;
    let user = services::register(&state, registration).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = services::authenticate(&state, &payload.email, &payload.password).await?;
    let public = services::load_with_role(&state.db, user.id).await?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(issue_tokens(&state, public.into())?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let user_id = keys
        .verify_refresh(&payload.refresh_token)
        .and_then(|claims| Ok(claims.sub.parse::<i64>()?))
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user = User::find_with_role(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    Ok(Json(issue_tokens(&state, user.into())?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = User::find_with_role(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AppQuery(p): AppQuery<Pagination>,
) -> AppResult<Json<Vec<PublicUser>>> {
    let (limit, offset) = p.clamped();
    let users = User::list_with_roles(&state.db, limit, offset).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<PublicUser>> {
    Ok(Json(services::load_with_role(&state.db, id).await?.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    services::require_self(caller, id)?;
    let changes = ProfileChanges::try_from(payload)?;
    User::update_profile(&state.db, id, &changes)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(services::load_with_role(&state.db, id).await?.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    services::require_self(caller, id)?;
    services::change_password(&state, id, &payload.current_password, payload.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn change_role(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<ChangeRoleRequest>,
) -> AppResult<Json<PublicUser>> {
    services::require_admin(&state.db, caller).await?;
    Role::find_by_id(&state.db, payload.role_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Unknown role".into()))?;
    if !User::update_role(&state.db, id, payload.role_id).await? {
        return Err(AppError::not_found("User"));
    }
    info!(user_id = id, role_id = payload.role_id, by = caller, "user role changed");
    Ok(Json(services::load_with_role(&state.db, id).await?.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    services::require_owner_or_admin(&state.db, caller, id).await?;
    if !User::delete(&state.db, id).await? {
        return Err(AppError::not_found("User"));
    }
    info!(user_id = id, by = caller, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
