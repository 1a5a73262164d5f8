use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    comments::{
        dto::{validate_body, CreateCommentRequest, UpdateCommentRequest},
        repo_types::Comment,
    },
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    posts::repo_types::Post,
    state::AppState,
    users::services::require_owner_or_admin,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/comments", post(create_comment)).route(
        "/comments/:id",
        get(get_comment).patch(update_comment).delete(delete_comment),
    )
}

async fn load(state: &AppState, id: i64) -> AppResult<Comment> {
    Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment"))
}

#[instrument(skip(state))]
pub async fn get_comment(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<Comment>> {
    Ok(Json(load(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let body = validate_body(&payload.body)?;
    Post::find_by_id(&state.db, payload.post_id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    let comment = Comment::create(&state.db, payload.post_id, user_id, &body).await?;
    info!(comment_id = comment.id, post_id = comment.post_id, user_id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state, payload))]
pub async fn update_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let body = validate_body(&payload.body)?;
    let comment = load(&state, id).await?;
    if comment.user_id != user_id {
        return Err(AppError::Forbidden("Only the author can edit this comment".into()));
    }
    Comment::update_body(&state.db, id, &body)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Comment"))
}

#[instrument(skip(state))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    let comment = load(&state, id).await?;
    require_owner_or_admin(&state.db, user_id, comment.user_id).await?;
    if !Comment::delete(&state.db, id).await? {
        return Err(AppError::not_found("Comment"));
    }
    info!(comment_id = id, by = user_id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
