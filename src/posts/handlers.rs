use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    comments::repo_types::Comment,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery, Pagination},
    posts::{
        dto::{CreatePostRequest, PostFilter, UpdatePostRequest},
        repo_types::Post,
    },
    state::AppState,
    users::services::require_owner_or_admin,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/posts/:id/comments", get(list_post_comments))
}

async fn load(state: &AppState, id: i64) -> AppResult<Post> {
    Post::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    AppQuery(p): AppQuery<Pagination>,
    AppQuery(filter): AppQuery<PostFilter>,
) -> AppResult<Json<Vec<Post>>> {
    let (limit, offset) = p.clamped();
    Ok(Json(Post::list(&state.db, filter.user_id, limit, offset).await?))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<Post>> {
    Ok(Json(load(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let (title, body) = payload.validate()?;
    let post = Post::create(&state.db, user_id, &title, &body).await?;
    info!(post_id = post.id, user_id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// Only the author may edit.
#[instrument(skip(state, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let fields = payload.validate()?;
    let post = load(&state, id).await?;
    if post.user_id != user_id {
        return Err(AppError::Forbidden("Only the author can edit this post".into()));
    }
    Post::update(&state.db, id, fields.title.as_deref(), fields.body.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Post"))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    let post = load(&state, id).await?;
    require_owner_or_admin(&state.db, user_id, post.user_id).await?;
    if !Post::delete(&state.db, id).await? {
        return Err(AppError::not_found("Post"));
    }
    info!(post_id = id, by = user_id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_post_comments(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppQuery(p): AppQuery<Pagination>,
) -> AppResult<Json<Vec<Comment>>> {
    load(&state, id).await?;
    let (limit, offset) = p.clamped();
    Ok(Json(Comment::list_by_post(&state.db, id, limit, offset).await?))
}
