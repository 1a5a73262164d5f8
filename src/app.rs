use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state, map_response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    comments,
    error::AppError,
    middleware::{
        hpp::hpp, rate_limit::rate_limit, sanitize::sanitize, security_headers::security_headers,
    },
    posts, roles,
    state::AppState,
    users,
};

async fn welcome() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "Welcome to the Blog API",
    }))
}

async fn undefined_route() -> AppError {
    AppError::NotFound("undefined route".into())
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(e)) => {
            warn!(error = %e, "CORS_ORIGIN is not a valid header value; allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes;
    let cors = cors_layer(state.config.cors_origin.as_deref());

    let api = Router::new()
        .merge(users::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(roles::router())
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit));

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .fallback(undefined_route)
        .with_state(state)
        .layer(from_fn(hpp))
        .layer(from_fn_with_state(body_limit, sanitize))
        // Raw JSON bodies are bounded by `sanitize`; escaping may grow them
        // past the limit, so extractors must not count them again.
        .layer(DefaultBodyLimit::disable())
        .layer(map_response(security_headers))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "4000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
