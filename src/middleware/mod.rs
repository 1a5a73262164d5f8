pub mod hpp;
pub mod rate_limit;
pub mod sanitize;
pub mod security_headers;

use axum::http::Uri;

use crate::error::AppError;

pub(crate) fn replace_query(uri: &Uri, query: &str) -> Result<Uri, AppError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|_| AppError::BadRequest("malformed query string".into()))?,
    );
    Uri::from_parts(parts).map_err(|_| AppError::BadRequest("malformed query string".into()))
}
