use std::borrow::Cow;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::error::AppError;

/// Neutralize HTML markup in user input.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['<', '>']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Escape every string value in a JSON document. Object keys are left alone.
pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Cow::Owned(escaped) = escape_html(s) {
                *s = escaped;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        Value::Object(map) => map.values_mut().for_each(sanitize_value),
        _ => {}
    }
}

pub fn sanitize_query(query: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k, escape_html(&v).into_owned())),
        )
        .finish()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Rewrites the query string and any JSON body with HTML-escaped strings.
/// Bodies larger than `limit` are rejected with 413.
pub async fn sanitize(
    State(limit): State<usize>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    if let Some(query) = parts.uri.query().filter(|q| q.contains(['<', '>', '%'])) {
        let cleaned = sanitize_query(query);
        parts.uri = super::replace_query(&parts.uri, &cleaned)?;
    }

    if !is_json(&parts.headers) {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    }

    let raw = to_bytes(body, limit)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;

    // Malformed JSON passes through; the handler's extractor reports it.
    let cleaned = match serde_json::from_slice::<Value>(&raw) {
        Ok(mut value) => {
            sanitize_value(&mut value);
            Bytes::from(serde_json::to_vec(&value).map_err(anyhow::Error::from)?)
        }
        Err(_) => raw,
    };
    parts.headers.remove(header::CONTENT_LENGTH);

    Ok(next.run(Request::from_parts(parts, Body::from(cleaned))).await)
}
