//! HTTP parameter pollution guard: `?sort=a&sort=b` reaches handlers as `?sort=b`.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;

/// Keep the last value of each repeated key, in first-seen key order.
pub fn collapse_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value.into_owned(),
            None => pairs.push((key.into_owned(), value.into_owned())),
        }
    }
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn has_duplicates(query: &str) -> bool {
    let mut seen = Vec::new();
    url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| {
        if seen.contains(&key) {
            true
        } else {
            seen.push(key);
            false
        }
    })
}

pub async fn hpp(mut req: Request, next: Next) -> Result<Response, AppError> {
    if let Some(query) = req.uri().query().filter(|q| has_duplicates(q)) {
        let collapsed = collapse_query(query);
        let uri = super::replace_query(req.uri(), &collapsed)?;
        *req.uri_mut() = uri;
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_value_wins() {
        assert_eq!(collapse_query("sort=title&limit=5&sort=id"), "sort=id&limit=5");
    }

    #[test]
    fn untouched_without_duplicates() {
        assert!(!has_duplicates("a=1&b=2"));
        assert!(has_duplicates("a=1&b=2&a=3"));
        assert_eq!(collapse_query("a=1&b=2"), "a=1&b=2");
    }
}
