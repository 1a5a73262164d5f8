use serde::Deserialize;

use crate::{error::AppError, extract::require_text};

const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostFilter {
    #[serde(alias = "userId")]
    pub user_id: Option<i64>,
}

/// Validated post fields.
#[derive(Debug, PartialEq, Eq)]
pub struct PostFields {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl CreatePostRequest {
    pub fn validate(&self) -> Result<(String, String), AppError> {
        Ok((
            require_text("title", &self.title, Some(MAX_TITLE_LEN))?,
            require_text("body", &self.body, None)?,
        ))
    }
}

impl UpdatePostRequest {
    pub fn validate(&self) -> Result<PostFields, AppError> {
        let fields = PostFields {
            title: self
                .title
                .as_deref()
                .map(|t| require_text("title", t, Some(MAX_TITLE_LEN)))
                .transpose()?,
            body: self
                .body
                .as_deref()
                .map(|b| require_text("body", b, None))
                .transpose()?,
        };
        if fields.title.is_none() && fields.body.is_none() {
            return Err(AppError::BadRequest("No fields to update".into()));
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_title_and_body() {
        let ok = CreatePostRequest { title: " Hello ".into(), body: "World".into() };
        assert_eq!(ok.validate().unwrap(), ("Hello".to_string(), "World".to_string()));
        let no_body = CreatePostRequest { title: "Hello".into(), body: " ".into() };
        assert!(no_body.validate().is_err());
        let long_title = CreatePostRequest { title: "t".repeat(256), body: "b".into() };
        assert!(long_title.validate().is_err());
    }

    #[test]
    fn update_needs_at_least_one_field() {
        assert!(UpdatePostRequest::default().validate().is_err());
        let only_body = UpdatePostRequest { title: None, body: Some("new".into()) };
        assert_eq!(
            only_body.validate().unwrap(),
            PostFields { title: None, body: Some("new".into()) }
        );
    }
}
