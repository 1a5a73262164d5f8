use serde::Deserialize;

use crate::{error::AppError, extract::require_text};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: i64,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub body: String,
}

pub fn validate_body(body: &str) -> Result<String, AppError> {
    require_text("body", body, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_reads_post_id() {
        let req: CreateCommentRequest =
            serde_json::from_str(r#"{"postId": 12, "body": "nice"}"#).unwrap();
        assert_eq!(req.post_id, 12);
        assert_eq!(validate_body(&req.body).unwrap(), "nice");
        assert!(validate_body("\n\t ").is_err());
    }
}
