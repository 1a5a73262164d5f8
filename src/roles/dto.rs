use serde::Deserialize;

use crate::{error::AppError, extract::require_text};

/// Request body for creating or renaming a role.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
}

impl RoleRequest {
    /// Role names are stored lower-case.
    pub fn validated_name(&self) -> Result<String, AppError> {
        Ok(require_text("name", &self.name, Some(255))?.to_lowercase())
    }
}
