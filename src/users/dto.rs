use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo_types::UserWithRole;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRoleRequest {
    pub role_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RoleRef {
    pub id: i64,
    pub name: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub role: RoleRef,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserWithRole> for PublicUser {
    fn from(u: UserWithRole) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            display_name: u.display_name,
            email: u.email,
            role: RoleRef {
                id: u.role_id,
                name: u.role_name,
            },
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Response returned after login or refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserWithRole {
        UserWithRole {
            id: 3,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            display_name: "ada".into(),
            email: "ada@example.com".into(),
            role_id: 2,
            role_name: "user".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn public_user_serializes_camel_case_without_secrets() {
        let json = serde_json::to_value(PublicUser::from(sample())).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["displayName"], "ada");
        assert_eq!(json["role"]["name"], "user");
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        let text = json.to_string();
        assert!(!text.contains("password"));
        assert!(!text.contains("salt"));
    }

    #[test]
    fn register_request_reads_camel_case() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"firstName":"A","lastName":"B","displayName":"ab","email":"a@b.io","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(req.display_name, "ab");
    }
}
