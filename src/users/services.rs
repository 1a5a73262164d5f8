use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    auth::password::{hash_password, verify_password, HashedPassword, SALT_BYTES},
    config::AppConfig,
    error::{AppError, AppResult},
    extract::require_text,
    roles::repo_types::{Role, ADMIN_ROLE, DEFAULT_ROLE},
    state::AppState,
    users::{
        dto::{RegisterRequest, UpdateProfileRequest},
        repo_types::{NewUser, ProfileChanges, User, UserWithRole},
    },
};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 255;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if email.chars().count() > MAX_NAME_LEN || !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    Ok(email)
}

pub(crate) fn check_new_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Validated registration fields (password still plaintext).
pub(crate) struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub password: String,
}

impl TryFrom<RegisterRequest> for Registration {
    type Error = AppError;

    fn try_from(req: RegisterRequest) -> AppResult<Self> {
        check_new_password(&req.password)?;
        Ok(Self {
            first_name: require_text("firstName", &req.first_name, Some(MAX_NAME_LEN))?,
            last_name: require_text("lastName", &req.last_name, Some(MAX_NAME_LEN))?,
            display_name: require_text("displayName", &req.display_name, Some(MAX_NAME_LEN))?,
            email: normalize_email(&req.email)?,
            password: req.password,
        })
    }
}

impl TryFrom<UpdateProfileRequest> for ProfileChanges {
    type Error = AppError;

    fn try_from(req: UpdateProfileRequest) -> AppResult<Self> {
        let text = |field: &str, value: Option<String>| {
            value
                .map(|v| require_text(field, &v, Some(MAX_NAME_LEN)))
                .transpose()
        };
        let changes = ProfileChanges {
            first_name: text("firstName", req.first_name)?,
            last_name: text("lastName", req.last_name)?,
            display_name: text("displayName", req.display_name)?,
            email: req.email.as_deref().map(normalize_email).transpose()?,
        };
        if changes.is_empty() {
            return Err(AppError::BadRequest("No fields to update".into()));
        }
        Ok(changes)
    }
}

/// PBKDF2 is CPU-bound; keep it off the async workers.
pub async fn hash_blocking(config: Arc<AppConfig>, password: String) -> AppResult<HashedPassword> {
    let hashed =
        tokio::task::spawn_blocking(move || hash_password(&config.password, &password, None))
            .await??;
    Ok(hashed)
}

pub async fn verify_blocking(
    config: Arc<AppConfig>,
    password: String,
    stored_hash: String,
    stored_salt: String,
) -> AppResult<bool> {
    let ok = tokio::task::spawn_blocking(move || {
        verify_password(&config.password, &password, &stored_hash, &stored_salt)
    })
    .await??;
    Ok(ok)
}

/// Runs a full derivation against a throwaway salt so that an unknown email
/// costs the same as a wrong password. Always `false`.
pub async fn verify_unknown_user(config: Arc<AppConfig>, password: String) -> AppResult<bool> {
    let salt = "0".repeat(SALT_BYTES * 2);
    verify_blocking(config, password, String::new(), salt).await
}

pub async fn register(state: &AppState, registration: Registration) -> AppResult<UserWithRole> {
    if User::find_by_email(&state.db, &registration.email).await?.is_some() {
        warn!(email = %registration.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let role = Role::find_by_name(&state.db, DEFAULT_ROLE)
        .await?
        .ok_or_else(|| anyhow::anyhow!("default role '{}' is missing", DEFAULT_ROLE))?;

    let password = hash_blocking(state.config.clone(), registration.password).await?;
    let user = User::create(
        &state.db,
        &NewUser {
            first_name: registration.first_name,
            last_name: registration.last_name,
            display_name: registration.display_name,
            email: registration.email,
            password,
            role_id: role.id,
        },
    )
    .await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    load_with_role(&state.db, user.id).await
}

/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> AppResult<User> {
    let email = normalize_email(email)?;
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        verify_unknown_user(state.config.clone(), password.to_string()).await?;
        warn!(email = %email, "login unknown email");
        return Err(invalid());
    };

    let ok = verify_blocking(
        state.config.clone(),
        password.to_string(),
        user.password_hash.clone(),
        user.password_salt.clone(),
    )
    .await?;
    if !ok {
        warn!(email = %email, user_id = user.id, "login invalid password");
        return Err(invalid());
    }
    Ok(user)
}

/// Verify the current password, then store a fresh salt + hash pair.
pub async fn change_password(
    state: &AppState,
    user_id: i64,
    current: &str,
    new_password: String,
) -> AppResult<()> {
    check_new_password(&new_password)?;
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let ok = verify_blocking(
        state.config.clone(),
        current.to_string(),
        user.password_hash,
        user.password_salt,
    )
    .await?;
    if !ok {
        warn!(user_id, "password change with wrong current password");
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let password = hash_blocking(state.config.clone(), new_password).await?;
    if !User::update_password(&state.db, user_id, &password).await? {
        return Err(AppError::not_found("User"));
    }
    info!(user_id, "password changed");
    Ok(())
}

pub async fn load_with_role(db: &PgPool, user_id: i64) -> AppResult<UserWithRole> {
    User::find_with_role(db, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn is_admin(db: &PgPool, user_id: i64) -> AppResult<bool> {
    Ok(User::find_with_role(db, user_id)
        .await?
        .map(|u| u.role_name == ADMIN_ROLE)
        .unwrap_or(false))
}

pub async fn require_admin(db: &PgPool, user_id: i64) -> AppResult<()> {
    if is_admin(db, user_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin role required".into()))
    }
}

/// Owners may act on their own resources; admins on anyone's.
pub async fn require_owner_or_admin(db: &PgPool, caller: i64, owner: i64) -> AppResult<()> {
    if caller == owner || is_admin(db, caller).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not allowed".into()))
    }
}

pub fn require_self(caller: i64, target: i64) -> AppResult<()> {
    if caller == target {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not allowed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    fn registration_request() -> RegisterRequest {
        RegisterRequest {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            display_name: "ada".into(),
            email: "  Ada@Example.COM ".into(),
            password: "correct-password".into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.io"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("spaces in@b.io"));
        assert_eq!(normalize_email(" A@B.IO ").unwrap(), "a@b.io");
        assert!(normalize_email(&format!("{}@b.io", "x".repeat(260))).is_err());
    }

    #[test]
    fn registration_is_normalized() {
        let reg = Registration::try_from(registration_request()).unwrap();
        assert_eq!(reg.first_name, "Ada");
        assert_eq!(reg.email, "ada@example.com");
    }

    #[test]
    fn registration_rejects_short_password_and_blank_names() {
        let mut req = registration_request();
        req.password = "short".into();
        assert!(Registration::try_from(req).is_err());

        let mut req = registration_request();
        req.last_name = "   ".into();
        let err = Registration::try_from(req).err().unwrap();
        assert_eq!(err.to_string(), "lastName must not be empty");
    }

    #[test]
    fn profile_changes_require_something() {
        assert!(ProfileChanges::try_from(UpdateProfileRequest::default()).is_err());
        let changes = ProfileChanges::try_from(UpdateProfileRequest {
            display_name: Some(" new name ".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(changes.display_name.as_deref(), Some("new name"));
        assert!(changes.email.is_none());
    }

    #[test]
    fn self_check() {
        assert!(require_self(1, 1).is_ok());
        assert!(require_self(1, 2).is_err());
    }

    #[tokio::test]
    async fn blocking_hash_then_verify_end_to_end() {
        let state = AppState::fake();
        let stored = hash_blocking(state.config.clone(), "correct-password".into())
            .await
            .unwrap();

        let ok = verify_blocking(
            state.config.clone(),
            "correct-password".into(),
            stored.hash.clone(),
            stored.salt.clone(),
        )
        .await
        .unwrap();
        assert!(ok);

        let wrong = verify_blocking(
            state.config.clone(),
            "wrong-password".into(),
            stored.hash.clone(),
            stored.salt.clone(),
        )
        .await
        .unwrap();
        assert!(!wrong);

        assert!(!verify_unknown_user(state.config.clone(), "correct-password".into())
            .await
            .unwrap());

        // Same pair verifies synchronously too.
        assert!(verify_password(&state.config.password, "correct-password", &stored.hash, &stored.salt).unwrap());
    }
}
