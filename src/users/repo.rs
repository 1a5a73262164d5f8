use crate::auth::password::HashedPassword;
use crate::users::repo_types::{NewUser, ProfileChanges, User, UserWithRole};
use sqlx::PgPool;

const USER_COLUMNS: &str = "id, first_name, last_name, display_name, email, \
     password_hash, password_salt, role_id, created_at, updated_at";

const USER_WITH_ROLE_SELECT: &str = r#"
    SELECT u.id, u.first_name, u.last_name, u.display_name, u.email,
           u.role_id, r.name AS role_name, u.created_at, u.updated_at
    FROM users u
    JOIN roles r ON r.id = u.role_id
"#;

impl User {
    pub async fn find_by_id(db: &PgPool, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Find a user by (already normalized) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Load a user together with its role through an explicit join.
    pub async fn find_with_role(db: &PgPool, id: i64) -> Result<Option<UserWithRole>, sqlx::Error> {
        sqlx::query_as::<_, UserWithRole>(&format!("{} WHERE u.id = $1", USER_WITH_ROLE_SELECT))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_with_roles(
        db: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserWithRole>, sqlx::Error> {
        sqlx::query_as::<_, UserWithRole>(&format!(
            "{} ORDER BY u.id LIMIT $1 OFFSET $2",
            USER_WITH_ROLE_SELECT
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
    }

    /// Insert a user; hash and salt are written together.
    pub async fn create(db: &PgPool, new: &NewUser) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                (first_name, last_name, display_name, email, password_hash, password_salt, role_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.display_name)
        .bind(&new.email)
        .bind(&new.password.hash)
        .bind(&new.password.salt)
        .bind(new.role_id)
        .fetch_one(db)
        .await
    }

    pub async fn update_profile(
        db: &PgPool,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                first_name   = COALESCE($2, first_name),
                last_name    = COALESCE($3, last_name),
                display_name = COALESCE($4, display_name),
                email        = COALESCE($5, email),
                updated_at   = now()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(changes.first_name.as_deref())
        .bind(changes.last_name.as_deref())
        .bind(changes.display_name.as_deref())
        .bind(changes.email.as_deref())
        .fetch_optional(db)
        .await
    }

    /// Replace the stored hash/salt pair in one statement.
    pub async fn update_password(
        db: &PgPool,
        id: i64,
        password: &HashedPassword,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, password_salt = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&password.hash)
        .bind(&password.salt)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_role(db: &PgPool, id: i64, role_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE users SET role_id = $2, updated_at = now() WHERE id = $1"#,
        )
        .bind(id)
        .bind(role_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(db: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
