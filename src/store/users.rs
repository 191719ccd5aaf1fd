//! User persistence: lookups by id, email, and presented token, plus
//! version-guarded updates.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::user::{Password, User};
use crate::models::token;
use crate::store::{QUERY_TIMEOUT, with_timeout};

/// Unique constraint backing the users.email column.
const EMAIL_KEY_CONSTRAINT: &str = "users_email_key";

type UserRow = (i64, DateTime<Utc>, String, String, String, bool, i32);

fn row_to_user((id, created_at, name, email, password_hash, activated, version): UserRow) -> User {
    User {
        id,
        created_at,
        name,
        email,
        password: Password::from_hash(password_hash),
        activated,
        version,
    }
}

/// Rewrite a unique-violation on the email column into the domain error.
fn map_duplicate_email(err: AppError) -> AppError {
    if let AppError::Database(sqlx::Error::Database(ref dbe)) = err
        && dbe.constraint() == Some(EMAIL_KEY_CONSTRAINT)
    {
        return AppError::DuplicateEmail;
    }
    err
}

#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &mut User) -> AppResult<()> {
        let query = r#"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        "#;

        let (id, created_at, version): (i64, DateTime<Utc>, i32) =
            with_timeout(QUERY_TIMEOUT, "insert user", async {
                sqlx::query_as(query)
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(user.password.hash())
                    .bind(user.activated)
                    .fetch_one(&self.pool)
                    .await
            })
            .await
            .map_err(map_duplicate_email)?;

        user.id = id;
        user.created_at = created_at;
        user.version = version;
        Ok(())
    }

    pub async fn get(&self, user_id: i64) -> AppResult<User> {
        let query = r#"
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE id = $1
        "#;

        let row: Option<UserRow> = with_timeout(QUERY_TIMEOUT, "select user", async {
            sqlx::query_as(query)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;

        row.map(row_to_user).ok_or(AppError::NotFound)
    }

    pub async fn get_by_email(&self, email: &str) -> AppResult<User> {
        let query = r#"
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE email = $1
        "#;

        let row: Option<UserRow> = with_timeout(QUERY_TIMEOUT, "select user by email", async {
            sqlx::query_as(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;

        row.map(row_to_user).ok_or(AppError::NotFound)
    }

    /// Resolve the user owning an unexpired token with the given scope.
    ///
    /// The presented plaintext is hashed and matched against the stored
    /// digest; an unknown or expired token is [`AppError::NotFound`].
    pub async fn get_for_token(&self, scope: &str, plaintext: &str) -> AppResult<User> {
        let token_hash = token::hash_plaintext(plaintext);

        let query = r#"
            SELECT users.id, users.created_at, users.name, users.email,
                   users.password_hash, users.activated, users.version
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
            AND tokens.scope = $2
            AND tokens.expiry > $3
        "#;

        let row: Option<UserRow> = with_timeout(QUERY_TIMEOUT, "select user for token", async {
            sqlx::query_as(query)
                .bind(&token_hash)
                .bind(scope)
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .await
        })
        .await?;

        row.map(row_to_user).ok_or(AppError::NotFound)
    }

    /// Version-guarded update; a concurrent writer since the caller's read
    /// surfaces as [`AppError::EditConflict`].
    pub async fn update(&self, user: &mut User) -> AppResult<()> {
        let query = r#"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        "#;

        let new_version: Option<(i32,)> = with_timeout(QUERY_TIMEOUT, "update user", async {
            sqlx::query_as(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(user.password.hash())
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool)
                .await
        })
        .await
        .map_err(map_duplicate_email)?;

        match new_version {
            Some((version,)) => {
                user.version = version;
                Ok(())
            }
            None => Err(AppError::EditConflict),
        }
    }
}
