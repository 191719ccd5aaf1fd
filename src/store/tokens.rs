//! Append-only credential records.

use chrono::Duration;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::Token;
use crate::store::{TOKEN_QUERY_TIMEOUT, with_timeout};

#[derive(Clone)]
pub struct TokenStore {
    pool: PgPool,
}

impl TokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Generate and persist a token in one step, returning the record with
    /// its plaintext still attached for delivery to the user.
    pub async fn new_token(&self, user_id: i64, ttl: Duration, scope: &str) -> AppResult<Token> {
        let token = Token::generate(user_id, ttl, scope);
        self.insert(&token).await?;
        Ok(token)
    }

    pub async fn insert(&self, token: &Token) -> AppResult<()> {
        let query = r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
        "#;

        with_timeout(TOKEN_QUERY_TIMEOUT, "insert token", async {
            sqlx::query(query)
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(&token.scope)
                .execute(&self.pool)
                .await
        })
        .await?;

        Ok(())
    }

    /// Revoke all of a user's tokens with the given scope.
    pub async fn delete_all_for_user(&self, scope: &str, user_id: i64) -> AppResult<()> {
        let query = r#"
            DELETE FROM tokens
            WHERE scope = $1 AND user_id = $2
        "#;

        with_timeout(TOKEN_QUERY_TIMEOUT, "delete tokens", async {
            sqlx::query(query)
                .bind(scope)
                .bind(user_id)
                .execute(&self.pool)
                .await
        })
        .await?;

        Ok(())
    }
}
