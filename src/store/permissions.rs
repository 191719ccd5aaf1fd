//! Permission-code lookups and grants.

use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::PermissionSet;
use crate::store::{QUERY_TIMEOUT, with_timeout};

#[derive(Clone)]
pub struct PermissionStore {
    pool: PgPool,
}

impl PermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All capability codes held by a user. Fetched per request by identity
    /// resolution; deliberately not cached across requests.
    pub async fn all_for_user(&self, user_id: i64) -> AppResult<PermissionSet> {
        let query = r#"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON permissions.id = users_permissions.permission_id
            WHERE users_permissions.user_id = $1
        "#;

        let codes: Vec<String> = with_timeout(QUERY_TIMEOUT, "select permissions", async {
            sqlx::query_scalar(query)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
        })
        .await?;

        Ok(PermissionSet::new(codes))
    }

    /// Grant the given capability codes to a user.
    pub async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> AppResult<()> {
        let query = r#"
            INSERT INTO users_permissions
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
        "#;

        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

        with_timeout(QUERY_TIMEOUT, "insert permissions", async {
            sqlx::query(query)
                .bind(user_id)
                .bind(&codes)
                .execute(&self.pool)
                .await
        })
        .await?;

        Ok(())
    }
}
