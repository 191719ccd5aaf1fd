//! Movie persistence with optimistic concurrency control.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::Movie;
use crate::store::filters::{Filters, PageMetadata};
use crate::store::{QUERY_TIMEOUT, with_timeout};

#[derive(Clone)]
pub struct MovieStore {
    pool: PgPool,
}

impl MovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a movie, filling in its id, creation time, and initial version
    /// (always 1, assigned by the column default).
    pub async fn create(&self, movie: &mut Movie) -> AppResult<()> {
        let query = r#"
            INSERT INTO movies (title, year, runtime, genres)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        "#;

        let (id, created_at, version): (i64, DateTime<Utc>, i32) =
            with_timeout(QUERY_TIMEOUT, "insert movie", async {
                sqlx::query_as(query)
                    .bind(&movie.title)
                    .bind(movie.year)
                    .bind(movie.runtime)
                    .bind(&movie.genres)
                    .fetch_one(&self.pool)
                    .await
            })
            .await?;

        movie.id = id;
        movie.created_at = created_at;
        movie.version = version;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> AppResult<Movie> {
        if id < 1 {
            return Err(AppError::NotFound);
        }

        let query = r#"
            SELECT id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE id = $1
        "#;

        let movie: Option<Movie> = with_timeout(QUERY_TIMEOUT, "select movie", async {
            sqlx::query_as(query).bind(id).fetch_optional(&self.pool).await
        })
        .await?;

        movie.ok_or(AppError::NotFound)
    }

    /// Conditionally update a movie: the row is written only if its stored
    /// version still equals `movie.version`, and the version is incremented
    /// in the same statement. A vanished row means another writer got there
    /// first (or deleted the row), which surfaces as [`AppError::EditConflict`].
    pub async fn update(&self, movie: &mut Movie) -> AppResult<()> {
        let query = r#"
            UPDATE movies
            SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        "#;

        let new_version: Option<(i32,)> = with_timeout(QUERY_TIMEOUT, "update movie", async {
            sqlx::query_as(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(&movie.genres)
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;

        match new_version {
            Some((version,)) => {
                movie.version = version;
                Ok(())
            }
            None => Err(AppError::EditConflict),
        }
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if id < 1 {
            return Err(AppError::NotFound);
        }

        let result = with_timeout(QUERY_TIMEOUT, "delete movie", async {
            sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// List movies with full-text title search, genre containment, and
    /// paginated, safelisted sorting.
    pub async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> AppResult<(Vec<Movie>, PageMetadata)> {
        // Sort column and direction come from the validated safelist, never
        // raw client input.
        let query = format!(
            r#"
            SELECT count(*) OVER(), id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
            AND (genres @> $2 OR $2 = '{{}}')
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            filters.sort_column(),
            filters.sort_direction(),
        );

        type Row = (
            i64,
            i64,
            DateTime<Utc>,
            String,
            i32,
            i32,
            Vec<String>,
            i32,
        );

        let rows: Vec<Row> = with_timeout(QUERY_TIMEOUT, "list movies", async {
            sqlx::query_as(&query)
                .bind(title)
                .bind(genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool)
                .await
        })
        .await?;

        let total_records = rows.first().map(|row| row.0).unwrap_or(0);
        let movies = rows
            .into_iter()
            .map(
                |(_, id, created_at, title, year, runtime, genres, version)| Movie {
                    id,
                    created_at,
                    title,
                    year,
                    runtime,
                    genres,
                    version,
                },
            )
            .collect();

        let metadata = PageMetadata::calculate(total_records, filters.page, filters.page_size);
        Ok((movies, metadata))
    }
}
