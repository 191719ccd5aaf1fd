//! Movie CRUD handlers.
//!
//! All routes here sit behind permission gates (`movies:read` for reads,
//! `movies:write` for mutations). Updates are guarded by optimistic
//! concurrency: the client may pin the version it last read via the
//! `X-Expected-Version` header, and the store's conditional write rejects
//! stale versions either way.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::models::Movie;
use crate::state::AppState;
use crate::store::Filters;
use crate::validation::{Validator, validate_movie};

/// Columns a client may sort the movie list by.
const SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Header carrying the client's expected resource version for updates.
const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// Query parameters for `GET /v1/movies`.
#[derive(Debug, Deserialize)]
pub struct ListMoviesQuery {
    #[serde(default)]
    pub title: String,
    /// Comma-separated genre filter; a movie must contain all of them.
    #[serde(default)]
    pub genres: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default = "default_sort")]
    pub sort: String,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

fn default_sort() -> String {
    "id".to_string()
}

/// List movies with filtering, sorting, and pagination.
#[instrument(skip(state))]
pub async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<ListMoviesQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let genres: Vec<String> = query
        .genres
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();

    let filters = Filters {
        page: query.page,
        page_size: query.page_size,
        sort: query.sort,
        sort_safelist: SORT_SAFELIST,
    };

    let mut v = Validator::new();
    filters.validate(&mut v);
    v.into_result()?;

    let (movies, metadata) = state.store.movies.list(&query.title, &genres, &filters).await?;

    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

/// Request body for `POST /v1/movies`.
#[derive(Debug, Deserialize)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

/// Create a movie. Responds 201 with a Location header.
#[instrument(skip(state, payload))]
pub async fn create_movie(
    State(state): State<AppState>,
    Json(payload): Json<CreateMovieRequest>,
) -> AppResult<Response> {
    let mut movie = Movie {
        id: 0,
        created_at: Utc::now(),
        title: payload.title,
        year: payload.year,
        runtime: payload.runtime,
        genres: payload.genres,
        version: 0,
    };

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.into_result()?;

    state.store.movies.create(&mut movie).await?;

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    )
        .into_response())
}

/// Fetch a single movie.
#[instrument(skip(state))]
pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let movie = state.store.movies.get(id).await?;
    Ok(Json(json!({ "movie": movie })))
}

/// Request body for `PATCH /v1/movies/{id}`. Absent fields keep their
/// current values.
#[derive(Debug, Deserialize)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

/// Partially update a movie under optimistic concurrency.
#[instrument(skip(state, payload))]
pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMovieRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let mut movie = state.store.movies.get(id).await?;

    // A pinned expected version that doesn't match the fresh read is a
    // conflict before we even attempt the write.
    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        let matches = expected
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i32>().ok())
            .is_some_and(|value| value == movie.version);
        if !matches {
            return Err(AppError::EditConflict);
        }
    }

    if let Some(title) = payload.title {
        movie.title = title;
    }
    if let Some(year) = payload.year {
        movie.year = year;
    }
    if let Some(runtime) = payload.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = payload.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.into_result()?;

    // The conditional write keyed on (id, version) closes the race that the
    // header check above cannot: a concurrent writer between our read and
    // this statement still yields EditConflict, never a lost update.
    state.store.movies.update(&mut movie).await?;

    Ok(Json(json!({ "movie": movie })))
}

/// Delete a movie.
#[instrument(skip(state))]
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.movies.delete(id).await?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query: ListMoviesQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 20);
        assert_eq!(query.sort, "id");
        assert!(query.title.is_empty());
    }

    #[test]
    fn test_update_payload_fields_are_optional() {
        let payload: UpdateMovieRequest = serde_json::from_str(r#"{"year": 1943}"#).unwrap();
        assert!(payload.title.is_none());
        assert_eq!(payload.year, Some(1943));
        assert!(payload.genres.is_none());
    }
}
