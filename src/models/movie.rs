//! Movie model, the versioned resource protected by optimistic concurrency.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A catalog entry. `version` starts at 1 on creation and is incremented by
/// exactly one on every accepted update; stale writes are rejected by the
/// store's conditional update.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    /// Runtime in minutes.
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_created_at_is_not_serialized() {
        let movie = Movie {
            id: 1,
            created_at: Utc::now(),
            title: "Casablanca".to_string(),
            year: 1942,
            runtime: 102,
            genres: vec!["drama".to_string(), "romance".to_string()],
            version: 1,
        };

        let json = serde_json::to_value(&movie).unwrap();
        assert!(json.get("created_at").is_none());
        assert_eq!(json["version"], 1);
        assert_eq!(json["title"], "Casablanca");
    }
}
