//! List pagination and sorting.

use serde::Serialize;

use crate::validation::Validator;

/// Pagination and sort parameters for list queries.
///
/// `sort_safelist` pins the set of columns a client may sort by; anything
/// else is rejected at validation time so user input never reaches the SQL
/// `ORDER BY` clause unchecked.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    /// Sort key, optionally prefixed with `-` for descending order.
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(
            self.page <= 10_000_000,
            "page",
            "must be a maximum of 10 million",
        );
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(
            self.page_size <= 100,
            "page_size",
            "must be a maximum of 100",
        );
        v.check(
            self.sort_safelist.contains(&self.sort.as_str()),
            "sort",
            "invalid sort value",
        );
    }

    /// The bare column name for `ORDER BY`. Falls back to the first safelist
    /// entry; `validate` has already rejected anything outside the list.
    pub fn sort_column(&self) -> &str {
        let bare = self.sort.trim_start_matches('-');
        self.sort_safelist
            .iter()
            .find(|&&candidate| candidate.trim_start_matches('-') == bare)
            .map(|&candidate| candidate.trim_start_matches('-'))
            .unwrap_or_else(|| self.sort_safelist.first().copied().unwrap_or("id"))
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') {
            "DESC"
        } else {
            "ASC"
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Pagination metadata included alongside list responses.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PageMetadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl PageMetadata {
    /// Compute metadata for a result set. An empty result set yields the
    /// zero value.
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAFELIST: &[&str] = &[
        "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
    ];

    fn filters(sort: &str) -> Filters {
        Filters {
            page: 1,
            page_size: 20,
            sort: sort.to_string(),
            sort_safelist: SAFELIST,
        }
    }

    #[test]
    fn test_sort_column_and_direction() {
        assert_eq!(filters("title").sort_column(), "title");
        assert_eq!(filters("title").sort_direction(), "ASC");
        assert_eq!(filters("-year").sort_column(), "year");
        assert_eq!(filters("-year").sort_direction(), "DESC");
    }

    #[test]
    fn test_unsafe_sort_is_rejected_by_validation() {
        let mut v = Validator::new();
        filters("title; DROP TABLE movies").validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn test_page_bounds() {
        let mut bad = filters("id");
        bad.page = 0;
        let mut v = Validator::new();
        bad.validate(&mut v);
        assert!(!v.is_valid());

        let mut bad = filters("id");
        bad.page_size = 101;
        let mut v = Validator::new();
        bad.validate(&mut v);
        assert!(!v.is_valid());
    }

    #[test]
    fn test_offset() {
        let mut f = filters("id");
        f.page = 3;
        f.page_size = 20;
        assert_eq!(f.offset(), 40);
        assert_eq!(f.limit(), 20);
    }

    #[test]
    fn test_metadata_calculation() {
        let meta = PageMetadata::calculate(95, 2, 20);
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.first_page, 1);
        assert_eq!(meta.last_page, 5);
        assert_eq!(meta.total_records, 95);
    }

    #[test]
    fn test_metadata_empty_result_set() {
        assert_eq!(PageMetadata::calculate(0, 1, 20), PageMetadata::default());
    }
}
