//! Feed pagination and filters.
//!
//! [`FeedQuery::parse`] never fails: bad values are dropped and the caller
//! validates the result with [`validator::Validate`] before running it.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_LENGTH: usize = "YYYY-MM-DD".len();
const TAG_SEPARATOR: char = ',';

/// Creation time ordering.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Asc,
    #[default]
    Desc,
}

impl Sort {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Sort::Asc => "ASC",
            Sort::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for Sort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Sort::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Sort::Desc)
        } else {
            Err(())
        }
    }
}

/// Pagination and filters of a user feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FeedQuery {
    #[validate(range(
        min = 1,
        max = 100,
        message = "Limit must be between 1 and 100."
    ))]
    pub limit: i64,
    #[validate(range(min = 0, message = "Offset must be positive."))]
    pub offset: i64,
    #[validate(custom(
        function = "validate_sort",
        message = "Sort must be 'asc' or 'desc'."
    ))]
    pub sort: String,
    #[validate(
        length(max = 5, message = "At most 5 tags are allowed."),
        custom(
            function = "crate::router::validate_tags",
            message = "Tags must not contain NUL characters."
        )
    )]
    pub tags: Vec<String>,
    #[validate(
        length(max = 100, message = "Search must contain at most 100 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Search must not contain NUL characters."
        )
    )]
    pub search: String,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            limit: 1,
            offset: 0,
            sort: "desc".into(),
            tags: Vec::new(),
            search: String::default(),
            since: None,
            until: None,
        }
    }
}

fn validate_sort(sort: &str) -> Result<(), ValidationError> {
    sort.parse::<Sort>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("sort"))
}

impl FeedQuery {
    /// Override fields present in `params`.
    pub fn parse(mut self, params: &HashMap<String, String>) -> Self {
        if let Some(limit) = params.get("limit").and_then(|l| l.parse().ok()) {
            self.limit = limit;
        }

        if let Some(offset) = params.get("offset").and_then(|o| o.parse().ok())
        {
            self.offset = offset;
        }

        if let Some(sort) = params.get("sort").filter(|s| !s.is_empty()) {
            self.sort = sort.clone();
        }

        if let Some(tags) = params.get("tags") {
            self.tags.extend(
                tags.split(TAG_SEPARATOR)
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned),
            );
        }

        if let Some(search) = params.get("search").filter(|s| !s.is_empty()) {
            self.search = search.clone();
        }

        if let Some(since) = params.get("since").and_then(|d| parse_date(d)) {
            self.since = Some(since);
        }

        if let Some(until) = params.get("until").and_then(|d| parse_date(d)) {
            self.until = Some(until);
        }

        self
    }

    /// Ordering, falling back on [`Sort::Desc`] for unvalidated input.
    pub fn order(&self) -> Sort {
        self.sort.parse().unwrap_or_default()
    }
}

/// Strict `YYYY-MM-DD`. `%Y` alone also takes signed and five-digit years.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.len() != DATE_LENGTH
        || !value.as_bytes()[..4].iter().all(u8::is_ascii_digit)
    {
        return None;
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .filter(|date| date.year() >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_kept() {
        let query = FeedQuery::default().parse(&HashMap::new());

        assert_eq!(query, FeedQuery::default());
        assert_eq!(query.limit, 1);
        assert_eq!(query.order(), Sort::Desc);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_parse_everything() {
        let query = FeedQuery::default().parse(&params(&[
            ("limit", "20"),
            ("offset", "40"),
            ("sort", "ASC"),
            ("tags", "rust, async,,web"),
            ("search", "tokio"),
            ("since", "2025-02-01"),
            ("until", "2025-02-28"),
        ]));

        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 40);
        assert_eq!(query.order(), Sort::Asc);
        assert_eq!(query.tags, vec!["rust", "async", "web"]);
        assert_eq!(query.search, "tokio");
        assert_eq!(query.since, NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(query.until, NaiveDate::from_ymd_opt(2025, 2, 28));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let query = FeedQuery {
            limit: 10,
            ..Default::default()
        }
        .parse(&params(&[
            ("limit", "ten"),
            ("offset", "-"),
            ("since", "yesterday"),
            ("until", "2025-13-45"),
        ]));

        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 0);
        assert_eq!(query.since, None);
        assert_eq!(query.until, None);
    }

    #[test]
    fn test_only_four_digit_years() {
        for date in ["-5000-01-01", "+2025-01-01", "12025-01-01", "0000-01-01", "2025-1-1"] {
            let query = FeedQuery::default().parse(&params(&[("since", date), ("until", date)]));
            assert_eq!(query.since, None, "{date}");
            assert_eq!(query.until, None, "{date}");
        }

        let query = FeedQuery::default().parse(&params(&[("until", "9999-12-31")]));
        assert_eq!(query.until, NaiveDate::from_ymd_opt(9999, 12, 31));
    }

    #[test]
    fn test_nul_is_rejected() {
        let query = FeedQuery::default().parse(&params(&[("search", "a\0b")]));
        let errors = query.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("search"));

        let query = FeedQuery::default().parse(&params(&[("tags", "rust,a\0b")]));
        let errors = query.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("tags"));
    }

    #[test]
    fn test_validation_bounds() {
        let query = FeedQuery::default().parse(&params(&[("limit", "0")]));
        assert!(query.validate().is_err());

        let query = FeedQuery::default().parse(&params(&[("limit", "101")]));
        assert!(query.validate().is_err());

        let query = FeedQuery::default().parse(&params(&[("offset", "-1")]));
        assert!(query.validate().is_err());

        let query =
            FeedQuery::default().parse(&params(&[("sort", "sideways")]));
        let errors = query.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("sort"));

        let query =
            FeedQuery::default().parse(&params(&[("tags", "a,b,c,d,e,f")]));
        assert!(query.validate().is_err());
    }
}
