//! Filter evaluation and sorting over documents.
//!
//! Field names resolve to built-in document fields first, then to metadata
//! keys. Both executors share this module so a filter means the same thing
//! regardless of which strategy ran it.

use crate::models::{Document, Filter, FilterOperator, FilterValue};
use chrono::NaiveDate;
use std::cmp::Ordering;

/// Resolves a field name against a document.
///
/// Built-in fields: `source`/`source_type`/`type`, `url`, `path`,
/// `text`/`content`, `created_at`, `updated_at`, `id`. Anything else is a
/// metadata key. Returns `None` when the field is absent.
#[must_use]
pub fn field_value(doc: &Document, field: &str) -> Option<String> {
    match field {
        "source" | "source_type" | "type" => Some(doc.source.source_type.clone()),
        "url" => doc.source.url.clone(),
        "path" => doc.source.path.clone(),
        "text" | "content" => Some(doc.content.text.clone()),
        "created_at" => Some(doc.created_at.to_rfc3339()),
        "updated_at" => Some(doc.updated_at.to_rfc3339()),
        "id" => Some(doc.id.as_str().to_string()),
        _ => doc.content.metadata.get(field).cloned(),
    }
}

/// Evaluates one filter against a document.
///
/// Comparison operators on an absent field never match, including `!=`.
/// Absence is tested with `EXISTS` / `NOT-EXISTS`, not inequality.
#[must_use]
pub fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    let actual = field_value(doc, &filter.field);
    match filter.operator {
        FilterOperator::Exists => actual.is_some(),
        FilterOperator::NotExists => actual.is_none(),
        FilterOperator::Eq | FilterOperator::Ne | FilterOperator::Contains
        | FilterOperator::Gt | FilterOperator::Lt => {
            let (Some(actual), Some(expected)) = (actual, filter.value.as_ref()) else {
                return false;
            };
            compare(&actual, filter.operator, expected)
        },
    }
}

/// Evaluates a conjunction of filters.
#[must_use]
pub fn matches_all(doc: &Document, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches_filter(doc, f))
}

/// Orders two field values for `ORDER BY`.
///
/// Compares numerically when both sides parse as numbers, lexically
/// otherwise. Documents missing the sort field order last in either
/// direction.
#[must_use]
pub fn compare_for_sort(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.cmp(b),
        },
    }
}

fn compare(actual: &str, operator: FilterOperator, expected: &FilterValue) -> bool {
    match expected {
        FilterValue::Str(s) => compare_strings(actual, operator, s),
        FilterValue::Bool(b) => {
            let Ok(actual) = actual.parse::<bool>() else {
                return false;
            };
            match operator {
                FilterOperator::Eq => actual == *b,
                FilterOperator::Ne => actual != *b,
                _ => false,
            }
        },
        FilterValue::Number(n) => actual.parse::<f64>().is_ok_and(|actual| match operator {
            FilterOperator::Eq => (actual - n).abs() < f64::EPSILON,
            FilterOperator::Ne => (actual - n).abs() >= f64::EPSILON,
            FilterOperator::Gt => actual > *n,
            FilterOperator::Lt => actual < *n,
            FilterOperator::Contains | FilterOperator::Exists | FilterOperator::NotExists => false,
        }),
        FilterValue::Date(d) => parse_date(actual).is_some_and(|actual| match operator {
            FilterOperator::Eq => actual == *d,
            FilterOperator::Ne => actual != *d,
            FilterOperator::Gt => actual > *d,
            FilterOperator::Lt => actual < *d,
            FilterOperator::Contains | FilterOperator::Exists | FilterOperator::NotExists => false,
        }),
    }
}

fn compare_strings(actual: &str, operator: FilterOperator, expected: &str) -> bool {
    match operator {
        FilterOperator::Eq => actual == expected,
        FilterOperator::Ne => actual != expected,
        FilterOperator::Contains => actual.to_lowercase().contains(&expected.to_lowercase()),
        FilterOperator::Gt => actual > expected,
        FilterOperator::Lt => actual < expected,
        FilterOperator::Exists | FilterOperator::NotExists => false,
    }
}

/// Parses a field value as a date, accepting plain `YYYY-MM-DD` and RFC
/// 3339 timestamps.
fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}
