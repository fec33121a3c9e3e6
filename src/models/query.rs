//! GQL abstract syntax tree and query result types.

use super::document::Document;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Default result limit when a query omits `LIMIT`.
pub const DEFAULT_LIMIT: usize = 100;

/// What a query selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Individual documents.
    Documents,
    /// Sources aggregated with document counts.
    Sources,
    /// Authors aggregated with document counts.
    Authors,
    /// Per-source attribution facts.
    Attribution,
}

impl QueryType {
    /// Parses a query type keyword (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "documents" => Some(Self::Documents),
            "sources" => Some(Self::Sources),
            "authors" => Some(Self::Authors),
            "attribution" => Some(Self::Attribution),
            _ => None,
        }
    }

    /// Returns the lowercase keyword for this query type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Sources => "sources",
            Self::Authors => "authors",
            Self::Attribution => "attribution",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Exact equality (`=`).
    Eq,
    /// Inequality (`!=`).
    Ne,
    /// Case-insensitive substring match (`~`).
    Contains,
    /// Greater than (`>`).
    Gt,
    /// Less than (`<`).
    Lt,
    /// The field is present (`EXISTS`, value-less).
    Exists,
    /// The field is absent (`NOT-EXISTS`, value-less).
    NotExists,
}

impl FilterOperator {
    /// Whether this operator takes a right-hand value.
    #[must_use]
    pub const fn takes_value(self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Contains => "~",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT-EXISTS",
        };
        f.write_str(symbol)
    }
}

/// A typed filter value.
///
/// Bare words are typed by the parser: `true`/`false` become booleans, words
/// parsable as `YYYY-MM-DD` become dates, numerics become numbers, and
/// everything else is a string.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A string literal or bare word.
    Str(String),
    /// A numeric literal.
    Number(f64),
    /// A boolean literal.
    Bool(bool),
    /// A calendar date literal.
    Date(NaiveDate),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{d}"),
        }
    }
}

/// A single `field operator value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name: a document field or a metadata key.
    pub field: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Right-hand value; `None` for the existence operators.
    pub value: Option<FilterValue>,
}

/// A parsed GQL query.
///
/// Constructed once per query string by the parser, consumed once by an
/// executor, discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// What the query selects from.
    pub query_type: QueryType,
    /// Conjunctive filters (`AND` only).
    pub filters: Vec<Filter>,
    /// Optional sort field.
    pub order_by: Option<String>,
    /// Sort direction when `order_by` is set.
    pub descending: bool,
    /// Maximum number of result items.
    pub limit: usize,
}

impl Query {
    /// Creates an unfiltered query with the default limit.
    #[must_use]
    pub const fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            filters: Vec::new(),
            order_by: None,
            descending: false,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A document summary returned by `documents` queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    /// Document id.
    pub id: String,
    /// Source type.
    pub source: String,
    /// Effective locator, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last update timestamp (RFC 3339).
    pub updated_at: String,
    /// Document metadata map.
    pub metadata: HashMap<String, String>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.as_str().to_string(),
            source: doc.source.source_type.clone(),
            locator: doc.source.locator().map(str::to_string),
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
            metadata: doc.content.metadata.clone(),
        }
    }
}

/// A source aggregated with its document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    /// Source type.
    pub source: String,
    /// Number of documents from this source.
    pub document_count: usize,
}

/// An author aggregated with their document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorCount {
    /// Author name (from the `author` metadata field).
    pub author: String,
    /// Number of documents by this author.
    pub document_count: usize,
}

/// Per-source attribution facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributionSummary {
    /// Source type.
    pub source: String,
    /// Number of documents from this source.
    pub document_count: usize,
    /// Whether any document from this source credits Caia Tech.
    pub caia_attribution: bool,
}

/// One item of a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryItem {
    /// A document summary.
    Document(DocumentSummary),
    /// A source aggregate.
    Source(SourceCount),
    /// An author aggregate.
    Author(AuthorCount),
    /// An attribution summary.
    Attribution(AttributionSummary),
}

/// The outcome of executing a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// The query type that produced these items.
    #[serde(rename = "type")]
    pub query_type: QueryType,
    /// Number of items returned.
    pub count: usize,
    /// The result items.
    pub items: Vec<QueryItem>,
    /// Wall-clock execution time in milliseconds.
    pub elapsed_ms: u64,
}

impl QueryResult {
    /// Wraps items produced for a query, stamping count and elapsed time.
    #[must_use]
    pub fn new(query_type: QueryType, items: Vec<QueryItem>, elapsed_ms: u64) -> Self {
        Self {
            query_type,
            count: items.len(),
            items,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_type_parse() {
        assert_eq!(QueryType::parse("documents"), Some(QueryType::Documents));
        assert_eq!(QueryType::parse("SOURCES"), Some(QueryType::Sources));
        assert_eq!(QueryType::parse("Attribution"), Some(QueryType::Attribution));
        assert_eq!(QueryType::parse("tables"), None);
    }

    #[test]
    fn test_operator_takes_value() {
        assert!(FilterOperator::Eq.takes_value());
        assert!(FilterOperator::Contains.takes_value());
        assert!(!FilterOperator::Exists.takes_value());
        assert!(!FilterOperator::NotExists.takes_value());
    }

    #[test]
    fn test_default_limit() {
        let query = Query::new(QueryType::Documents);
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert!(query.filters.is_empty());
        assert!(query.order_by.is_none());
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = QueryResult::new(
            QueryType::Sources,
            vec![QueryItem::Source(SourceCount {
                source: "arXiv".to_string(),
                document_count: 3,
            })],
            12,
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "sources");
        assert_eq!(json["count"], 1);
        assert_eq!(json["items"][0]["source"], "arXiv");
        assert_eq!(json["items"][0]["document_count"], 3);
        assert_eq!(json["elapsed_ms"], 12);
    }
}
