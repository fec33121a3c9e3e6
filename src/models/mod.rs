//! Core data types for docvault.

mod document;
mod events;
mod query;

pub use document::{
    CONTENT_FILE, Content, Document, DocumentId, METADATA_FILE, MetadataFile, RAW_FILE, Source,
    ValidationError, date_partitioned_path, sharded_path,
};
pub(crate) use document::is_safe_component;
pub use events::StorageEvent;
pub use query::{
    AttributionSummary, AuthorCount, DEFAULT_LIMIT, DocumentSummary, Filter, FilterOperator,
    FilterValue, Query,
    QueryItem, QueryResult, QueryType, SourceCount,
};
