//! Document types, validation, and storage path computation.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error as ThisError;

/// File name of the per-document metadata blob.
pub const METADATA_FILE: &str = "metadata.json";
/// File name of the per-document extracted text.
pub const CONTENT_FILE: &str = "content.txt";
/// File name of the optional original bytes.
pub const RAW_FILE: &str = "raw";

/// Unique identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new document ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a document came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Source type (e.g. "arXiv", "web", "filesystem"). Never empty.
    #[serde(rename = "type")]
    pub source_type: String,
    /// Remote locator. Takes precedence over `path` for fetch semantics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local locator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Source {
    /// Returns the effective locator (`url` wins over `path`).
    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.url.as_deref().or(self.path.as_deref())
    }
}

/// Document payload: extracted text, string metadata, and optional raw bytes
/// and embeddings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Content {
    /// Original bytes, if retained.
    pub raw: Option<Vec<u8>>,
    /// Extracted UTF-8 text.
    pub text: String,
    /// Arbitrary string metadata (title, author, attribution, ...).
    pub metadata: HashMap<String, String>,
    /// Optional embedding vector.
    pub embeddings: Option<Vec<f32>>,
}

/// A document stored in the commit log.
///
/// Documents are immutable once committed: a logical update is a new commit
/// referencing the same `id`, never an in-place mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// Where the document came from.
    pub source: Source,
    /// The document payload.
    pub content: Content,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Validation failure for a document about to be stored.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ValidationError {
    /// The document id is empty.
    #[error("document id is empty")]
    EmptyId,
    /// The source type is empty.
    #[error("source type is empty")]
    EmptySourceType,
    /// Neither `url` nor `path` is present.
    #[error("document has neither url nor path")]
    MissingLocator,
    /// The id or source type contains characters unsafe for a storage path.
    #[error("unsafe identifier for storage path: {0}")]
    UnsafeId(String),
}

impl Document {
    /// Validates the document shape.
    ///
    /// Called by every backend before any write; never bypassed.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.source.source_type.is_empty() {
            return Err(ValidationError::EmptySourceType);
        }
        if self.source.url.is_none() && self.source.path.is_none() {
            return Err(ValidationError::MissingLocator);
        }
        if !is_safe_component(self.id.as_str()) {
            return Err(ValidationError::UnsafeId(self.id.as_str().to_string()));
        }
        if !is_safe_component(&self.source.source_type) {
            return Err(ValidationError::UnsafeId(self.source.source_type.clone()));
        }
        Ok(())
    }

    /// Returns the id-sharded storage directory for this document.
    #[must_use]
    pub fn storage_path(&self) -> String {
        sharded_path(self.id.as_str())
    }

    /// Returns the date-partitioned storage directory for this document.
    ///
    /// Used by the disk backend, partitioned by source type and creation
    /// date.
    #[must_use]
    pub fn partitioned_path(&self) -> String {
        date_partitioned_path(
            &self.source.source_type,
            self.created_at.date_naive(),
            self.id.as_str(),
        )
    }

    /// Serializes the metadata blob written as `metadata.json`.
    #[must_use]
    pub fn metadata_file(&self) -> MetadataFile {
        MetadataFile {
            id: self.id.as_str().to_string(),
            source: self.source.clone(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
            metadata: self.content.metadata.clone(),
        }
    }

    /// Builds the commit message for storing this document.
    ///
    /// The `Source:` and `Attribution:` trailers are consumed by the
    /// tree-walking attribution query, so they are written from the same
    /// metadata the indexed executor reads.
    #[must_use]
    pub fn commit_message(&self) -> String {
        let mut message = format!("Add document {}", self.id);
        message.push_str(&format!("\n\nSource: {}", self.source.source_type));
        if let Some(attribution) = self.content.metadata.get("attribution") {
            message.push_str(&format!("\nAttribution: {attribution}"));
        }
        message
    }
}

/// Serializable `metadata.json` schema.
///
/// Deserialization is schema-tolerant: unknown fields are ignored and
/// missing timestamps fall back to the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFile {
    /// Document id.
    pub id: String,
    /// Document source.
    pub source: Source,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Extra string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl MetadataFile {
    /// Reassembles a document from its stored parts.
    #[must_use]
    pub fn into_document(self, text: String, raw: Option<Vec<u8>>) -> Document {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Document {
            id: DocumentId::new(self.id),
            source: self.source,
            content: Content {
                raw,
                text,
                metadata: self.metadata,
                embeddings: None,
            },
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// Computes the two-level sharded storage directory for an id.
///
/// `documents/<id[0:2]>/<id[2:4]>/<id>` for ids of length >= 4; shorter ids
/// degrade to fewer shard levels rather than panicking.
#[must_use]
pub fn sharded_path(id: &str) -> String {
    match (id.get(0..2), id.get(2..4)) {
        (Some(first), Some(second)) => format!("documents/{first}/{second}/{id}"),
        (Some(first), None) => format!("documents/{first}/{id}"),
        _ => format!("documents/{id}"),
    }
}

/// Computes the date-partitioned storage directory for an id.
///
/// `documents/<source_type>/<yyyy>/<mm>/<id>`; keeps any single directory
/// from growing unbounded as the corpus scales.
#[must_use]
pub fn date_partitioned_path(source_type: &str, date: NaiveDate, id: &str) -> String {
    format!(
        "documents/{source_type}/{:04}/{:02}/{id}",
        date.year(),
        date.month()
    )
}

/// Checks that a path component cannot escape the storage prefix.
///
/// Only alphanumeric characters, dashes, and underscores are allowed.
#[must_use]
pub(crate) fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}
