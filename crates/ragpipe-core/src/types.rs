//! Common types used across the ragpipe system

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String metadata attached to documents, chunks and matches.
///
/// Ordered so that iteration and serialization never depend on hashing.
pub type Metadata = BTreeMap<String, String>;

/// A source document produced at ingestion time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A single retrieval result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl Match {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata field, ignoring blank values
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|text| !text.trim().is_empty())
    }
}

/// Chat role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Why a retrieval produced no usable context.
///
/// Not an error: the pipeline continues with an empty context.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalDegraded {
    /// The index call itself failed
    IndexUnavailable(String),
    /// The index answered with no rows
    EmptyPayload,
    /// Column lengths in the payload disagree
    MalformedPayload {
        ids: usize,
        scores: usize,
        metadatas: usize,
    },
}

impl fmt::Display for RetrievalDegraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalDegraded::IndexUnavailable(reason) => {
                write!(f, "vector index query failed: {}", reason)
            }
            RetrievalDegraded::EmptyPayload => write!(f, "vector index returned no results"),
            RetrievalDegraded::MalformedPayload {
                ids,
                scores,
                metadatas,
            } => write!(
                f,
                "malformed index payload (ids={}, scores={}, metadatas={})",
                ids, scores, metadatas
            ),
        }
    }
}
