//! Record validation
//!
//! A record is valid when every required field is present. Absence means an
//! empty string, or no value at all for the creation time.

use forumpipe_common::types::CanonicalRecord;
use std::fmt;
use thiserror::Error;

/// Fields a record must carry, in the order they are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Id,
    Title,
    Author,
    CreatedAt,
    Collection,
}

impl RequiredField {
    pub const ORDER: [RequiredField; 5] = [
        RequiredField::Id,
        RequiredField::Title,
        RequiredField::Author,
        RequiredField::CreatedAt,
        RequiredField::Collection,
    ];

    /// Name of the field as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::Id => "id",
            RequiredField::Title => "title",
            RequiredField::Author => "author",
            RequiredField::CreatedAt => "created_utc",
            RequiredField::Collection => "subreddit",
        }
    }

    fn is_missing(&self, record: &CanonicalRecord) -> bool {
        match self {
            RequiredField::Id => record.id.is_empty(),
            RequiredField::Title => record.title.is_empty(),
            RequiredField::Author => record.author.is_empty(),
            RequiredField::CreatedAt => record.created_at.is_none(),
            RequiredField::Collection => record.collection.is_empty(),
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing required field: {missing}")]
pub struct ValidationError {
    /// The first missing field in check order
    pub missing: RequiredField,
}

/// Report the first missing required field, if any
pub fn validate(record: &CanonicalRecord) -> Result<(), ValidationError> {
    match RequiredField::ORDER.iter().find(|field| field.is_missing(record)) {
        Some(&missing) => Err(ValidationError { missing }),
        None => Ok(()),
    }
}
