//! Pointers to stored tables as the pipeline sees them

use crate::reader::Delimiter;

/// A stored table file and how to read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSource {
    pub id: String,
    pub location: String,
    pub delimiter: Delimiter,
}

impl TableSource {
    pub fn new(id: impl Into<String>, location: impl Into<String>, delimiter: Delimiter) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            delimiter,
        }
    }
}
