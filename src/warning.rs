//! Reduced-coverage warnings carried in pipeline results

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source table that could not be used and was left out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWarning {
    pub table_id: String,
    pub location: String,
    pub reason: String,
}

impl SourceWarning {
    pub fn new(
        table_id: impl Into<String>,
        location: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table {} ({}) skipped: {}",
            self.table_id, self.location, self.reason
        )
    }
}
