//! Lead identifiers and the stage that assigns them
//!
//! Every imported row gets a fresh `LEAD-XXXXXXXXXXXXXXXX` token in a new
//! leading `lead_id` column. Tokens are random, not derived from row content,
//! so importing the same file twice yields two disjoint identifier sets.

use crate::error::{Error, Result};
use crate::reader::Row;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Name of the identifier column, always column 0 of a stored table
pub const LEAD_ID_COLUMN: &str = "lead_id";

/// What an incoming `lead_id` column is renamed to
pub const SOURCE_LEAD_ID_COLUMN: &str = "source_lead_id";

const PREFIX: &str = "LEAD-";
const HEX_LEN: usize = 16;

/// Opaque lead identifier: `LEAD-` followed by 16 uppercase hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeadId(String);

impl LeadId {
    /// Draw a new identifier from 64 random bits
    pub fn generate() -> Self {
        Self::from_bits(rand::thread_rng().gen())
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(format!("{PREFIX}{bits:016X}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Check the identifier shape without allocating
    pub fn is_valid(s: &str) -> bool {
        s.len() == PREFIX.len() + HEX_LEN
            && s.starts_with(PREFIX)
            && s[PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LeadId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if Self::is_valid(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::InvalidLeadId(s.to_string()))
        }
    }
}

impl TryFrom<String> for LeadId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<LeadId> for String {
    fn from(id: LeadId) -> Self {
        id.0
    }
}

/// Header of an imported table: `lead_id` first, then the source columns.
///
/// A source column already called `lead_id` (any case) is kept under
/// `source_lead_id` so column names stay unique.
pub fn header_with_lead_id(headers: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(headers.len() + 1);
    out.push(LEAD_ID_COLUMN.to_string());
    out.extend(headers.iter().map(|h| {
        if h.eq_ignore_ascii_case(LEAD_ID_COLUMN) {
            SOURCE_LEAD_ID_COLUMN.to_string()
        } else {
            h.clone()
        }
    }));
    out
}

/// Iterator adaptor prepending a fresh identifier to every row
pub struct AssignLeadIds<I, G> {
    inner: I,
    generate: G,
    assigned: u64,
}

impl<I, G> AssignLeadIds<I, G> {
    /// Identifiers handed out so far
    pub fn assigned(&self) -> u64 {
        self.assigned
    }
}

impl<I, G> Iterator for AssignLeadIds<I, G>
where
    I: Iterator<Item = Result<Row>>,
    G: FnMut() -> LeadId,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.inner.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        let mut fields = Vec::with_capacity(row.fields.len() + 1);
        fields.push((self.generate)().into_string());
        fields.extend(row.fields);
        self.assigned += 1;
        Some(Ok(Row::new(row.line, fields)))
    }
}

pub trait AssignLeadIdsExt: Iterator<Item = Result<Row>> + Sized {
    /// Prepend random identifiers
    fn assign_lead_ids(self) -> AssignLeadIds<Self, fn() -> LeadId> {
        self.assign_lead_ids_with(LeadId::generate as fn() -> LeadId)
    }

    /// Prepend identifiers from a custom generator
    fn assign_lead_ids_with<G: FnMut() -> LeadId>(self, generate: G) -> AssignLeadIds<Self, G> {
        AssignLeadIds {
            inner: self,
            generate,
            assigned: 0,
        }
    }
}

impl<I: Iterator<Item = Result<Row>>> AssignLeadIdsExt for I {}
