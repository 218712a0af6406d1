//! Per-column order filters

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Buyer-facing filter on one logical column, as supplied in JSON
///
/// ```json
/// {"type": "one_of", "values": ["CA", "NY"]}
/// {"type": "number_range", "min": 21}
/// {"type": "date_range", "min": "2024-01-01", "max": "2024-06-30"}
/// {"type": "text_range", "min": "90000", "max": "96199"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    OneOf {
        values: Vec<String>,
    },
    NumberRange {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    DateRange {
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
    },
    TextRange {
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
    },
}

/// Logical column name -> predicate. Ordered so scans are reproducible.
pub type Filters = BTreeMap<String, Predicate>;

/// Parse a filter document
pub fn parse_filters(json: &str) -> Result<Filters> {
    let filters: Filters = serde_json::from_str(json)?;
    for (column, predicate) in &filters {
        predicate.compile(column)?;
    }
    Ok(filters)
}

/// A predicate validated and ready to test values
#[derive(Debug, Clone)]
pub enum Matcher {
    OneOf(HashSet<String>),
    Number { min: Option<f64>, max: Option<f64> },
    Date { min: Option<NaiveDate>, max: Option<NaiveDate> },
    Text { min: Option<String>, max: Option<String> },
}

impl Predicate {
    /// Validate bounds and build a matcher
    pub fn compile(&self, column: &str) -> Result<Matcher> {
        let invalid = |reason: &str| Error::InvalidPredicate {
            column: column.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Predicate::OneOf { values } => {
                let set: HashSet<String> = values
                    .iter()
                    .map(|v| v.trim().to_lowercase())
                    .filter(|v| !v.is_empty())
                    .collect();
                if set.is_empty() {
                    return Err(invalid("one_of needs at least one non-empty value"));
                }
                Ok(Matcher::OneOf(set))
            }
            Predicate::NumberRange { min, max } => {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(invalid("min is greater than max"));
                    }
                }
                Ok(Matcher::Number {
                    min: *min,
                    max: *max,
                })
            }
            Predicate::DateRange { min, max } => {
                let parse_bound = |bound: &Option<String>| -> Result<Option<NaiveDate>> {
                    match bound {
                        None => Ok(None),
                        Some(text) => parse_date(text)
                            .map(Some)
                            .ok_or_else(|| invalid(&format!("unrecognized date '{}'", text))),
                    }
                };
                let (lo, hi) = (parse_bound(min)?, parse_bound(max)?);
                if let (Some(lo), Some(hi)) = (lo, hi) {
                    if lo > hi {
                        return Err(invalid("min is after max"));
                    }
                }
                Ok(Matcher::Date { min: lo, max: hi })
            }
            Predicate::TextRange { min, max } => {
                let lo = min.as_ref().map(|s| s.trim().to_string());
                let hi = max.as_ref().map(|s| s.trim().to_string());
                if let (Some(lo), Some(hi)) = (&lo, &hi) {
                    if lo > hi {
                        return Err(invalid("min sorts after max"));
                    }
                }
                Ok(Matcher::Text { min: lo, max: hi })
            }
        }
    }
}

impl Matcher {
    /// Test one raw field value. Empty values never match.
    pub fn matches(&self, raw: &str) -> bool {
        let value = raw.trim();
        if value.is_empty() {
            return false;
        }
        match self {
            Matcher::OneOf(set) => set.contains(&value.to_lowercase()),
            Matcher::Number { min, max } => match parse_number(value) {
                Some(n) => within(&n, min.as_ref(), max.as_ref()),
                None => false,
            },
            Matcher::Date { min, max } => match parse_date(value) {
                Some(d) => within(&d, min.as_ref(), max.as_ref()),
                None => false,
            },
            Matcher::Text { min, max } => {
                min.as_deref().map_or(true, |lo| value >= lo)
                    && max.as_deref().map_or(true, |hi| value <= hi)
            }
        }
    }
}

fn within<T: PartialOrd>(value: &T, min: Option<&T>, max: Option<&T>) -> bool {
    min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
}

/// Parse a number, tolerating currency signs and thousands separators
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

/// Parse the date part of common date and timestamp shapes
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}
