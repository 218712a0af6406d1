//! Field delimiters and header sniffing

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported field delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Tab,
    Semicolon,
    Pipe,
}

impl Delimiter {
    /// Candidates in tie-break order
    pub const ALL: [Delimiter; 4] = [
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Semicolon,
        Delimiter::Pipe,
    ];

    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
            Delimiter::Pipe => b'|',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Delimiter::Comma => "comma",
            Delimiter::Tab => "tab",
            Delimiter::Semicolon => "semicolon",
            Delimiter::Pipe => "pipe",
        }
    }
}

impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Delimiter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "comma" | "," => Ok(Delimiter::Comma),
            "tab" | "\t" | "\\t" => Ok(Delimiter::Tab),
            "semicolon" | ";" => Ok(Delimiter::Semicolon),
            "pipe" | "|" => Ok(Delimiter::Pipe),
            _ => Err(Error::InvalidDelimiter(s.to_string())),
        }
    }
}

/// Delimiter requested for an import: a fixed one, or sniff it from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DelimiterChoice {
    Auto,
    Fixed(Delimiter),
}

impl std::fmt::Display for DelimiterChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelimiterChoice::Auto => f.write_str("auto"),
            DelimiterChoice::Fixed(d) => d.fmt(f),
        }
    }
}

impl FromStr for DelimiterChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(DelimiterChoice::Auto)
        } else {
            s.parse().map(DelimiterChoice::Fixed)
        }
    }
}

impl TryFrom<String> for DelimiterChoice {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DelimiterChoice> for String {
    fn from(choice: DelimiterChoice) -> Self {
        choice.to_string()
    }
}

impl From<Delimiter> for DelimiterChoice {
    fn from(d: Delimiter) -> Self {
        DelimiterChoice::Fixed(d)
    }
}

/// Pick the delimiter that occurs most often in a header line.
///
/// Occurrences inside double quotes are ignored. No candidate at all
/// (single-column file) falls back to comma.
pub fn detect_delimiter(header_line: &str) -> Delimiter {
    let mut counts = [0usize; 4];
    let mut in_quotes = false;
    for ch in header_line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = Delimiter::ALL.iter().position(|d| d.as_byte() as char == ch) {
            counts[idx] += 1;
        }
    }

    let mut best = Delimiter::Comma;
    let mut best_count = 0;
    for (delimiter, count) in Delimiter::ALL.iter().zip(counts) {
        if count > best_count {
            best = *delimiter;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c"), Delimiter::Comma);
        assert_eq!(detect_delimiter("a\tb\tc"), Delimiter::Tab);
        assert_eq!(detect_delimiter("a;b;c"), Delimiter::Semicolon);
        assert_eq!(detect_delimiter("a|b|c"), Delimiter::Pipe);
        assert_eq!(detect_delimiter("single"), Delimiter::Comma);
    }

    #[test]
    fn test_detect_ignores_quoted_candidates() {
        assert_eq!(detect_delimiter("\"a,b,c\";d;e"), Delimiter::Semicolon);
    }

    #[test]
    fn test_choice_round_trips_through_strings() {
        assert_eq!("auto".parse::<DelimiterChoice>().unwrap(), DelimiterChoice::Auto);
        assert_eq!(
            "|".parse::<DelimiterChoice>().unwrap(),
            DelimiterChoice::Fixed(Delimiter::Pipe)
        );
        assert_eq!(String::from(DelimiterChoice::Fixed(Delimiter::Tab)), "tab");
        assert!("colon".parse::<DelimiterChoice>().is_err());
    }
}
