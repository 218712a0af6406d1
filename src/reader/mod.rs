//! Delimiter-tolerant CSV stream reader
//!
//! Produces a lazy, forward-only sequence of rows from any [`Read`]. The first
//! record is the header. Data-level problems never stop the stream:
//! - blank lines are dropped and not counted,
//! - ragged rows are skipped (and counted) or padded, depending on
//!   [`RaggedRows`],
//! - rows the parser cannot make sense of are counted as malformed and skipped;
//!   a stray opening quote costs only its own line,
//! - invalid UTF-8 is decoded lossily.
//!
//! Only I/O failures on the underlying stream are returned as errors.

mod delimiter;
mod writer;

pub use delimiter::*;
pub use writer::*;

use crate::error::{Error, Result};
use csv::{ByteRecord, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Cursor, Read};
use tracing::{debug, trace};

/// Policy for rows whose field count differs from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaggedRows {
    /// Count the row as skipped and move on
    Skip,
    /// Pad short rows with empty fields, truncate long ones
    Pad,
}

/// Reader options
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub delimiter: DelimiterChoice,
    pub ragged: RaggedRows,
    pub buffer_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: DelimiterChoice::Auto,
            ragged: RaggedRows::Skip,
            buffer_capacity: crate::config::default_buffer_capacity(),
        }
    }
}

impl ReaderOptions {
    pub fn new(delimiter: impl Into<DelimiterChoice>, ragged: RaggedRows) -> Self {
        Self {
            delimiter: delimiter.into(),
            ragged,
            ..Default::default()
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }
}

/// Rows skipped by the reader, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    /// Broken quoting or otherwise unparseable records
    pub malformed: u64,
    /// Field count differs from the header
    pub ragged: u64,
}

impl SkipCounts {
    pub fn total(&self) -> u64 {
        self.malformed + self.ragged
    }
}

/// A data row: fields in header order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line where the record started
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn get(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }
}

// The header line is read eagerly for sniffing, then chained back in front of
// the rest of the stream so the csv parser sees the original bytes.
type Chained<R> = std::io::Chain<Cursor<Vec<u8>>, BufReader<R>>;

/// Reader type produced by [`open_rows`]
pub type RowStream<R> = CsvRowReader<Chained<R>>;

/// Open a row stream over `source`
pub fn open_rows<R: Read>(source: R, options: ReaderOptions) -> Result<RowStream<R>> {
    let mut buffered = BufReader::with_capacity(options.buffer_capacity, source);

    let mut first_line = Vec::new();
    buffered.read_until(b'\n', &mut first_line)?;
    // Leading blank lines before the header carry nothing
    while !first_line.is_empty() && first_line.iter().all(|b| b.is_ascii_whitespace()) {
        first_line.clear();
        buffered.read_until(b'\n', &mut first_line)?;
    }
    if first_line.is_empty() {
        return Err(Error::EmptyInput("no header line".to_string()));
    }

    let delimiter = match options.delimiter {
        DelimiterChoice::Fixed(d) => d,
        DelimiterChoice::Auto => {
            let detected = detect_delimiter(&String::from_utf8_lossy(&first_line));
            debug!(delimiter = %detected, "Detected delimiter");
            detected
        }
    };

    let chained = Cursor::new(first_line).chain(buffered);
    let mut inner = csv::ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .double_quote(true)
        .buffer_capacity(options.buffer_capacity)
        .from_reader(RawWindow::new(chained));

    let raw_headers = inner.byte_headers()?.clone();
    let headers: Vec<String> = raw_headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let mut name = decode_field(raw);
            if idx == 0 {
                name = name.trim_start_matches('\u{feff}').to_string();
            }
            name.trim().to_string()
        })
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(Error::EmptyInput("header row is empty".to_string()));
    }

    Ok(CsvRowReader {
        inner,
        headers,
        delimiter,
        ragged: options.ragged,
        record: ByteRecord::new(),
        pending: VecDeque::new(),
        data_rows: 0,
        skipped: SkipCounts::default(),
        failed: false,
    })
}

// Bytes below this offset are only dropped from the window in bulk
const WINDOW_RELEASE: usize = 64 * 1024;

/// Pass-through reader that keeps the raw bytes the parser has not yet
/// moved past, so a record merged by a runaway quote can be split back into
/// its physical lines.
struct RawWindow<R> {
    inner: R,
    window: Vec<u8>,
    /// Stream offset of `window[0]`
    base: u64,
}

impl<R> RawWindow<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            window: Vec::new(),
            base: 0,
        }
    }

    /// Raw bytes between two stream offsets
    fn span(&self, start: u64, end: u64) -> &[u8] {
        let end = (end.saturating_sub(self.base) as usize).min(self.window.len());
        let start = (start.saturating_sub(self.base) as usize).min(end);
        &self.window[start..end]
    }

    /// Forget bytes before `offset` once enough have piled up
    fn release(&mut self, offset: u64) {
        let cut = (offset.saturating_sub(self.base) as usize).min(self.window.len());
        if cut >= WINDOW_RELEASE && cut * 2 >= self.window.len() {
            self.window.drain(..cut);
            self.base += cut as u64;
        }
    }
}

impl<R: Read> Read for RawWindow<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.window.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Streaming row reader over a byte source (see [`open_rows`])
pub struct CsvRowReader<R: Read> {
    inner: csv::Reader<RawWindow<R>>,
    headers: Vec<String>,
    delimiter: Delimiter,
    ragged: RaggedRows,
    record: ByteRecord,
    /// Rows recovered from a runaway-quote record, yielded before reading on
    pending: VecDeque<Row>,
    data_rows: u64,
    skipped: SkipCounts,
    failed: bool,
}

impl<R: Read> CsvRowReader<R> {
    /// Header names, trimmed, BOM removed
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Delimiter in use (detected or fixed)
    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Data rows seen so far, including skipped ones but not blank lines
    pub fn data_rows(&self) -> u64 {
        self.data_rows
    }

    /// Skipped rows so far; final once the iterator is exhausted
    pub fn skipped(&self) -> SkipCounts {
        self.skipped
    }

    fn is_blank(record: &ByteRecord) -> bool {
        record.len() == 1 && record[0].iter().all(|b| b.is_ascii_whitespace())
    }

    /// Split the record just read back into physical lines.
    ///
    /// The line holding the stray quote is malformed. Every later line is
    /// parsed on its own, so it is either queued in `pending` or counted.
    fn recover_runaway(&mut self, line: u64) {
        self.skipped.malformed += 1;
        trace!(line, "Skipping row with unterminated quote");

        let start = self.record.position().map(|p| p.byte()).unwrap_or(0);
        let end = self.inner.position().byte();
        let raw = self.inner.get_ref().span(start, end).to_vec();
        let width = self.headers.len();

        for (offset, physical) in raw.split(|b| *b == b'\n').enumerate().skip(1) {
            let physical = physical.strip_suffix(b"\r").unwrap_or(physical);
            if physical.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let at = line + offset as u64;
            self.data_rows += 1;

            let mut single = csv::ReaderBuilder::new()
                .delimiter(self.delimiter.as_byte())
                .has_headers(false)
                .flexible(true)
                .double_quote(true)
                .from_reader(physical);
            let mut record = ByteRecord::new();
            match single.read_byte_record(&mut record) {
                Ok(true) => {
                    let quotes = physical.iter().filter(|b| **b == b'"').count();
                    if record.len() != width && quotes % 2 == 1 {
                        self.skipped.malformed += 1;
                        trace!(line = at, "Skipping row with unterminated quote");
                        continue;
                    }
                    if let Some(row) = shape_row(&record, at, width, self.ragged, &mut self.skipped)
                    {
                        self.pending.push_back(row);
                    }
                }
                _ => {
                    self.skipped.malformed += 1;
                    trace!(line = at, "Skipping malformed row");
                }
            }
        }
        debug!(
            line,
            recovered = self.pending.len(),
            "Recovered rows after unterminated quote"
        );
    }
}

impl<R: Read> Iterator for CsvRowReader<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            let consumed = self.inner.position().byte();
            self.inner.get_mut().release(consumed);

            match self.inner.read_byte_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => {
                    if Self::is_blank(&self.record) {
                        continue;
                    }
                    self.data_rows += 1;
                    let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                    let width = self.headers.len();

                    // A quote that never closed swallows line breaks and
                    // merges the following lines into this record.
                    if self.record.len() != width && self.record.iter().any(|f| f.contains(&b'\n'))
                    {
                        self.recover_runaway(line);
                        continue;
                    }
                    if let Some(row) =
                        shape_row(&self.record, line, width, self.ragged, &mut self.skipped)
                    {
                        return Some(Ok(row));
                    }
                }
                Err(e) => match e.kind() {
                    ErrorKind::Io(_) => {
                        self.failed = true;
                        return Some(Err(Error::Csv(e)));
                    }
                    _ => {
                        self.data_rows += 1;
                        self.skipped.malformed += 1;
                        trace!(error = %e, "Skipping malformed row");
                    }
                },
            }
        }
    }
}

/// Fit a record to the header width, or count it as ragged and drop it
fn shape_row(
    record: &ByteRecord,
    line: u64,
    width: usize,
    ragged: RaggedRows,
    skipped: &mut SkipCounts,
) -> Option<Row> {
    if record.len() != width && ragged == RaggedRows::Skip {
        skipped.ragged += 1;
        trace!(
            line,
            fields = record.len(),
            expected = width,
            "Skipping ragged row"
        );
        return None;
    }
    let mut fields: Vec<String> = record.iter().take(width).map(decode_field).collect();
    fields.resize(width, String::new());
    Some(Row::new(line, fields))
}

/// Decode a raw field: lossy UTF-8, NUL bytes dropped
fn decode_field(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text.into_owned()
    }
}
