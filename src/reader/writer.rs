//! Row sinks: where pipeline stages put the rows they keep or remove

use super::Delimiter;
use crate::error::{Error, Result};
use std::io::Write;

/// Destination for rows leaving a pipeline stage
pub trait RowSink {
    fn write_row(&mut self, fields: &[String]) -> Result<()>;
}

/// Collects rows in memory (tests, small side outputs)
impl RowSink for Vec<Vec<String>> {
    fn write_row(&mut self, fields: &[String]) -> Result<()> {
        self.push(fields.to_vec());
        Ok(())
    }
}

/// Discards rows but counts them
#[derive(Debug, Default)]
pub struct CountingSink {
    pub rows: u64,
}

impl RowSink for CountingSink {
    fn write_row(&mut self, _fields: &[String]) -> Result<()> {
        self.rows += 1;
        Ok(())
    }
}

/// Delimited writer with a header row already emitted
pub struct RowWriter<W: Write> {
    inner: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> RowWriter<W> {
    /// Wrap `out` and write `headers` immediately
    pub fn new(out: W, delimiter: Delimiter, headers: &[String]) -> Result<Self> {
        let mut inner = csv::WriterBuilder::new()
            .delimiter(delimiter.as_byte())
            .flexible(false)
            .from_writer(out);
        inner.write_record(headers)?;
        Ok(Self { inner, rows: 0 })
    }

    /// Data rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.inner
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl<W: Write> RowSink for RowWriter<W> {
    fn write_row(&mut self, fields: &[String]) -> Result<()> {
        self.inner.write_record(fields)?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_quotes_embedded_delimiters() {
        let headers = vec!["lead_id".to_string(), "name".to_string()];
        let mut writer = RowWriter::new(Vec::new(), Delimiter::Comma, &headers).unwrap();
        writer
            .write_row(&["LEAD-1".to_string(), "Smith, Ann".to_string()])
            .unwrap();
        assert_eq!(writer.rows(), 1);

        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "lead_id,name\nLEAD-1,\"Smith, Ann\"\n");
    }

    #[test]
    fn test_writer_uses_delimiter() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let mut writer = RowWriter::new(Vec::new(), Delimiter::Pipe, &headers).unwrap();
        writer.write_row(&["1".to_string(), "2".to_string()]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "a|b\n1|2\n");
    }
}
