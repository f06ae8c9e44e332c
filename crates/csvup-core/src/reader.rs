//! Streaming CSV reader honoring a configurable header position
//!
//! Physical lines before the header are skipped, the header row supplies
//! column names, and every following record becomes a [`Row`] tagged with the
//! line it starts on. A record whose field count
//! differs from the header is fatal for the whole run.

use csv::{ByteRecord, ReaderBuilder, StringRecord};
use csvup_common::{CsvupError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Field delimiter of the source format
pub const DELIMITER: u8 = b',';

/// Quote character of the source format
pub const QUOTE: u8 = b'"';

/// One data record of the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    line: u64,
    fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    /// 1-based line where the record starts
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Approximate encoded size: fields joined by the delimiter plus a newline
    pub fn encoded_len(&self) -> u64 {
        let content: usize = self.fields.iter().map(String::len).sum();
        (content + self.fields.len().saturating_sub(1) + 1) as u64
    }
}

/// Column names and where they were found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub line: u64,
    pub columns: Vec<String>,
}

impl Header {
    pub fn new(line: u64, columns: Vec<String>) -> Self {
        Self { line, columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Lazy, non-restartable sequence of rows following the header
pub struct TabularReader<R: Read = File> {
    records: RecordSource<R>,
    header: Option<Header>,
    finished: bool,
}

impl TabularReader<File> {
    /// Open `path` and position the reader after the header row
    pub fn open(path: &Path, header_line: usize) -> Result<Self> {
        let file = File::open(path).map_err(|source| CsvupError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, header_line)
    }

    /// Parse the whole file without retaining rows, returning the row count
    pub fn scan(path: &Path, header_line: usize) -> Result<usize> {
        let mut count = 0;
        for row in Self::open(path, header_line)? {
            row?;
            count += 1;
        }
        debug!(path = %path.display(), rows = count, "Source scan complete");
        Ok(count)
    }
}

impl<R: Read> TabularReader<R> {
    /// Skip `header_line - 1` physical lines and read the header record
    ///
    /// Blank lines count towards `header_line`. If the header line itself is
    /// blank, the first record after it is the header.
    pub fn from_reader(reader: R, header_line: usize) -> Result<Self> {
        if header_line == 0 {
            return Err(CsvupError::invalid_config(
                "header must be a 1-based line number",
            ));
        }

        let mut records = RecordSource::new(reader);
        let header = if records.skip_lines(header_line - 1)? {
            records
                .next_record()?
                .map(|(line, record)| Header::new(line, to_fields(&record)))
        } else {
            None
        };

        if header.is_none() {
            debug!(header_line, "Source ends before the header row");
        }

        Ok(Self {
            records,
            finished: header.is_none(),
            header,
        })
    }

    /// The header row, or `None` when the source ends before it
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }
}

impl<R: Read> Iterator for TabularReader<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let width = self.header.as_ref().map(Header::width).unwrap_or_default();
        let item = match self.records.next_record() {
            Ok(None) => {
                self.finished = true;
                return None;
            },
            Err(e) => Err(e),
            Ok(Some((line, record))) if record.len() == width => {
                Ok(Row::new(line, to_fields(&record)))
            },
            Ok(Some((line, record))) => Err(CsvupError::malformed(
                line,
                format!("expected {} fields, found {}", width, record.len()),
            )),
        };

        if item.is_err() {
            self.finished = true;
        }
        Some(item)
    }
}

/// Physical lines grouped into whole records
///
/// A record ends at the first line break outside quotes, so a quoted field
/// may span lines. Lines holding only a terminator are skipped but still
/// counted.
struct RecordSource<R> {
    input: BufReader<R>,
    next_line: u64,
    buf: Vec<u8>,
}

impl<R: Read> RecordSource<R> {
    fn new(reader: R) -> Self {
        Self {
            input: BufReader::new(reader),
            next_line: 1,
            buf: Vec::new(),
        }
    }

    /// Returns false when the input ends first
    fn skip_lines(&mut self, count: usize) -> Result<bool> {
        for _ in 0..count {
            self.buf.clear();
            if self.input.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(false);
            }
            self.next_line += 1;
        }
        Ok(true)
    }

    /// Next non-blank record and the line it starts on
    fn next_record(&mut self) -> Result<Option<(u64, StringRecord)>> {
        loop {
            self.buf.clear();
            let start = self.next_line;
            let mut quotes = 0;
            loop {
                let from = self.buf.len();
                if self.input.read_until(b'\n', &mut self.buf)? == 0 {
                    break;
                }
                self.next_line += 1;
                quotes += self.buf[from..].iter().filter(|&&b| b == QUOTE).count();
                if quotes % 2 == 0 {
                    break;
                }
            }

            if self.buf.is_empty() {
                return Ok(None);
            }
            if self.buf.iter().all(|&b| b == b'\n' || b == b'\r') {
                continue;
            }
            return parse_record(&self.buf, start).map(|record| Some((start, record)));
        }
    }
}

fn parse_record(bytes: &[u8], line: u64) -> Result<StringRecord> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .buffer_capacity(bytes.len() + 1)
        .from_reader(bytes);

    let mut record = ByteRecord::new();
    reader
        .read_byte_record(&mut record)
        .map_err(|e| CsvupError::malformed(line, e.to_string()))?;
    StringRecord::from_byte_record(record).map_err(|e| CsvupError::malformed(line, e.to_string()))
}

fn to_fields(record: &StringRecord) -> Vec<String> {
    record.iter().map(str::to_owned).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn read_all(data: &str, header_line: usize) -> (Option<Header>, Vec<Result<Row>>) {
        let reader = TabularReader::from_reader(data.as_bytes(), header_line).unwrap();
        let header = reader.header().cloned();
        (header, reader.collect())
    }

    #[test]
    fn test_header_on_first_line() {
        let (header, rows) = read_all("id,name\n1,alpha\n2,beta\n", 1);

        let header = header.unwrap();
        assert_eq!(header.columns, vec!["id", "name"]);
        assert_eq!(header.line, 1);

        let rows: Vec<Row> = rows.into_iter().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields(), ["1", "alpha"]);
        assert_eq!(rows[1].line(), 3);
    }

    #[test]
    fn test_lines_before_header_are_skipped() {
        let data = "Exported asset report\ngenerated 2026-10-01,by scanner,v2\nid,name\n7,gamma\n";
        let (header, rows) = read_all(data, 3);

        assert_eq!(header.unwrap().columns, vec!["id", "name"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().fields(), ["7", "gamma"]);
    }

    #[test]
    fn test_blank_line_before_header_counts_as_a_line() {
        let (header, rows) = read_all("Asset export\n\nid,name\n1,alpha\n2,beta\n", 3);

        let header = header.unwrap();
        assert_eq!(header.columns, vec!["id", "name"]);
        assert_eq!(header.line, 3);

        let rows: Vec<Row> = rows.into_iter().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields(), ["1", "alpha"]);
        assert_eq!(rows[0].line(), 4);
    }

    #[test]
    fn test_blank_data_lines_keep_physical_line_numbers() {
        let (_, rows) = read_all("id,name\n1,alpha\n\n2,beta\n\r\n3\n", 1);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].as_ref().unwrap().line(), 4);
        match &rows[2] {
            Err(CsvupError::MalformedRecord { line, .. }) => assert_eq!(*line, 6),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_crlf_and_multiline_fields_keep_line_numbers() {
        let data = "id,notes\r\n1,\"first\r\nsecond\"\r\n2,plain\r\n";
        let (header, rows) = read_all(data, 1);

        assert_eq!(header.unwrap().columns, vec!["id", "notes"]);
        let rows: Vec<Row> = rows.into_iter().map(Result::unwrap).collect();
        assert_eq!(rows[0].line(), 2);
        assert_eq!(rows[0].fields()[1], "first\r\nsecond");
        assert_eq!(rows[1].line(), 4);
        assert_eq!(rows[1].fields(), ["2", "plain"]);
    }

    #[test]
    fn test_quoted_fields_with_delimiters_and_newlines() {
        let data = "id,notes\n1,\"rack 4, row 2\"\n2,\"multi\nline\"\n";
        let (_, rows) = read_all(data, 1);

        let rows: Vec<Row> = rows.into_iter().map(Result::unwrap).collect();
        assert_eq!(rows[0].fields()[1], "rack 4, row 2");
        assert_eq!(rows[1].fields()[1], "multi\nline");
    }

    #[test]
    fn test_field_count_mismatch_is_fatal() {
        let (_, rows) = read_all("id,name\n1,alpha\n2,beta,extra\n3,gamma\n", 1);

        assert_eq!(rows.len(), 2, "iteration stops at the malformed record");
        assert!(rows[0].is_ok());
        match &rows[1] {
            Err(CsvupError::MalformedRecord { line, message }) => {
                assert_eq!(*line, 3);
                assert!(message.contains("expected 2 fields, found 3"));
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_source_has_no_header_and_no_rows() {
        let (header, rows) = read_all("", 1);
        assert!(header.is_none());
        assert!(rows.is_empty());

        let (header, rows) = read_all("title only\n", 2);
        assert!(header.is_none());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_header_only_source_has_no_rows() {
        let (header, rows) = read_all("id,name\n", 1);
        assert!(header.is_some());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let result = TabularReader::open(Path::new("/nonexistent/csvup/input.csv"), 1);
        assert!(matches!(result, Err(CsvupError::SourceUnavailable { .. })));
    }

    #[test]
    fn test_scan_counts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.csv");
        std::fs::write(&path, "id\n1\n2\n3\n").unwrap();

        assert_eq!(TabularReader::scan(&path, 1).unwrap(), 3);
    }

    #[test]
    fn test_encoded_len_matches_joined_row() {
        let row = Row::new(2, vec!["ab".to_string(), "c".to_string()]);
        assert_eq!(row.encoded_len(), "ab,c\n".len() as u64);
    }
}
