//! Grouping of the row stream into bounded upload units

use crate::reader::{Header, Row, DELIMITER, QUOTE};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use csvup_common::{CsvupError, Result};
use std::sync::Arc;

/// Rows sent in a single HTTP request, with the header they belong to
#[derive(Debug, Clone)]
pub struct Chunk {
    index: usize,
    header: Arc<Header>,
    rows: Vec<Row>,
}

impl Chunk {
    pub fn new(index: usize, header: Arc<Header>, rows: Vec<Row>) -> Self {
        Self {
            index,
            header,
            rows,
        }
    }

    /// 1-based position of this chunk in the source
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Source line of the first row
    pub fn first_line(&self) -> Option<u64> {
        self.rows.first().map(Row::line)
    }

    /// Name of the uploaded file: `<stem>_<index>.csv`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}_{}.csv", stem, self.index)
    }

    /// Serialize as CSV: the header row, then every data row
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .quote(QUOTE)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer
            .write_record(&self.header.columns)
            .map_err(std::io::Error::from)?;
        for row in &self.rows {
            writer
                .write_record(row.fields())
                .map_err(std::io::Error::from)?;
        }

        writer.into_inner().map_err(|e| e.into_error().into())
    }
}

/// Lazily splits a row stream into chunks of at most `chunk_size` rows
///
/// Concatenating the rows of every chunk reproduces the input in order. Only
/// the last chunk may be short, unless a byte bound is also set.
pub struct Chunker<I> {
    rows: I,
    header: Arc<Header>,
    chunk_size: usize,
    max_bytes: Option<u64>,
    next_index: usize,
    pending: Option<Row>,
    done: bool,
}

impl<I> Chunker<I>
where
    I: Iterator<Item = Result<Row>>,
{
    /// Fails with `InvalidConfiguration` for a non-positive size, before any row is read
    pub fn new(rows: I, header: Header, chunk_size: i64) -> Result<Self> {
        let chunk_size = usize::try_from(chunk_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                CsvupError::invalid_config(format!("chunkSize must be positive, got {}", chunk_size))
            })?;

        Ok(Self {
            rows,
            header: Arc::new(header),
            chunk_size,
            max_bytes: None,
            next_index: 1,
            pending: None,
            done: false,
        })
    }

    /// Additionally close a chunk before its rows exceed `max_bytes`
    ///
    /// A single row larger than the bound still forms a chunk of its own.
    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl<I> Iterator for Chunker<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.pending.is_none() {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_size.min(4096));
        let mut bytes = 0u64;

        if let Some(row) = self.pending.take() {
            bytes += row.encoded_len();
            rows.push(row);
        }

        while rows.len() < self.chunk_size && !self.done {
            match self.rows.next() {
                None => self.done = true,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                },
                Some(Ok(row)) => {
                    let size = row.encoded_len();
                    if let Some(max) = self.max_bytes {
                        if !rows.is_empty() && bytes + size > max {
                            self.pending = Some(row);
                            break;
                        }
                    }
                    bytes += size;
                    rows.push(row);
                },
            }
        }

        if rows.is_empty() {
            return None;
        }

        let chunk = Chunk::new(self.next_index, Arc::clone(&self.header), rows);
        self.next_index += 1;
        Some(Ok(chunk))
    }
}
