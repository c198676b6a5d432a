use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::WriterBuilder;
use log::{info, warn};

use crate::error::CrawlError;

/// UTF-8 byte-order mark written ahead of every table file.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Cells of one rendered table row, raw text only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Column names captured from the first page that had them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    names: Vec<String>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    Named(Header),
    /// Labelled `0..width`; used for every row when no header fits all rows.
    Positional { width: usize },
}

impl Columns {
    pub fn width(&self) -> usize {
        match self {
            Columns::Named(header) => header.len(),
            Columns::Positional { width } => *width,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        match self {
            Columns::Named(header) => header.names().to_vec(),
            Columns::Positional { width } => (0..*width).map(|i| i.to_string()).collect(),
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Columns::Named(_))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        match self {
            Columns::Named(header) => header.position(name),
            Columns::Positional { width } => name.parse::<usize>().ok().filter(|i| i < width),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    columns: Columns,
    rows: Vec<Row>,
}

impl RawTable {
    pub fn empty() -> Self {
        Self {
            columns: Columns::Positional { width: 0 },
            rows: Vec::new(),
        }
    }

    /// Applies `header` only if it is non-empty and every row has exactly as
    /// many cells; otherwise the whole table goes positional.
    pub fn assemble(header: Header, rows: Vec<Row>) -> Self {
        let widest = rows.iter().map(Row::len).max().unwrap_or(0);

        if header.is_empty() {
            if !rows.is_empty() {
                warn!("No header captured; using positional column labels.");
            }
            return Self {
                columns: Columns::Positional { width: widest },
                rows,
            };
        }

        if let Some(bad) = rows.iter().position(|row| row.len() != header.len()) {
            warn!(
                "Header has {} columns but row {} has {}; falling back to positional labels for all {} rows.",
                header.len(),
                bad,
                rows[bad].len(),
                rows.len()
            );
            return Self {
                columns: Columns::Positional { width: widest },
                rows,
            };
        }

        Self {
            columns: Columns::Named(header),
            rows,
        }
    }

    /// Trusts `header` as-is; rows may be ragged.
    pub fn with_header(header: Header, rows: Vec<Row>) -> Self {
        Self {
            columns: Columns::Named(header),
            rows,
        }
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
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

    /// Writes BOM, labels, then rows padded to the column width. A table with
    /// no columns at all produces an empty file.
    pub fn write_csv(&self, path: &Path) -> Result<(), CrawlError> {
        let io_err = |source| CrawlError::Io {
            path: path.to_path_buf(),
            source,
        };
        let csv_err = |source| CrawlError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(io_err)?;
        let width = self.columns.width();
        if width == 0 {
            info!("Nothing to write; created empty file {:?}", path);
            return Ok(());
        }

        let mut out = BufWriter::new(file);
        out.write_all(UTF8_BOM).map_err(io_err)?;

        let mut writer = WriterBuilder::new().from_writer(out);
        writer.write_record(self.columns.labels()).map_err(csv_err)?;
        for row in &self.rows {
            let padded = (0..width).map(|i| row.get(i).unwrap_or(""));
            writer.write_record(padded).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;

        info!("Wrote {} rows to {:?}", self.rows.len(), path);
        Ok(())
    }
}
