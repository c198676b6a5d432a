use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::MergeError;
use crate::table::{Header, RawTable, Row, UTF8_BOM};

/// Reads a crawl output file back into a table. The first record is the
/// header; a zero-byte (or BOM-only) file yields an empty table.
pub fn load_table<P: AsRef<Path>>(filename: P) -> Result<RawTable, MergeError> {
    let path = filename.as_ref();
    let bytes = fs::read(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);

    if content.iter().all(u8::is_ascii_whitespace) {
        warn!("Input file {:?} is empty.", path);
        return Ok(RawTable::empty());
    }

    let csv_err = |source| MergeError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let header = Header::new(
        rdr.headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect(),
    );

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        rows.push(record.iter().collect::<Row>());
    }

    info!("Loaded {} rows from CSV {:?}", rows.len(), path);
    Ok(RawTable::with_header(header, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn strips_bom_and_keeps_multiline_cells() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(UTF8_BOM).unwrap();
        file.write_all("姓名Name,原因Reason\n王小明,\"line one\nline two\"\n李四\n".as_bytes())
            .unwrap();

        let table = load_table(file.path()).unwrap();
        assert_eq!(table.columns().labels(), vec!["姓名Name", "原因Reason"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get(1), Some("line one\nline two"));
        assert_eq!(table.rows()[1].get(1), None);
    }

    #[test]
    fn zero_byte_file_is_empty_table() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let table = load_table(file.path()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().width(), 0);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_table("/definitely/not/here.csv").unwrap_err();
        match err {
            MergeError::Io { path, .. } => assert!(path.ends_with("here.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
