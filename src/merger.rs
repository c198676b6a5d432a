use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::WriterBuilder;
use log::{error, info, warn};

use crate::config::{ComponentField, MergeConfig};
use crate::error::MergeError;
use crate::input_loader;
use crate::table::{RawTable, Row, UTF8_BOM};

/// One input row seen through the merge columns. Absent fields read as "".
#[derive(Debug, Clone, Default)]
pub struct MergeRecord {
    pub identity: String,
    values: HashMap<String, String>,
}

impl MergeRecord {
    pub fn new(identity: &str) -> Self {
        MergeRecord {
            identity: identity.to_string(),
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.values.insert(column.to_string(), value.to_string());
        self
    }

    pub fn field(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Builds the labelled block for one record, in `fields` order. Blank fields
/// are left out; lines are newline-joined with no trailing newline.
pub fn format_entry(record: &MergeRecord, fields: &[ComponentField]) -> String {
    fields
        .iter()
        .filter_map(|f| {
            let value = record.field(&f.column).trim();
            (!value.is_empty()).then(|| format!("{}: {}", f.label, value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Joins a group's entries, skipping blank ones.
pub fn join_entries<S: AsRef<str>>(entries: &[S], separator: &str) -> String {
    entries
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|entry| !entry.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub identity: String,
    pub merged: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecordSet {
    pub identity_column: String,
    pub merged_column: String,
    pub records: Vec<MergedRecord>,
}

impl MergedRecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.identity == identity)
            .map(|r| r.merged.as_str())
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), MergeError> {
        let io_err = |source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        };
        let csv_err = |source| MergeError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
        out.write_all(UTF8_BOM).map_err(io_err)?;

        let mut writer = WriterBuilder::new().from_writer(out);
        writer
            .write_record([&self.identity_column, &self.merged_column])
            .map_err(csv_err)?;
        for record in &self.records {
            writer
                .write_record([&record.identity, &record.merged])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub input_rows: usize,
    pub dropped_rows: usize,
    pub records: usize,
    pub missing_columns: Vec<String>,
}

/// Resolved column positions for one input table.
struct Layout {
    identity: usize,
    fields: Vec<(usize, ComponentField)>,
    missing: Vec<String>,
}

pub struct ResumeMerger {
    config: MergeConfig,
}

impl ResumeMerger {
    pub fn new(config: MergeConfig) -> Self {
        ResumeMerger { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Load, merge, write. Nothing is written unless the merge succeeds.
    pub fn run(&self) -> Result<(MergedRecordSet, MergeReport), MergeError> {
        info!("Reading input file: {:?}", self.config.input_path);
        let table = input_loader::load_table(&self.config.input_path)?;
        info!("Input columns: {:?}", table.columns().labels());

        let (merged, report) = self.merge(&table).inspect_err(|e| error!("{}", e))?;

        merged.write_csv(&self.config.output_path)?;
        info!(
            "Merged data saved to {:?} ({} records).",
            self.config.output_path,
            merged.len()
        );
        Ok((merged, report))
    }

    pub fn merge(&self, table: &RawTable) -> Result<(MergedRecordSet, MergeReport), MergeError> {
        let mut report = MergeReport {
            input_rows: table.len(),
            ..MergeReport::default()
        };

        if table.is_empty() && table.columns().width() == 0 {
            warn!("Input has no columns and no rows; producing an empty result.");
            return Ok((self.empty_set(), report));
        }

        let layout = self.layout(table)?;
        report.missing_columns = layout.missing.clone();

        let fields: Vec<ComponentField> = layout.fields.iter().map(|(_, f)| f.clone()).collect();
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();

        for row in table.rows() {
            let identity = cell(row, layout.identity).trim();
            if identity.is_empty() {
                report.dropped_rows += 1;
                continue;
            }

            let record = layout
                .fields
                .iter()
                .fold(MergeRecord::new(identity), |record, (index, field)| {
                    record.with(&field.column, cell(row, *index))
                });
            let entry = format_entry(&record, &fields);

            groups
                .entry(record.identity.clone())
                .or_insert_with(|| {
                    order.push(record.identity.clone());
                    Vec::new()
                })
                .push(entry);
        }

        if report.dropped_rows > 0 {
            info!("Dropped {} rows with an empty identity.", report.dropped_rows);
        }

        let records: Vec<MergedRecord> = order
            .into_iter()
            .map(|identity| {
                let merged = groups
                    .get(&identity)
                    .map(|entries| join_entries(entries.as_slice(), &self.config.separator))
                    .unwrap_or_default();
                MergedRecord { identity, merged }
            })
            .collect();
        report.records = records.len();
        info!("Merge complete: {} distinct identities.", records.len());

        Ok((
            MergedRecordSet {
                records,
                ..self.empty_set()
            },
            report,
        ))
    }

    fn empty_set(&self) -> MergedRecordSet {
        MergedRecordSet {
            identity_column: self.config.identity_column.clone(),
            merged_column: self.config.merged_column.clone(),
            records: Vec::new(),
        }
    }

    fn layout(&self, table: &RawTable) -> Result<Layout, MergeError> {
        let columns = table.columns();
        let identity = columns
            .position(&self.config.identity_column)
            .ok_or_else(|| MergeError::MissingIdentityColumn {
                column: self.config.identity_column.clone(),
                available: columns.labels(),
            })?;

        let mut fields = Vec::new();
        let mut missing = Vec::new();
        for field in &self.config.component_fields {
            match columns.position(&field.column) {
                Some(index) => fields.push((index, field.clone())),
                None => missing.push(field.column.clone()),
            }
        }

        if fields.is_empty() {
            return Err(MergeError::NoComponentColumnsAvailable { wanted: missing });
        }
        if !missing.is_empty() {
            warn!(
                "Component columns missing, merging with the rest only: {:?}",
                missing
            );
        }

        Ok(Layout {
            identity,
            fields,
            missing,
        })
    }
}

fn cell(row: &Row, index: usize) -> &str {
    row.get(index).unwrap_or("")
}
