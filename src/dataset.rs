//! Tabular datasets and their CSV representation.

use crate::model::Value;
use anyhow::{Context, Result, bail};
use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::Write,
    path::Path,
};

/// Record of a dataset, mapping column names to values.
///
/// Columns absent from a record are written as blank fields.
pub type Record = BTreeMap<String, Value>;

/// Ordered records with an explicit column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Create an empty dataset with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            records: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Write the dataset to a CSV file.
    ///
    /// Records are checked against the columns before the file is created,
    /// so an invalid dataset never leaves a file behind.
    pub fn write_csv<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        self.check_records().context("failed to check records")?;

        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        self.write_to(file)
    }

    /// Write the dataset as CSV to any writer.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        self.check_records().context("failed to check records")?;

        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&self.columns)
            .context("failed to write header")?;
        for (i_rec, record) in self.records.iter().enumerate() {
            let fields = self.columns.iter().map(|col| match record.get(col) {
                Some(value) => value.to_string(),
                None => String::new(),
            });
            writer
                .write_record(fields)
                .with_context(|| format!("failed to write record {i_rec}"))?;
        }
        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Read a dataset from a CSV file.
    ///
    /// Blank fields are left out of the records and numeric text is parsed back into numbers.
    pub fn read_csv<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let mut reader =
            csv::Reader::from_path(file).with_context(|| format!("failed to open {file:?}"))?;

        let header = reader.headers().context("failed to read header")?;
        let mut dataset = Dataset::new(header.iter());

        for (i_rec, row) in reader.records().enumerate() {
            let row = row.with_context(|| format!("failed to read record {i_rec}"))?;
            let record = dataset
                .columns
                .iter()
                .zip(row.iter())
                .filter_map(|(col, text)| Value::parse(text).map(|value| (col.clone(), value)))
                .collect();
            dataset.records.push(record);
        }

        Ok(dataset)
    }

    fn check_records(&self) -> Result<()> {
        let columns: HashSet<_> = self.columns.iter().map(String::as_str).collect();
        if columns.len() != self.columns.len() {
            bail!("column names must be unique");
        }
        for (i_rec, record) in self.records.iter().enumerate() {
            if let Some(key) = record.keys().find(|key| !columns.contains(key.as_str())) {
                bail!("record {i_rec} has field {key:?} outside the columns");
            }
        }
        Ok(())
    }
}

/// Copy the rows of the first `n_keys` distinct values of `key_column` from
/// one CSV file to another.
///
/// Fields are copied verbatim, keys are taken in order of first appearance and
/// row order is preserved. Rows with a blank key are dropped. Returns the
/// numbers of rows kept and read.
pub fn subset_csv<P, Q>(src: P, dst: Q, key_column: &str, n_keys: usize) -> Result<(usize, usize)>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let src = src.as_ref();
    let mut reader =
        csv::Reader::from_path(src).with_context(|| format!("failed to open {src:?}"))?;

    let header = reader.headers().context("failed to read header")?.clone();
    let i_key = header
        .iter()
        .position(|col| col == key_column)
        .with_context(|| format!("dataset has no column named {key_column:?}"))?;

    let mut keys = HashSet::new();
    let mut rows = Vec::new();
    let mut n_read = 0;
    for (i_rec, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("failed to read record {i_rec}"))?;
        n_read += 1;

        let key = row.get(i_key).unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        if !keys.contains(key) {
            if keys.len() == n_keys {
                continue;
            }
            keys.insert(key.to_string());
        }
        rows.push(row);
    }

    let dst = dst.as_ref();
    let mut writer =
        csv::Writer::from_path(dst).with_context(|| format!("failed to create {dst:?}"))?;
    writer.write_record(&header).context("failed to write header")?;
    for (i_rec, row) in rows.iter().enumerate() {
        writer
            .write_record(row)
            .with_context(|| format!("failed to write record {i_rec}"))?;
    }
    writer.flush().context("failed to flush writer stream")?;

    Ok((rows.len(), n_read))
}
