use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use bincode::Options;
use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::contact_id::LabelIndex;
use crate::error::{Error, Result};
use crate::frequency_dictionary::ContactDictionary;

const BINARY_MAGIC: [u8; 4] = *b"CFT1";

/// Contact frequencies: one row per condition, one column per contact.
///
/// Conditions are numeric labels (replica index or temperature). Tables are
/// not modified in place; filters and relabelling return new tables.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    conditions: Vec<f64>,
    contacts: LabelIndex,
    values: DMatrix<f64>,
}

#[derive(Serialize, Deserialize)]
struct SerializedTable {
    magic: [u8; 4],
    conditions: Vec<f64>,
    contacts: Vec<String>,
    /// Column-major, `conditions.len()` values per contact.
    values: Vec<f64>,
}

impl FrequencyTable {
    pub fn new(conditions: Vec<f64>, contacts: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        let n_contacts = contacts.len();
        let contacts = LabelIndex::from(contacts);
        if contacts.len() != n_contacts {
            return Err(Error::Shape("duplicate contact labels".to_string()));
        }
        if values.nrows() != conditions.len() || values.ncols() != contacts.len() {
            return Err(Error::Shape(format!(
                "{}x{} values for {} conditions and {} contacts",
                values.nrows(),
                values.ncols(),
                conditions.len(),
                contacts.len()
            )));
        }
        Ok(Self {
            conditions,
            contacts,
            values,
        })
    }

    /// Table with one row per replica, labelled `0..n_replicas`.
    pub fn from_dictionary(dict: ContactDictionary) -> Self {
        let (contacts, columns, n_replicas) = dict.into_parts();
        let values = DMatrix::from_fn(n_replicas, contacts.len(), |row, col| columns[col][row]);
        Self {
            conditions: (0..n_replicas).map(|i| i as f64).collect(),
            contacts,
            values,
        }
    }

    /// Load a table written by [`write_csv`](Self::write_csv) or
    /// [`write_binary`](Self::write_binary).
    ///
    /// `.csv` files are read as CSV; anything else must be a binary table.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if ext == "csv" {
            return Self::read_csv(path);
        }

        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        Self::decode_binary(&bytes).ok_or_else(|| Error::UnsupportedFormat {
            path: path.to_path_buf(),
        })?
    }

    fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let contacts: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();

        let mut conditions = Vec::new();
        let mut flat = Vec::new();
        for (row_no, record) in reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let condition = fields.next().unwrap_or("");
            conditions.push(
                condition
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| Error::parse(format!("condition '{condition}' in row {row_no}"), e))?,
            );
            for (col, field) in fields.enumerate() {
                let value = field
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| Error::parse(format!("row {row_no}, column {}", col + 1), e))?;
                flat.push(value);
            }
        }

        if flat.len() != conditions.len() * contacts.len() {
            return Err(Error::Shape(format!(
                "{} values for {} rows of {} contacts",
                flat.len(),
                conditions.len(),
                contacts.len()
            )));
        }
        let values = DMatrix::from_row_slice(conditions.len(), contacts.len(), &flat);
        debug!("Read {}x{} table from {}", conditions.len(), contacts.len(), path.display());
        Self::new(conditions, contacts, values)
    }

    /// `None` when the bytes are not a binary table at all.
    fn decode_binary(bytes: &[u8]) -> Option<Result<Self>> {
        let table: SerializedTable = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(bytes.len() as u64)
            .deserialize(bytes)
            .ok()?;
        if table.magic != BINARY_MAGIC {
            return None;
        }
        let (n_rows, n_cols) = (table.conditions.len(), table.contacts.len());
        if table.values.len() != n_rows * n_cols {
            return Some(Err(Error::Shape(format!(
                "{} values for {} rows of {} contacts",
                table.values.len(),
                n_rows,
                n_cols
            ))));
        }
        let values = DMatrix::from_vec(n_rows, n_cols, table.values);
        Some(Self::new(table.conditions, table.contacts, values))
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;

        let mut header = vec![String::new()];
        header.extend(self.contacts.iter().map(str::to_string));
        writer.write_record(&header)?;

        for (row, condition) in self.conditions.iter().enumerate() {
            let mut record = vec![condition.to_string()];
            record.extend(self.values.row(row).iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let table = SerializedTable {
            magic: BINARY_MAGIC,
            conditions: self.conditions.clone(),
            contacts: self.contacts.as_slice().to_vec(),
            values: self.values.as_slice().to_vec(),
        };
        let writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(writer, &table)?;
        Ok(())
    }

    /// Replace the condition labels positionally, e.g. with temperatures.
    ///
    /// Extra labels are ignored; rows past the end of `labels` keep theirs.
    pub fn with_conditions(mut self, labels: &[f64]) -> Self {
        for (condition, label) in self.conditions.iter_mut().zip(labels) {
            *condition = *label;
        }
        self
    }

    /// Same values under new contact labels.
    pub fn with_contacts(&self, contacts: Vec<String>) -> Result<Self> {
        Self::new(self.conditions.clone(), contacts, self.values.clone())
    }

    pub fn n_conditions(&self) -> usize {
        self.conditions.len()
    }

    pub fn n_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn conditions(&self) -> &[f64] {
        &self.conditions
    }

    pub fn contacts(&self) -> &LabelIndex {
        &self.contacts
    }

    /// The underlying conditions x contacts matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn position(&self, contact: &str) -> Option<usize> {
        self.contacts.position(contact)
    }

    /// All frequencies of the contact at column `col`.
    pub fn column_at(&self, col: usize) -> &[f64] {
        let n = self.conditions.len();
        &self.values.as_slice()[col * n..(col + 1) * n]
    }

    pub fn column(&self, contact: &str) -> Option<&[f64]> {
        self.position(contact).map(|col| self.column_at(col))
    }

    pub fn value(&self, condition: usize, contact: &str) -> Option<f64> {
        let col = self.position(contact)?;
        self.column_at(col).get(condition).copied()
    }

    /// New table holding only the given columns, in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> Self {
        let contacts: LabelIndex = columns
            .iter()
            .filter_map(|&col| self.contacts.get(col))
            .map(str::to_string)
            .collect();
        let values = self.values.select_columns(columns.iter());
        Self {
            conditions: self.conditions.clone(),
            contacts,
            values,
        }
    }

    /// Positional row range clamped to the table.
    pub(crate) fn clamp_rows(&self, range: Option<Range<usize>>) -> Range<usize> {
        let n = self.conditions.len();
        match range {
            Some(r) => {
                let end = r.end.min(n);
                r.start.min(end)..end
            }
            None => 0..n,
        }
    }
}

/// Summary statistic placed in each heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatmapFormat {
    Mean,
    /// Sample standard deviation across conditions.
    Stdev,
    /// Last condition minus first condition.
    Difference,
}

impl FromStr for HeatmapFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "stdev" | "std" => Ok(Self::Stdev),
            "difference" | "diff" => Ok(Self::Difference),
            other => Err(format!("unknown heatmap format '{other}' (mean, stdev, difference)")),
        }
    }
}

impl fmt::Display for HeatmapFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Stdev => write!(f, "stdev"),
            Self::Difference => write!(f, "difference"),
        }
    }
}

/// Symmetric residue x residue matrix labelled by `chain+resid`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub labels: Vec<String>,
    pub values: DMatrix<f64>,
}

impl Heatmap {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[(i, j)])
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut header = vec![String::new()];
        header.extend(self.labels.iter().cloned());
        writer.write_record(&header)?;
        for (i, label) in self.labels.iter().enumerate() {
            let mut record = vec![label.clone()];
            record.extend(self.values.row(i).iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency_dictionary::FrequencyDictionaryBuilder;
    use std::io::Cursor;

    fn sample() -> FrequencyTable {
        let mut builder = FrequencyDictionaryBuilder::new();
        for text in ["A:ALA:10 A:GLY:20 0.5\nA:SER:3 B:LYS:40 0.25\n", "A:ALA:10 A:GLY:20 0.75\n"] {
            builder.add_replica(Cursor::new(text)).unwrap();
        }
        FrequencyTable::from_dictionary(builder.build())
    }

    #[test]
    fn test_from_dictionary_layout() {
        let table = sample();
        assert_eq!(table.n_conditions(), 2);
        assert_eq!(table.n_contacts(), 2);
        assert_eq!(table.conditions(), &[0.0, 1.0]);
        assert_eq!(table.column("A:ALA:10-A:GLY:20").unwrap(), &[0.5, 0.75]);
        assert_eq!(table.column("A:SER:3-B:LYS:40").unwrap(), &[0.25, 0.0]);
        assert_eq!(table.value(1, "A:ALA:10-A:GLY:20"), Some(0.75));
    }

    #[test]
    fn test_with_conditions() {
        let table = sample().with_conditions(&[300.0]);
        assert_eq!(table.conditions(), &[300.0, 1.0]);
        let table = table.with_conditions(&[300.0, 310.0, 320.0]);
        assert_eq!(table.conditions(), &[300.0, 310.0]);
    }

    #[test]
    fn test_shape_checked() {
        let err = FrequencyTable::new(vec![0.0], vec!["a".into(), "b".into()], DMatrix::zeros(1, 3));
        assert!(matches!(err, Err(Error::Shape(_))));
        let dup = FrequencyTable::new(vec![0.0], vec!["a".into(), "a".into()], DMatrix::zeros(1, 2));
        assert!(matches!(dup, Err(Error::Shape(_))));
    }

    #[test]
    fn test_csv_and_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample().with_conditions(&[300.0, 310.5]);

        let csv_path = dir.path().join("freqs.csv");
        table.write_csv(&csv_path).unwrap();
        assert_eq!(FrequencyTable::from_path(&csv_path).unwrap(), table);

        let bin_path = dir.path().join("freqs.tbl");
        table.write_binary(&bin_path).unwrap();
        assert_eq!(FrequencyTable::from_path(&bin_path).unwrap(), table);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freqs.xlsx");
        std::fs::write(&path, b"definitely not a table").unwrap();
        assert!(matches!(
            FrequencyTable::from_path(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_select_columns() {
        let table = sample();
        let selected = table.select_columns(&[1]);
        assert_eq!(selected.contacts().as_slice(), &["A:SER:3-B:LYS:40"]);
        assert_eq!(selected.column_at(0), &[0.25, 0.0]);
        assert_eq!(table.n_contacts(), 2);
    }

    #[test]
    fn test_heatmap_format_parse() {
        assert_eq!("Mean".parse::<HeatmapFormat>().unwrap(), HeatmapFormat::Mean);
        assert_eq!("stdev".parse::<HeatmapFormat>().unwrap(), HeatmapFormat::Stdev);
        assert!("median".parse::<HeatmapFormat>().is_err());
    }
}
