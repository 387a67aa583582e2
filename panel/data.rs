//! # Raw Table Loading
//!
//! Entry point for user-provided FRED-MD files. The loader reads the CSV with
//! polars, keeps the `sasdate` column as text and every other column as `f64`
//! (empty cells become `NaN`), and hands the result over as a [`RawTable`].
//!
//! [`write_dataset`] goes the other way and writes a prepared train/test split
//! back to CSV.
//!
//! Nothing here knows about transformation codes. Whether row 0 is a code row
//! is decided later by the store's format policy.

use crate::types::{Dataset, Panel};
use chrono::NaiveDate;
use ndarray::{Array2, ShapeBuilder};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Name of the date column in every FRED-MD vintage.
pub const DATE_COLUMN: &str = "sasdate";

/// Date layouts tried in order. FRED-MD itself writes `m/d/YYYY`.
const DATE_FORMATS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV writer error: {0}")]
    CsvError(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Malformed date column at row {row}: '{value}' ({reason}).")]
    MalformedDateColumn {
        row: usize,
        value: String,
        reason: &'static str,
    },
    #[error("The input table has no rows.")]
    EmptyTable,
    #[error(
        "Table shape mismatch: {labels} date labels and {columns} column names for a {rows}x{cols} value matrix."
    )]
    ShapeMismatch {
        labels: usize,
        columns: usize,
        rows: usize,
        cols: usize,
    },
}

/// An untyped panel as it comes off disk.
#[derive(Clone, Debug)]
pub struct RawTable {
    /// One label per row, straight from the date column.
    pub date_labels: Vec<String>,
    /// Numeric column names, date column excluded.
    pub columns: Vec<String>,
    /// Shape: [n_rows, n_columns].
    pub values: Array2<f64>,
}

impl RawTable {
    pub fn new(
        date_labels: Vec<String>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, DataError> {
        if date_labels.len() != values.nrows() || columns.len() != values.ncols() {
            return Err(DataError::ShapeMismatch {
                labels: date_labels.len(),
                columns: columns.len(),
                rows: values.nrows(),
                cols: values.ncols(),
            });
        }
        Ok(Self {
            date_labels,
            columns,
            values,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.date_labels.len()
    }
}

/// Reads a comma separated FRED-MD style file.
pub fn load_raw_table(path: &Path) -> Result<RawTable, DataError> {
    log::info!("Loading raw panel from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::EmptyTable);
    }

    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    if !names.iter().any(|n| n == DATE_COLUMN) {
        return Err(DataError::ColumnNotFound(DATE_COLUMN.to_string()));
    }

    let date_labels = extract_text_column(&df, DATE_COLUMN)?;
    let columns: Vec<String> = names.into_iter().filter(|n| n != DATE_COLUMN).collect();

    let n_rows = df.height();
    let mut buffer = Vec::with_capacity(n_rows * columns.len());
    for name in &columns {
        buffer.append(&mut extract_numeric_column(&df, name)?);
    }
    let values = Array2::from_shape_vec((n_rows, columns.len()).f(), buffer).map_err(|_| {
        DataError::ShapeMismatch {
            labels: date_labels.len(),
            columns: columns.len(),
            rows: n_rows,
            cols: columns.len(),
        }
    })?;

    log::info!(
        "Loaded {} rows and {} numeric columns",
        n_rows,
        columns.len()
    );
    RawTable::new(date_labels, columns, values)
}

fn extract_text_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    let casted = df.column(column_name)?.cast(&DataType::String)?;
    let text = casted.str()?;
    Ok(text
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        })?;

    // The cast is non-strict: unparsable text turns into nulls, so any null that was not
    // already there means the column was not numeric.
    if casted.null_count() > series.null_count() {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        });
    }

    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Parses one date label, trying each supported layout.
pub fn parse_date(label: &str) -> Option<NaiveDate> {
    let trimmed = label.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Parses a run of date labels and checks they are strictly increasing.
///
/// `row_offset` is added to reported row numbers so errors point at the row of
/// the original file.
pub fn parse_date_column(labels: &[String], row_offset: usize) -> Result<Vec<NaiveDate>, DataError> {
    let mut dates: Vec<NaiveDate> = Vec::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        let date = parse_date(label).ok_or_else(|| DataError::MalformedDateColumn {
            row: i + row_offset,
            value: label.clone(),
            reason: "not a calendar date",
        })?;
        if let Some(previous) = dates.last() {
            if date <= *previous {
                return Err(DataError::MalformedDateColumn {
                    row: i + row_offset,
                    value: label.clone(),
                    reason: "dates must be unique and strictly increasing",
                });
            }
        }
        dates.push(date);
    }
    Ok(dates)
}

/// Writes `train.csv` and `test.csv` into `dir`.
///
/// Each file starts with `sasdate`, then the dependent variable, then the
/// feature columns. Only the first test row carries a label; any further rows
/// in the test month get an empty label cell. Missing values are written empty.
pub fn write_dataset(dir: &Path, dependent: &str, dataset: &Dataset) -> Result<(), DataError> {
    write_split(
        &dir.join("train.csv"),
        dependent,
        &dataset.train_features,
        dataset.train_labels.iter().copied(),
    )?;
    let test_labels = std::iter::once(dataset.test_label)
        .chain(std::iter::repeat(f64::NAN))
        .take(dataset.test_features.n_rows());
    write_split(
        &dir.join("test.csv"),
        dependent,
        &dataset.test_features,
        test_labels,
    )
}

fn write_split<I>(path: &Path, dependent: &str, features: &Panel, labels: I) -> Result<(), DataError>
where
    I: Iterator<Item = f64>,
{
    let mut writer = csv::Writer::from_writer(File::create(path)?);

    let mut header = vec![DATE_COLUMN.to_string(), dependent.to_string()];
    header.extend(features.columns.iter().cloned());
    writer.write_record(&header)?;

    for ((date, row), label) in features
        .dates
        .iter()
        .zip(features.values.rows())
        .zip(labels)
    {
        let mut record = Vec::with_capacity(row.len() + 2);
        record.push(date.format("%Y-%m-%d").to_string());
        record.push(format_value(label));
        record.extend(row.iter().map(|&v| format_value(v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
