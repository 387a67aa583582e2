use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};

use crate::transform::TransformCode;

/// A date-indexed block of numeric columns.
///
/// The date column lives in `dates` rather than in `values`, so every numeric
/// operation on the panel leaves it untouched. Missing cells are `f64::NAN`.
#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<String>,
    /// Shape: [n_rows, n_columns].
    pub values: Array2<f64>,
}

impl Panel {
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<String>, values: Array2<f64>) -> Self {
        debug_assert_eq!(values.nrows(), dates.len());
        debug_assert_eq!(values.ncols(), columns.len());
        Self {
            dates,
            columns,
            values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Rows whose date lies in `[start, end)`, in panel order.
    pub fn rows_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<usize> {
        self.dates
            .iter()
            .enumerate()
            .filter(|(_, date)| **date >= start && **date < end)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Builds a new panel from the given row and column indices.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Panel {
        let values = self.values.select(Axis(0), rows).select(Axis(1), cols);
        Panel {
            dates: rows.iter().map(|&r| self.dates[r]).collect(),
            columns: cols.iter().map(|&c| self.columns[c].clone()).collect(),
            values,
        }
    }

    /// Values of one column restricted to the given rows.
    pub fn column_rows(&self, col: usize, rows: &[usize]) -> Array1<f64> {
        rows.iter().map(|&r| self.values[[r, col]]).collect()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

/// A column name together with the stationarity transform it was loaded with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub code: TransformCode,
}

/// Supervised-learning split assembled from one panel and one time window.
#[derive(Clone, Debug)]
pub struct Dataset {
    /// Rows in `[begin, end)` with the dependent variable removed.
    pub train_features: Panel,
    /// Dependent variable aligned with `train_features.dates`.
    pub train_labels: Array1<f64>,
    /// Rows in `[end, end + 1 month)` with the dependent variable removed.
    pub test_features: Panel,
    /// Dependent variable on the first row of the test window.
    pub test_label: f64,
}
