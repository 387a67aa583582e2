//! # Panel Store
//!
//! Owns the two views of one macro panel and answers dataset queries against
//! either of them.
//!
//! - `original`: dates parsed, code row stripped, untransformed.
//! - `derived`: the stationary view built by the transform engine. It shares
//!   the original's columns and its dates are the original's minus the first
//!   [`LEADING_ROWS_DROPPED`](crate::transform::LEADING_ROWS_DROPPED).
//!
//! Only recognized FRED-MD formats get a derived view. For anything else the
//! store keeps the original panel alone and every derived-only operation fails
//! with [`PanelError::DerivedUnavailable`].

use ahash::AHashSet;
use chrono::{Months, NaiveDate};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::default_recognized_formats;
use crate::data::{DataError, RawTable, parse_date_column};
use crate::impute::impute_column_means;
use crate::outliers::remove_outliers;
use crate::reduce::{CovarianceEigen, PcaBackend, ReduceError, reduce};
use crate::transform::{TransformCode, TransformError, transform_panel};
use crate::types::{ColumnSpec, Dataset, Panel};

#[derive(Error, Debug)]
pub enum PanelError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("Dimensionality reduction failed: {0}")]
    Reduce(#[from] ReduceError),
    #[error("No row falls in the test window [{start}, {end}).")]
    EmptyTestWindow { start: NaiveDate, end: NaiveDate },
    #[error("The dependent variable '{0}' is not a column of the panel.")]
    UnknownDependentVariable(String),
    #[error(
        "Store '{0}' was loaded from an unrecognized format and has no derived panel. Use the original view or a recognized source."
    )]
    DerivedUnavailable(String),
    #[error("Cannot compute the month after {0}: date out of range.")]
    DateOutOfRange(NaiveDate),
}

/// How the raw table is interpreted, decided once from the source tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatPolicy {
    /// Row 0 holds transformation codes; a derived panel is built.
    Recognized,
    /// Every row is data; no codes, no derived panel.
    Unrecognized,
}

impl FormatPolicy {
    pub fn detect<S: AsRef<str>>(name: &str, recognized: &[S]) -> Self {
        if recognized.iter().any(|tag| tag.as_ref() == name) {
            FormatPolicy::Recognized
        } else {
            FormatPolicy::Unrecognized
        }
    }
}

/// Which of the two panels a query reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelView {
    #[default]
    Original,
    Derived,
}

/// Parameters of one dataset request. Unset bounds fall back to the store's.
#[derive(Clone, Debug)]
pub struct DatasetQuery<'a> {
    pub dependent: &'a str,
    pub begin: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub columns: Option<&'a [String]>,
    pub view: PanelView,
}

impl<'a> DatasetQuery<'a> {
    pub fn new(dependent: &'a str) -> Self {
        Self {
            dependent,
            begin: None,
            end: None,
            columns: None,
            view: PanelView::Original,
        }
    }

    pub fn between(mut self, begin: NaiveDate, end: NaiveDate) -> Self {
        self.begin = Some(begin);
        self.end = Some(end);
        self
    }

    pub fn with_columns(mut self, columns: &'a [String]) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn view(mut self, view: PanelView) -> Self {
        self.view = view;
        self
    }
}

/// Top-ranked variables of the derived panel.
#[derive(Clone, Debug)]
pub struct RankedVariables {
    pub names: Vec<String>,
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_explained_percent: f64,
}

#[derive(Clone, Debug)]
struct DerivedPanel {
    specs: Vec<ColumnSpec>,
    panel: Panel,
}

#[derive(Clone, Debug)]
pub struct PanelStore {
    name: String,
    begin: NaiveDate,
    end: NaiveDate,
    original: Panel,
    derived: Option<DerivedPanel>,
}

impl PanelStore {
    /// Builds the store using the default FRED-MD vintage tags.
    pub fn initialize(
        raw: RawTable,
        name: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, PanelError> {
        Self::initialize_with_formats(raw, name, begin, end, &default_recognized_formats())
    }

    pub fn initialize_with_formats<S: AsRef<str>>(
        raw: RawTable,
        name: &str,
        begin: NaiveDate,
        end: NaiveDate,
        recognized: &[S],
    ) -> Result<Self, PanelError> {
        let policy = FormatPolicy::detect(name, recognized);
        log::info!("Initializing panel store '{name}' ({policy:?})");

        let (original, derived) = match policy {
            FormatPolicy::Recognized => {
                let (original, specs) = split_code_row(raw)?;
                let original = drop_incomplete_rows(original);
                let panel = transform_panel(&original, &specs)?;
                (original, Some(DerivedPanel { specs, panel }))
            }
            FormatPolicy::Unrecognized => {
                log::warn!(
                    "'{name}' is not a recognized format; holding the original panel only"
                );
                let dates = parse_date_column(&raw.date_labels, 0)?;
                (Panel::new(dates, raw.columns, raw.values), None)
            }
        };

        Ok(Self {
            name: name.to_string(),
            begin,
            end,
            original,
            derived,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.begin, self.end)
    }

    pub fn policy(&self) -> FormatPolicy {
        if self.derived.is_some() {
            FormatPolicy::Recognized
        } else {
            FormatPolicy::Unrecognized
        }
    }

    pub fn original(&self) -> &Panel {
        &self.original
    }

    pub fn derived(&self) -> Option<&Panel> {
        self.derived.as_ref().map(|d| &d.panel)
    }

    pub fn column_specs(&self) -> Option<&[ColumnSpec]> {
        self.derived.as_ref().map(|d| d.specs.as_slice())
    }

    fn derived_mut(&mut self) -> Result<&mut Panel, PanelError> {
        match self.derived.as_mut() {
            Some(d) => Ok(&mut d.panel),
            None => Err(PanelError::DerivedUnavailable(self.name.clone())),
        }
    }

    fn panel_for(&self, view: PanelView) -> Result<&Panel, PanelError> {
        match view {
            PanelView::Original => Ok(&self.original),
            PanelView::Derived => self
                .derived()
                .ok_or_else(|| PanelError::DerivedUnavailable(self.name.clone())),
        }
    }

    /// Assembles train and test sets from one panel view.
    ///
    /// Training rows are those dated in `[begin, end)`; the test window is the
    /// calendar month starting at `end`. Names in the include list that are not
    /// columns of the panel are ignored.
    pub fn create_dataset(&self, query: &DatasetQuery<'_>) -> Result<Dataset, PanelError> {
        let panel = self.panel_for(query.view)?;
        let begin = query.begin.unwrap_or(self.begin);
        let end = query.end.unwrap_or(self.end);

        let dependent_idx = panel
            .column_index(query.dependent)
            .ok_or_else(|| PanelError::UnknownDependentVariable(query.dependent.to_string()))?;

        let feature_cols: Vec<usize> = match query.columns {
            Some(include) => {
                let wanted: AHashSet<&str> = include.iter().map(String::as_str).collect();
                (0..panel.n_columns())
                    .filter(|&c| c != dependent_idx && wanted.contains(panel.columns[c].as_str()))
                    .collect()
            }
            None => (0..panel.n_columns())
                .filter(|&c| c != dependent_idx)
                .collect(),
        };

        let train_rows = panel.rows_between(begin, end);
        let test_end = end
            .checked_add_months(Months::new(1))
            .ok_or(PanelError::DateOutOfRange(end))?;
        let test_rows = panel.rows_between(end, test_end);

        let Some(&first_test_row) = test_rows.first() else {
            return Err(PanelError::EmptyTestWindow {
                start: end,
                end: test_end,
            });
        };
        if test_rows.len() > 1 {
            log::debug!(
                "Test window [{end}, {test_end}) holds {} rows; labelling with the first",
                test_rows.len()
            );
        }

        let dataset = Dataset {
            train_features: panel.select(&train_rows, &feature_cols),
            train_labels: panel.column_rows(dependent_idx, &train_rows),
            test_features: panel.select(&test_rows, &feature_cols),
            test_label: panel.values[[first_test_row, dependent_idx]],
        };
        log::info!(
            "Dataset for '{}' from {:?} view: {} train rows, {} features, test month {}",
            query.dependent,
            query.view,
            dataset.train_features.n_rows(),
            feature_cols.len(),
            end
        );
        Ok(dataset)
    }

    /// Ranks the derived panel's columns with the default dense PCA backend.
    pub fn rank_top_variables(&self, k: usize) -> Result<RankedVariables, PanelError> {
        self.rank_top_variables_with(k, &CovarianceEigen)
    }

    pub fn rank_top_variables_with<B: PcaBackend>(
        &self,
        k: usize,
        backend: &B,
    ) -> Result<RankedVariables, PanelError> {
        let panel = self.panel_for(PanelView::Derived)?;
        let reduction = reduce(panel.values.view(), &panel.columns, k, backend)?;
        let cumulative = reduction.cumulative_explained_percent();
        log::info!(
            "Top {k} components explain {cumulative:.2}% of the derived panel's variance"
        );
        Ok(RankedVariables {
            names: reduction.ranked_columns,
            explained_variance_ratio: reduction.explained_variance_ratio,
            cumulative_explained_percent: cumulative,
        })
    }

    /// Marks derived values outside `median ± multiplier·IQR` as missing.
    pub fn remove_outliers(&mut self, multiplier: f64) -> Result<usize, PanelError> {
        let name = self.name.clone();
        let panel = self.derived_mut()?;
        let marked = remove_outliers(panel, multiplier);
        log::info!("Marked {marked} outliers as missing in '{name}'");
        Ok(marked)
    }

    /// Fills missing derived values with their column means.
    pub fn impute_missing(&mut self) -> Result<usize, PanelError> {
        let name = self.name.clone();
        let panel = self.derived_mut()?;
        let filled = impute_column_means(panel);
        log::info!("Imputed {filled} missing values in '{name}'");
        Ok(filled)
    }
}

/// Reads the code row, then parses the remaining rows into the original panel.
fn split_code_row(raw: RawTable) -> Result<(Panel, Vec<ColumnSpec>), PanelError> {
    if raw.n_rows() == 0 {
        return Err(DataError::EmptyTable.into());
    }

    let codes = raw.values.row(0);
    let specs = raw
        .columns
        .iter()
        .zip(codes.iter())
        .map(|(name, &code)| {
            Ok(ColumnSpec {
                name: name.clone(),
                code: TransformCode::from_raw(name, code)?,
            })
        })
        .collect::<Result<Vec<_>, TransformError>>()?;

    let dates = parse_date_column(&raw.date_labels[1..], 1)?;
    let data_rows: Vec<usize> = (1..raw.n_rows()).collect();
    let values = raw.values.select(Axis(0), &data_rows);

    Ok((Panel::new(dates, raw.columns, values), specs))
}

/// Removes every row that has at least one missing value.
fn drop_incomplete_rows(panel: Panel) -> Panel {
    let keep: Vec<usize> = panel
        .values
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
        .map(|(idx, _)| idx)
        .collect();
    let dropped = panel.n_rows() - keep.len();
    if dropped > 0 {
        log::info!("Dropped {dropped} rows with missing values from the original panel");
    }
    let all_cols: Vec<usize> = (0..panel.n_columns()).collect();
    panel.select(&keep, &all_cols)
}
