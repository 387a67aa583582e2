//! # Stationarity Transforms
//!
//! FRED-MD ships a transformation code for every series. This module maps each
//! code to its kernel and applies the kernels column by column to a whole panel.
//!
//! - Kernels never shorten a series. Positions that would reference history
//!   before the first observation come back as `NaN`.
//! - The whole-panel pass always drops the first [`LEADING_ROWS_DROPPED`] rows,
//!   whatever the codes are, so every column starts on one common date.

use ndarray::{Array1, Array2, ArrayView1, s};
use thiserror::Error;

use crate::types::{ColumnSpec, Panel};

/// Rows removed from the head of every transformed panel.
pub const LEADING_ROWS_DROPPED: usize = 2;

#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error(
        "Column '{column}' carries transformation code {code}, but only integer codes 1 through 7 are defined."
    )]
    InvalidTransformCode { column: String, code: f64 },
    #[error("Expected {expected} column specifications for the panel, found {found}.")]
    ColumnCountMismatch { expected: usize, found: usize },
}

/// The seven FRED-MD transformation codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformCode {
    /// 1: no transformation.
    Level,
    /// 2: Δx_t
    FirstDifference,
    /// 3: Δ²x_t
    SecondDifference,
    /// 4: ln(x_t)
    Log,
    /// 5: Δln(x_t)
    LogFirstDifference,
    /// 6: Δ²ln(x_t)
    LogSecondDifference,
    /// 7: Δ(x_t/x_{t-1} - 1)
    PercentChangeDifference,
}

type Kernel = fn(ArrayView1<'_, f64>) -> Array1<f64>;

impl TransformCode {
    pub const ALL: [TransformCode; 7] = [
        TransformCode::Level,
        TransformCode::FirstDifference,
        TransformCode::SecondDifference,
        TransformCode::Log,
        TransformCode::LogFirstDifference,
        TransformCode::LogSecondDifference,
        TransformCode::PercentChangeDifference,
    ];

    /// Parses the raw cell found in the code row of a FRED-MD file.
    pub fn from_raw(column: &str, raw: f64) -> Result<Self, TransformError> {
        let invalid = || TransformError::InvalidTransformCode {
            column: column.to_string(),
            code: raw,
        };
        if !raw.is_finite() || raw.fract() != 0.0 {
            return Err(invalid());
        }
        match raw as i64 {
            1 => Ok(TransformCode::Level),
            2 => Ok(TransformCode::FirstDifference),
            3 => Ok(TransformCode::SecondDifference),
            4 => Ok(TransformCode::Log),
            5 => Ok(TransformCode::LogFirstDifference),
            6 => Ok(TransformCode::LogSecondDifference),
            7 => Ok(TransformCode::PercentChangeDifference),
            _ => Err(invalid()),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TransformCode::Level => 1,
            TransformCode::FirstDifference => 2,
            TransformCode::SecondDifference => 3,
            TransformCode::Log => 4,
            TransformCode::LogFirstDifference => 5,
            TransformCode::LogSecondDifference => 6,
            TransformCode::PercentChangeDifference => 7,
        }
    }

    fn kernel(self) -> Kernel {
        match self {
            TransformCode::Level => level,
            TransformCode::FirstDifference => first_difference,
            TransformCode::SecondDifference => second_difference,
            TransformCode::Log => log_level,
            TransformCode::LogFirstDifference => log_first_difference,
            TransformCode::LogSecondDifference => log_second_difference,
            TransformCode::PercentChangeDifference => percent_change_difference,
        }
    }

    /// Applies the transform to one series. The output has the input's length.
    pub fn apply(self, series: ArrayView1<'_, f64>) -> Array1<f64> {
        (self.kernel())(series)
    }
}

fn level(x: ArrayView1<'_, f64>) -> Array1<f64> {
    x.to_owned()
}

fn diff(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut out = Array1::from_elem(x.len(), f64::NAN);
    for t in 1..x.len() {
        out[t] = x[t] - x[t - 1];
    }
    out
}

fn first_difference(x: ArrayView1<'_, f64>) -> Array1<f64> {
    diff(x)
}

fn second_difference(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let once = diff(x);
    diff(once.view())
}

fn log_level(x: ArrayView1<'_, f64>) -> Array1<f64> {
    x.mapv(f64::ln)
}

fn log_first_difference(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let logged = log_level(x);
    diff(logged.view())
}

fn log_second_difference(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let logged = log_level(x);
    second_difference(logged.view())
}

fn percent_change_difference(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut growth = Array1::from_elem(x.len(), f64::NAN);
    for t in 1..x.len() {
        growth[t] = x[t] / x[t - 1] - 1.0;
    }
    diff(growth.view())
}

/// Builds the stationary view of `panel`.
///
/// Each column is passed through the kernel named by its spec, then the first
/// [`LEADING_ROWS_DROPPED`] rows are removed from the result. Specs must line up
/// with `panel.columns` one to one.
pub fn transform_panel(panel: &Panel, specs: &[ColumnSpec]) -> Result<Panel, TransformError> {
    if specs.len() != panel.n_columns() {
        return Err(TransformError::ColumnCountMismatch {
            expected: panel.n_columns(),
            found: specs.len(),
        });
    }

    let mut transformed = Array2::from_elem(panel.values.raw_dim(), f64::NAN);
    for (idx, spec) in specs.iter().enumerate() {
        debug_assert_eq!(spec.name, panel.columns[idx]);
        let column = spec.code.apply(panel.values.column(idx));
        transformed.column_mut(idx).assign(&column);
        log::debug!(
            "Transformed column '{}' with code {}",
            spec.name,
            spec.code.code()
        );
    }

    let start = LEADING_ROWS_DROPPED.min(panel.n_rows());
    let values = transformed.slice(s![start.., ..]).to_owned();
    let dates = panel.dates[start..].to_vec();

    log::info!(
        "Transformed {} columns; derived panel holds {} rows starting {}",
        specs.len(),
        dates.len(),
        dates
            .first()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "nowhere".to_string())
    );

    Ok(Panel::new(dates, panel.columns.clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use ndarray::array;

    fn monthly_dates(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2000 + (i / 12) as i32, (i % 12) as u32 + 1, 1).unwrap())
            .collect()
    }

    fn spec(name: &str, code: TransformCode) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            code,
        }
    }

    #[test]
    fn test_from_raw_accepts_all_seven_codes() {
        for (i, expected) in TransformCode::ALL.iter().enumerate() {
            let parsed = TransformCode::from_raw("X", (i + 1) as f64).unwrap();
            assert_eq!(parsed, *expected);
            assert_eq!(parsed.code() as usize, i + 1);
        }
    }

    #[test]
    fn test_from_raw_rejects_out_of_range_and_fractional() {
        for raw in [0.0, 8.0, -1.0, 2.5, f64::NAN, f64::INFINITY] {
            match TransformCode::from_raw("RPI", raw) {
                Err(TransformError::InvalidTransformCode { column, .. }) => {
                    assert_eq!(column, "RPI")
                }
                other => panic!("Expected InvalidTransformCode for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_kernels_keep_length_and_mark_missing_history() {
        let x = array![1.0, 2.0, 4.0, 8.0, 16.0];
        for code in TransformCode::ALL {
            let y = code.apply(x.view());
            assert_eq!(y.len(), x.len(), "length changed for {code:?}");
        }
        let d1 = TransformCode::FirstDifference.apply(x.view());
        assert!(d1[0].is_nan());
        assert_abs_diff_eq!(d1[1], 1.0);
        assert_abs_diff_eq!(d1[4], 8.0);

        let d2 = TransformCode::SecondDifference.apply(x.view());
        assert!(d2[0].is_nan() && d2[1].is_nan());
        assert_abs_diff_eq!(d2[2], 1.0);
        assert_abs_diff_eq!(d2[4], 4.0);
    }

    #[test]
    fn test_log_kernels() {
        let x = array![1.0, 2.0, 4.0, 8.0];
        let ln2 = 2.0_f64.ln();

        let logged = TransformCode::Log.apply(x.view());
        assert_abs_diff_eq!(logged[3], 3.0 * ln2, epsilon = 1e-12);

        let dlog = TransformCode::LogFirstDifference.apply(x.view());
        assert!(dlog[0].is_nan());
        assert_abs_diff_eq!(dlog[2], ln2, epsilon = 1e-12);

        let d2log = TransformCode::LogSecondDifference.apply(x.view());
        assert!(d2log[1].is_nan());
        assert_abs_diff_eq!(d2log[3], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_then_exp_recovers_positive_input() {
        let x = array![0.5, 3.25, 101.0, 7.0e5];
        let back = TransformCode::Log.apply(x.view()).mapv(f64::exp);
        for (a, b) in back.iter().zip(x.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9 * b.abs());
        }
    }

    #[test]
    fn test_percent_change_difference() {
        let x = array![100.0, 110.0, 121.0, 145.2];
        let y = TransformCode::PercentChangeDifference.apply(x.view());
        assert!(y[0].is_nan() && y[1].is_nan());
        // growth: NaN, 0.10, 0.10, 0.20
        assert_abs_diff_eq!(y[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[3], 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_values_propagate() {
        let x = array![1.0, f64::NAN, 3.0, 4.0];
        let y = TransformCode::FirstDifference.apply(x.view());
        assert!(y[1].is_nan() && y[2].is_nan());
        assert_abs_diff_eq!(y[3], 1.0);
    }

    #[test]
    fn test_transform_panel_drops_two_rows_for_every_code() {
        let dates = monthly_dates(5);
        let values = array![
            [1.0, 10.0],
            [2.0, 13.0],
            [3.0, 17.0],
            [4.0, 22.0],
            [5.0, 28.0]
        ];
        let panel = Panel::new(dates.clone(), vec!["A".into(), "B".into()], values.clone());
        let specs = vec![
            spec("A", TransformCode::Level),
            spec("B", TransformCode::FirstDifference),
        ];

        let derived = transform_panel(&panel, &specs).unwrap();
        assert_eq!(derived.n_rows(), 3);
        assert_eq!(derived.dates, dates[2..].to_vec());
        assert_eq!(derived.columns, panel.columns);

        for t in 0..derived.n_rows() {
            let orig_t = t + LEADING_ROWS_DROPPED;
            assert_abs_diff_eq!(derived.values[[t, 0]], values[[orig_t, 0]]);
            assert_abs_diff_eq!(
                derived.values[[t, 1]],
                values[[orig_t, 1]] - values[[orig_t - 1, 1]]
            );
        }
    }

    #[test]
    fn test_transform_panel_shorter_than_truncation() {
        let panel = Panel::new(
            monthly_dates(1),
            vec!["A".into()],
            array![[1.0]],
        );
        let derived = transform_panel(&panel, &[spec("A", TransformCode::Level)]).unwrap();
        assert!(derived.is_empty());
        assert_eq!(derived.n_columns(), 1);
    }

    #[test]
    fn test_transform_panel_rejects_spec_count_mismatch() {
        let panel = Panel::new(monthly_dates(3), vec!["A".into(), "B".into()], Array2::zeros((3, 2)));
        let err = transform_panel(&panel, &[spec("A", TransformCode::Level)]).unwrap_err();
        assert_eq!(
            err,
            TransformError::ColumnCountMismatch {
                expected: 2,
                found: 1
            }
        );
    }
}
