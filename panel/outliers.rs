//! Robust outlier screening for the stationary panel.
//!
//! A value is an outlier when it falls outside `median ± multiplier·IQR` of its
//! own column. Outliers are not clipped; they become `NaN` so the imputer can
//! fill them. Infinite values, which log transforms produce from zero levels,
//! are always outliers and never enter the quartiles.

use crate::types::Panel;

/// Multiplier used in the FRED-MD literature.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 5.0;

/// Linear-interpolation quantile of an already sorted slice.
///
/// Uses position `(n - 1)·q`, the default in numpy and pandas.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let index = (n - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = index.floor() as usize;
    let hi = index.ceil() as usize;
    let frac = index - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnBounds {
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ColumnBounds {
    /// Computes the band from the finite values. `None` when there are none.
    pub fn from_values<'a, I>(values: I, multiplier: f64) -> Option<Self>
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let mut present: Vec<f64> = values.into_iter().copied().filter(|v| v.is_finite()).collect();
        if present.is_empty() {
            return None;
        }
        present.sort_by(f64::total_cmp);

        let median = quantile(&present, 0.5);
        let q1 = quantile(&present, 0.25);
        let q3 = quantile(&present, 0.75);
        let iqr = q3 - q1;
        Some(Self {
            median,
            q1,
            q3,
            lower: median - multiplier * iqr,
            upper: median + multiplier * iqr,
        })
    }

    /// Infinite values are always outliers. Missing values never are.
    pub fn is_outlier(&self, value: f64) -> bool {
        value.is_infinite() || value < self.lower || value > self.upper
    }
}

/// Marks every value outside its column's band as missing. Returns the count marked.
pub fn remove_outliers(panel: &mut Panel, multiplier: f64) -> usize {
    let mut marked = 0;
    for (idx, mut column) in panel.values.columns_mut().into_iter().enumerate() {
        let bounds = ColumnBounds::from_values(column.iter(), multiplier);
        let mut in_column = 0;
        for value in column.iter_mut() {
            let outside = match &bounds {
                Some(b) => b.is_outlier(*value),
                None => value.is_infinite(),
            };
            if outside {
                *value = f64::NAN;
                in_column += 1;
            }
        }
        if in_column > 0 {
            match &bounds {
                Some(b) => log::debug!(
                    "Column '{}': {} values outside [{:.4}, {:.4}]",
                    panel.columns[idx],
                    in_column,
                    b.lower,
                    b.upper
                ),
                None => log::debug!(
                    "Column '{}': {} infinite values and no finite observations",
                    panel.columns[idx],
                    in_column
                ),
            }
        }
        marked += in_column;
    }
    marked
}
