use core::cmp::{Ordering, Reverse};
use core::fmt;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Eigh, UPLO};
use std::error::Error;

/// Columns whose standard deviation falls below this are treated as constant.
pub const STD_EPSILON: f64 = 1.0e-12;

/// Loadings are compared at this resolution when ranking, so solver noise on
/// tied magnitudes cannot reorder columns.
pub const LOADING_RESOLUTION: f64 = 1.0e-9;

#[derive(Debug)]
pub enum ReduceError {
    InvalidK { k: usize, columns: usize },
    NameCountMismatch { names: usize, columns: usize },
    InsufficientRows(usize),
    NonFiniteValues(String),
    Eigen(LinalgError),
}

impl fmt::Display for ReduceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceError::InvalidK { k, columns } => {
                write!(f, "requested {k} variables but the matrix has {columns} columns")
            }
            ReduceError::NameCountMismatch { names, columns } => {
                write!(f, "{names} column names supplied for {columns} columns")
            }
            ReduceError::InsufficientRows(rows) => {
                write!(f, "at least 2 rows are needed for PCA, found {rows}")
            }
            ReduceError::NonFiniteValues(column) => write!(
                f,
                "column '{column}' contains missing or non-finite values; impute before ranking"
            ),
            ReduceError::Eigen(err) => write!(f, "eigendecomposition failed: {err}"),
        }
    }
}

impl Error for ReduceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReduceError::Eigen(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LinalgError> for ReduceError {
    fn from(value: LinalgError) -> Self {
        ReduceError::Eigen(value)
    }
}

/// Result of fitting principal components to a standardized matrix.
#[derive(Clone, Debug)]
pub struct PcaFit {
    /// Shape: [n_components, n_columns]. Row `i` is the i-th component's loadings.
    pub components: Array2<f64>,
    /// Share of total variance carried by each retained component.
    pub explained_variance_ratio: Vec<f64>,
}

/// Anything able to fit principal components.
pub trait PcaBackend {
    fn fit(&self, standardized: ArrayView2<'_, f64>, n_components: usize)
    -> Result<PcaFit, ReduceError>;
}

/// Dense PCA through the eigendecomposition of the sample covariance matrix.
#[derive(Clone, Copy, Debug, Default)]
pub struct CovarianceEigen;

impl PcaBackend for CovarianceEigen {
    fn fit(
        &self,
        standardized: ArrayView2<'_, f64>,
        n_components: usize,
    ) -> Result<PcaFit, ReduceError> {
        let n_rows = standardized.nrows();
        let n_cols = standardized.ncols();
        if n_rows < 2 {
            return Err(ReduceError::InsufficientRows(n_rows));
        }
        if n_components > n_cols {
            return Err(ReduceError::InvalidK {
                k: n_components,
                columns: n_cols,
            });
        }

        let covariance = standardized.t().dot(&standardized) / (n_rows - 1) as f64;
        let (eigenvalues, eigenvectors): (Array1<f64>, Array2<f64>) =
            covariance.eigh(UPLO::Lower)?;

        // eigh returns ascending eigenvalues; tiny negatives are rounding noise.
        let order: Vec<usize> = (0..eigenvalues.len())
            .sorted_by(|&a, &b| {
                eigenvalues[b]
                    .partial_cmp(&eigenvalues[a])
                    .unwrap_or(Ordering::Equal)
            })
            .collect();
        let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();

        let retained = &order[..n_components];
        let components = eigenvectors.select(Axis(1), retained).reversed_axes();
        let explained_variance_ratio = retained
            .iter()
            .map(|&i| {
                if total > 0.0 {
                    eigenvalues[i].max(0.0) / total
                } else {
                    0.0
                }
            })
            .collect();

        Ok(PcaFit {
            components,
            explained_variance_ratio,
        })
    }
}

/// Centers every column to mean zero and scales it to unit (population) variance.
///
/// Constant columns become all zeros.
pub fn standardize(matrix: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = matrix.to_owned();
    let n = matrix.nrows();
    if n == 0 {
        return out;
    }
    for mut column in out.columns_mut() {
        let mean = column.sum() / n as f64;
        let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = variance.sqrt();
        if std < STD_EPSILON {
            column.fill(0.0);
        } else {
            column.mapv_inplace(|v| (v - mean) / std);
        }
    }
    out
}

/// Variables ranked by their weight in the dominant component.
#[derive(Clone, Debug)]
pub struct Reduction {
    /// The `k` highest ranked column names, strongest first.
    pub ranked_columns: Vec<String>,
    /// Explained variance ratio of the first `k` components.
    pub explained_variance_ratio: Vec<f64>,
}

impl Reduction {
    /// Percentage of total variance carried by the retained components.
    pub fn cumulative_explained_percent(&self) -> f64 {
        100.0 * self.explained_variance_ratio.iter().sum::<f64>()
    }
}

/// Standardizes `matrix`, fits `k` components and ranks columns by the absolute
/// value of their loading on the first one. Ties keep the original column order.
pub fn reduce<B: PcaBackend>(
    matrix: ArrayView2<'_, f64>,
    names: &[String],
    k: usize,
    backend: &B,
) -> Result<Reduction, ReduceError> {
    let n_cols = matrix.ncols();
    if names.len() != n_cols {
        return Err(ReduceError::NameCountMismatch {
            names: names.len(),
            columns: n_cols,
        });
    }
    if k > n_cols {
        return Err(ReduceError::InvalidK { k, columns: n_cols });
    }
    if k == 0 {
        return Ok(Reduction {
            ranked_columns: Vec::new(),
            explained_variance_ratio: Vec::new(),
        });
    }
    for (idx, column) in matrix.columns().into_iter().enumerate() {
        if column.iter().any(|v| !v.is_finite()) {
            return Err(ReduceError::NonFiniteValues(names[idx].clone()));
        }
    }

    let standardized = standardize(matrix);
    let fit = backend.fit(standardized.view(), k)?;

    let scores: Vec<i64> = fit
        .components
        .row(0)
        .iter()
        .map(|loading| (loading.abs() / LOADING_RESOLUTION).round() as i64)
        .collect();
    // sorted_by_key is stable, so equal scores stay in column order.
    let ranked_columns = (0..n_cols)
        .sorted_by_key(|&idx| Reverse(scores[idx]))
        .take(k)
        .map(|idx| names[idx].clone())
        .collect();

    Ok(Reduction {
        ranked_columns,
        explained_variance_ratio: fit.explained_variance_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let m = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [6.0, 7.0]];
        let z = standardize(m.view());
        let col = z.column(0);
        assert_abs_diff_eq!(col.sum(), 0.0, epsilon = 1e-12);
        let var = col.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
        assert!(z.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_covariance_eigen_orders_components() {
        // Two perfectly correlated columns and one independent column.
        let m = array![
            [1.0, 2.0, 1.0],
            [2.0, 4.0, -1.0],
            [3.0, 6.0, 1.0],
            [4.0, 8.0, -1.0],
            [5.0, 10.0, 1.0],
            [6.0, 12.0, -1.0]
        ];
        let z = standardize(m.view());
        let fit = CovarianceEigen.fit(z.view(), 3).unwrap();
        assert_eq!(fit.components.shape(), &[3, 3]);
        let ratios = &fit.explained_variance_ratio;
        assert!(ratios[0] >= ratios[1] && ratios[1] >= ratios[2]);
        assert_abs_diff_eq!(ratios.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.components[[0, 0]].abs(), fit.components[[0, 1]].abs(), epsilon = 1e-9);
    }

    // A carries ten times the variance of B, the two move together and the
    // remaining columns are flat.
    fn dominant_pair(n: usize) -> (Vec<f64>, Vec<f64>) {
        let a: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64;
                (t * 0.7).sin() * 10.0 + t * 0.1
            })
            .collect();
        let b = a.iter().map(|v| v / 10.0_f64.sqrt()).collect();
        (a, b)
    }

    #[test]
    fn test_reduce_ranks_dominant_pair() {
        let n = 40;
        let (a, b) = dominant_pair(n);
        let mut m = Array2::zeros((n, 4));
        for i in 0..n {
            m[[i, 0]] = 3.0;
            m[[i, 1]] = a[i];
            m[[i, 2]] = b[i];
            m[[i, 3]] = -1.0;
        }
        let cols = names(&["C0", "A", "B", "C1"]);
        let reduction = reduce(m.view(), &cols, 2, &CovarianceEigen).unwrap();

        assert_eq!(reduction.ranked_columns, names(&["A", "B"]));
        assert_eq!(reduction.explained_variance_ratio.len(), 2);
        assert!(reduction.cumulative_explained_percent() <= 100.0 + 1e-9);
        assert!(reduction.cumulative_explained_percent() > 99.0);
    }

    #[test]
    fn test_reduce_tied_loadings_follow_column_order() {
        let n = 40;
        let (a, b) = dominant_pair(n);
        let mut m = Array2::zeros((n, 3));
        for i in 0..n {
            m[[i, 0]] = 2.0;
            m[[i, 1]] = b[i];
            m[[i, 2]] = a[i];
        }
        let cols = names(&["C0", "B", "A"]);
        let reduction = reduce(m.view(), &cols, 2, &CovarianceEigen).unwrap();
        assert_eq!(reduction.ranked_columns, names(&["B", "A"]));
    }

    #[test]
    fn test_reduce_ties_keep_column_order() {
        // All three columns are constant, so every loading magnitude ties.
        let m = Array2::from_elem((5, 3), 1.0);
        let cols = names(&["X", "Y", "Z"]);

        struct Uniform;
        impl PcaBackend for Uniform {
            fn fit(
                &self,
                standardized: ArrayView2<'_, f64>,
                n_components: usize,
            ) -> Result<PcaFit, ReduceError> {
                Ok(PcaFit {
                    components: Array2::from_elem((n_components, standardized.ncols()), 0.5),
                    explained_variance_ratio: vec![0.0; n_components],
                })
            }
        }

        let reduction = reduce(m.view(), &cols, 3, &Uniform).unwrap();
        assert_eq!(reduction.ranked_columns, cols);
    }

    #[test]
    fn test_reduce_rejects_k_above_column_count() {
        let m = Array2::zeros((4, 2));
        let err = reduce(m.view(), &names(&["A", "B"]), 3, &CovarianceEigen).unwrap_err();
        assert!(matches!(err, ReduceError::InvalidK { k: 3, columns: 2 }));
    }

    #[test]
    fn test_reduce_rejects_missing_values() {
        let m = array![[1.0, 2.0], [f64::NAN, 3.0], [2.0, 5.0]];
        let err = reduce(m.view(), &names(&["A", "B"]), 1, &CovarianceEigen).unwrap_err();
        match err {
            ReduceError::NonFiniteValues(col) => assert_eq!(col, "A"),
            other => panic!("Expected NonFiniteValues, got {other:?}"),
        }
    }
}
