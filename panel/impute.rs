use crate::types::Panel;

/// Fills missing values with the mean of the column's observed values.
///
/// Returns the number of cells filled. A column with no observed values stays
/// missing and is reported with a warning.
pub fn impute_column_means(panel: &mut Panel) -> usize {
    let mut filled = 0;
    for (idx, mut column) in panel.values.columns_mut().into_iter().enumerate() {
        let (sum, count) = column
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        let missing = column.len() - count;
        if missing == 0 {
            continue;
        }
        if count == 0 {
            log::warn!(
                "Column '{}' has no observed values; leaving it missing",
                panel.columns[idx]
            );
            continue;
        }
        let mean = sum / count as f64;
        column.mapv_inplace(|v| if v.is_nan() { mean } else { v });
        filled += missing;
    }
    filled
}
