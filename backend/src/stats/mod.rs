//! Descriptive statistics over numeric columns.

use serde::Serialize;

use crate::models::{ColumnKind, Dataset};

/// Quantile `q` (0..=1) of `values` with linear interpolation between the
/// closest ranks. Returns `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 1.0);
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = idx - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Summary of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1); `NaN` with fewer than two values.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Summary of every numeric column with at least one present value.
pub fn describe(dataset: &Dataset) -> Vec<ColumnSummary> {
    dataset
        .columns()
        .iter()
        .filter(|c| c.kind == ColumnKind::Number)
        .filter_map(|c| {
            let values = dataset.numeric_values(&c.name)?;
            summarize(&c.name, &values)
        })
        .collect()
}

fn summarize(name: &str, values: &[f64]) -> Option<ColumnSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    } else {
        f64::NAN
    };

    Some(ColumnSummary {
        name: name.to_string(),
        count: n,
        mean,
        std,
        min: sorted[0],
        q25: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q75: quantile_sorted(&sorted, 0.75),
        max: sorted[n - 1],
    })
}

/// Pearson correlation between two equally long series.
///
/// `NaN` when either series is constant or shorter than two values.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Correlation matrix over the numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major, `columns.len()` squared.
    pub values: Vec<f64>,
}

impl CorrelationMatrix {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.columns.len() + col]
    }
}

/// Pairwise Pearson correlation of every fully populated numeric column.
///
/// Columns with a missing cell are left out. `None` when no column qualifies.
pub fn correlation_matrix(dataset: &Dataset) -> Option<CorrelationMatrix> {
    let series: Vec<(String, Vec<f64>)> = dataset
        .columns()
        .iter()
        .filter(|c| c.kind == ColumnKind::Number)
        .filter_map(|c| {
            let values = dataset.numeric_values(&c.name)?;
            (values.len() == dataset.len() && !values.is_empty())
                .then(|| (c.name.clone(), values))
        })
        .collect();
    if series.is_empty() {
        return None;
    }

    let k = series.len();
    let mut values = vec![0.0; k * k];
    for i in 0..k {
        for j in 0..k {
            values[i * k + j] = if i == j {
                1.0
            } else {
                pearson(&series[i].1, &series[j].1)
            };
        }
    }

    Some(CorrelationMatrix {
        columns: series.into_iter().map(|(name, _)| name).collect(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, Column};

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        // idx = 0.99 * 3 = 2.97 -> 3 + 0.97
        let q99 = quantile(&values, 0.99).unwrap();
        assert!((q99 - 3.97).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_unsorted_input() {
        assert_eq!(quantile(&[5.0, 1.0, 3.0], 0.5), Some(3.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_quantile_hundred_values() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        // idx = 0.99 * 99 = 98.01 -> 99 + 0.01
        let q = quantile(&values, 0.99).unwrap();
        assert!((q - 99.01).abs() < 1e-9);
    }

    #[test]
    fn test_pearson() {
        let xs = [1.0, 2.0, 3.0];
        assert!((pearson(&xs, &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&xs, &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(pearson(&xs, &[1.0, 1.0, 1.0]).is_nan());
    }

    fn numeric_dataset() -> Dataset {
        let mut ds = Dataset::new(vec![
            Column::new("name", ColumnKind::Text),
            Column::new("a", ColumnKind::Number),
            Column::new("b", ColumnKind::Number),
        ])
        .unwrap();
        for (a, b) in [(1.0, 10.0), (2.0, 20.0), (3.0, 30.0), (4.0, 40.0)] {
            ds.push_row(vec![Cell::Text("x".into()), Cell::Number(a), Cell::Number(b)])
                .unwrap();
        }
        ds
    }

    #[test]
    fn test_describe() {
        let summaries = describe(&numeric_dataset());
        assert_eq!(summaries.len(), 2);
        let a = &summaries[0];
        assert_eq!(a.name, "a");
        assert_eq!(a.count, 4);
        assert_eq!(a.mean, 2.5);
        assert_eq!(a.min, 1.0);
        assert_eq!(a.max, 4.0);
        assert_eq!(a.median, 2.5);
        assert_eq!(a.q25, 1.75);
        assert!((a.std - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_matrix() {
        let matrix = correlation_matrix(&numeric_dataset()).unwrap();
        assert_eq!(matrix.columns, vec!["a", "b"]);
        assert_eq!(matrix.get(0, 0), 1.0);
        assert!((matrix.get(0, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_matrix_without_numbers() {
        let mut ds = Dataset::new(vec![Column::new("name", ColumnKind::Text)]).unwrap();
        ds.push_row(vec![Cell::Text("x".into())]).unwrap();
        assert!(correlation_matrix(&ds).is_none());
    }
}
