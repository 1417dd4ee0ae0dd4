//! Feature standardization.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standardizes features to zero mean and unit variance.
///
/// Statistics are fit once at training time and reused unchanged at
/// inference time; the scaler is persisted inside the model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    /// Fits scaling statistics on the training matrix (one row per sample).
    #[must_use]
    pub fn fit(data: &Array2<f64>) -> Self {
        let n = data.nrows().max(1) as f64;

        let means: Vec<f64> = data
            .axis_iter(Axis(1))
            .map(|col| col.sum() / n)
            .collect();

        let stds: Vec<f64> = data
            .axis_iter(Axis(1))
            .zip(&means)
            .map(|(col, mean)| {
                let var = col.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                var.sqrt()
            })
            .collect();

        Self { means, stds }
    }

    /// Applies the fitted transform. Zero-variance columns map to 0 so no
    /// division can blow up.
    #[must_use]
    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, x) in row.iter_mut().enumerate() {
                let std = self.stds[j];
                *x = if std > f64::EPSILON {
                    (*x - self.means[j]) / std
                } else {
                    0.0
                };
            }
        }
        out
    }

    /// Fits on `data` and returns the transformed matrix.
    #[must_use]
    pub fn fit_transform(data: &Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(data);
        let transformed = scaler.transform(data);
        (scaler, transformed)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_fit_transform_zero_mean_unit_variance() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&data);

        assert!((scaler.means[0] - 2.0).abs() < 1e-9);
        assert!((scaler.means[1] - 20.0).abs() < 1e-9);

        for j in 0..2 {
            let col_mean: f64 = scaled.column(j).sum() / 3.0;
            assert!(col_mean.abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_variance_column_maps_to_zero() {
        let data = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let (_, scaled) = StandardScaler::fit_transform(&data);

        for x in scaled.column(0) {
            assert_eq!(*x, 0.0);
        }
    }

    #[test]
    fn test_statistics_reused_at_inference() {
        let train = array![[0.0], [10.0]];
        let (scaler, _) = StandardScaler::fit_transform(&train);

        let test = array![[5.0], [15.0]];
        let scaled = scaler.transform(&test);

        assert!((scaled[[0, 0]] - 0.0).abs() < 1e-9);
        assert!((scaled[[1, 0]] - 2.0).abs() < 1e-9);
    }
}
