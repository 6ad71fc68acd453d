use serde::{Deserialize, Serialize};

/// Running mean and variance (Welford's algorithm).
#[derive(Debug, Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Normalized exponentials of `scores`, shifted by their maximum for stability.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<_> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

/// Least-squares line through the points, as `(slope, intercept)`.
///
/// Returns `None` if the lengths differ, there are fewer than two points
/// or all `x` are equal.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n_vals = x.len();
    if n_vals != y.len() || n_vals < 2 {
        return None;
    }
    let x_mean = x.iter().sum::<f64>() / n_vals as f64;
    let y_mean = y.iter().sum::<f64>() / n_vals as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        sxy += (xi - x_mean) * (yi - y_mean);
        sxx += (xi - x_mean).powi(2);
    }
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

/// Coefficient of determination of the least-squares line.
///
/// Returns NaN when the line or the total variance is undefined, which
/// includes points of mismatched lengths.
pub fn r_squared(x: &[f64], y: &[f64]) -> f64 {
    let Some((slope, intercept)) = linear_fit(x, y) else {
        return f64::NAN;
    };
    let y_mean = y.iter().sum::<f64>() / y.len() as f64;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        ss_res += (yi - (slope * xi + intercept)).powi(2);
        ss_tot += (yi - y_mean).powi(2);
    }
    if ss_tot == 0.0 {
        return f64::NAN;
    }

    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_mean_and_std_dev() {
        let mut acc = Accumulator::new();
        for val in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(val);
        }
        let report = acc.report();
        assert_eq!(report.n_vals, 8);
        assert!((report.mean - 5.0).abs() < 1e-12);
        assert!((report.std_dev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_accumulator_is_nan() {
        let report = Accumulator::new().report();
        assert!(report.mean.is_nan());
        assert!(report.std_dev.is_nan());
    }

    #[test]
    fn softmax_is_normalized() {
        let probs = softmax(&[0.1, 0.0, -0.1]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);

        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn perfect_line_has_unit_r_squared() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<_> = x.iter().map(|xi| 3.0 * xi + 1.0).collect();
        let (slope, intercept) = linear_fit(&x, &y).expect("fit should exist");
        assert!((slope - 3.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!((r_squared(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn noisy_line_has_lower_r_squared() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 3.0, 2.0, 4.0];
        let r2 = r_squared(&x, &y);
        assert!((r2 - 0.64).abs() < 1e-12);
    }

    #[test]
    fn degenerate_fit() {
        assert!(linear_fit(&[1.0], &[2.0]).is_none());
        assert!(linear_fit(&[1.0, 1.0], &[2.0, 3.0]).is_none());
        assert!(r_squared(&[1.0, 2.0], &[5.0, 5.0]).is_nan());
    }

    #[test]
    fn mismatched_lengths_have_no_fit() {
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 3.0];
        assert!(linear_fit(&x, &y).is_none());
        assert!(linear_fit(&y, &x).is_none());
        assert!(r_squared(&x, &y).is_nan());
    }
}
