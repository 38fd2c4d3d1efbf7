//! ROC curve utilities: area under the curve, linear interpolation and the
//! equal error rate.

use crate::error::{Error, Result};

const EER_XTOL: f64 = 2e-12;
const EER_FTOL: f64 = 1e-12;
const EER_MAX_ITER: usize = 100;

/// Area under a curve by the trapezoidal rule
///
/// `x` must be monotonic (either direction); a decreasing `x` yields the
/// same positive area as the reversed curve.
pub fn auc(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(Error::evaluation(format!(
            "auc: x and y differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(Error::evaluation("auc: at least 2 points are required"));
    }

    let increasing = x.windows(2).all(|w| w[1] >= w[0]);
    let decreasing = x.windows(2).all(|w| w[1] <= w[0]);
    let direction = match (increasing, decreasing) {
        (true, _) => 1.0,
        (false, true) => -1.0,
        (false, false) => return Err(Error::evaluation("auc: x is neither increasing nor decreasing")),
    };

    let area: f64 = x
        .windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum();
    Ok(direction * area)
}

/// Piecewise-linear interpolant through sampled points
///
/// Points are sorted by `x` (stable). Between repeated `x` values the later
/// sample wins; outside the sampled range the edge values are held.
#[derive(Debug, Clone)]
pub struct Interp1d {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Interp1d {
    /// Build an interpolant; fails on mismatched, non-finite or degenerate input
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::evaluation(format!(
                "interpolation: x and y differ in length ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(Error::evaluation("interpolation needs at least 2 points"));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(Error::evaluation("interpolation input contains non-finite values"));
        }

        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
        let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
        let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

        if xs.first() == xs.last() {
            return Err(Error::evaluation("interpolation x values are all identical"));
        }
        Ok(Self { x: xs, y: ys })
    }

    /// Interpolated value at `at`
    pub fn eval(&self, at: f64) -> f64 {
        let last = self.x.len() - 1;
        // first index with x > at; lo is then the last sample with x <= at
        let hi = self.x.partition_point(|&v| v <= at);
        if hi == 0 {
            let first_run = self.x.partition_point(|&v| v <= self.x[0]);
            return self.y[first_run - 1];
        }
        if hi > last {
            return self.y[last];
        }
        let lo = hi - 1;
        let (x_lo, x_hi) = (self.x[lo], self.x[hi]);
        self.y[lo] + (at - x_lo) * (self.y[hi] - self.y[lo]) / (x_hi - x_lo)
    }
}

/// Equal error rate of an ROC curve
///
/// Root of `1 - x - TPR(x)` on `[0, 1]`, where `TPR` interpolates the curve
/// at false-positive rate `x`, found by bisection.
pub fn equal_error_rate(fpr: &[f64], tpr: &[f64]) -> Result<f64> {
    let curve = Interp1d::new(fpr, tpr)?;
    bisect(|x| 1.0 - x - curve.eval(x), 0.0, 1.0)
}

fn bisect(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> Result<f64> {
    let f_lo = f(lo);
    let mut f_hi = f(hi);
    if !f_lo.is_finite() || !f_hi.is_finite() {
        return Err(Error::evaluation("EER objective is not finite at the bracket ends"));
    }
    if f_lo * f_hi > 0.0 {
        return Err(Error::evaluation(format!(
            "EER objective has no sign change on [{}, {}] (f = {}, {})",
            lo, hi, f_lo, f_hi
        )));
    }

    for _ in 0..EER_MAX_ITER {
        let mid = lo + (hi - lo) / 2.0;
        let f_mid = f(mid);
        if !f_mid.is_finite() {
            return Err(Error::evaluation("EER objective is not finite inside the bracket"));
        }
        if f_mid.abs() < EER_FTOL || (hi - lo) / 2.0 < EER_XTOL {
            return Ok(mid);
        }
        if f_mid * f_hi > 0.0 {
            hi = mid;
            f_hi = f_mid;
        } else {
            lo = mid;
        }
    }
    Err(Error::evaluation(format!(
        "EER bisection did not converge in {} iterations",
        EER_MAX_ITER
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_auc_of_unit_square_diagonal() {
        assert_relative_eq!(auc(&[0.0, 1.0], &[0.0, 1.0]).unwrap(), 0.5);
        assert_relative_eq!(auc(&[0.0, 0.5, 1.0], &[1.0, 1.0, 1.0]).unwrap(), 1.0);
        assert_relative_eq!(auc(&[1.0, 0.0], &[1.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_auc_rejects_non_monotonic_x() {
        let err = auc(&[0.0, 1.0, 0.5], &[0.0, 1.0, 1.0]).unwrap_err();
        assert!(err.is_evaluation_failure());
    }

    #[test]
    fn test_interp_linear_and_held_edges() {
        let f = Interp1d::new(&[0.0, 1.0, 2.0], &[0.0, 10.0, 0.0]).unwrap();
        assert_relative_eq!(f.eval(0.5), 5.0);
        assert_relative_eq!(f.eval(1.5), 5.0);
        assert_relative_eq!(f.eval(-1.0), 0.0);
        assert_relative_eq!(f.eval(3.0), 0.0);
    }

    #[test]
    fn test_interp_sorts_input() {
        let f = Interp1d::new(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_relative_eq!(f.eval(0.25), 0.25);
    }

    #[test]
    fn test_interp_repeated_x_takes_later_sample() {
        let f = Interp1d::new(&[0.0, 0.0, 0.5, 0.5, 1.0, 1.0], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_relative_eq!(f.eval(-0.5), 1.0);
        assert_relative_eq!(f.eval(0.0), 1.0);
        assert_relative_eq!(f.eval(0.25), 1.5);
        assert_relative_eq!(f.eval(0.5), 3.0);
        assert_relative_eq!(f.eval(0.75), 3.5);
        assert_relative_eq!(f.eval(1.0), 5.0);
        assert_relative_eq!(f.eval(2.0), 5.0);
    }

    #[test]
    fn test_eer_on_complement_diagonal() {
        let fpr: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        let tpr: Vec<f64> = fpr.iter().map(|x| 1.0 - x).collect();
        assert_relative_eq!(equal_error_rate(&fpr, &tpr).unwrap(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_eer_on_perfect_classifier() {
        let eer = equal_error_rate(&[0.0, 0.0, 1.0], &[0.0, 1.0, 1.0]).unwrap();
        assert!(eer.abs() < 1e-9);
    }

    #[test]
    fn test_eer_on_chance_classifier() {
        let eer = equal_error_rate(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert_relative_eq!(eer, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_roc_is_an_evaluation_error() {
        let err = equal_error_rate(&[0.3, 0.3, 0.3], &[0.1, 0.5, 0.9]).unwrap_err();
        assert!(err.is_evaluation_failure());

        let err = equal_error_rate(&[0.0, f64::NAN], &[0.0, 1.0]).unwrap_err();
        assert!(err.is_evaluation_failure());
    }
}
