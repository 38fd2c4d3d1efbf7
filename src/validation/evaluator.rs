//! k-fold verification evaluator
//!
//! Embeddings arrive interleaved (`[left_0, right_0, left_1, right_1, ...]`).
//! Each pair is scored by the squared Euclidean distance between its two
//! embeddings and predicted "same" when that distance is below a threshold.
//! Contiguous, unshuffled folds give an ROC curve, held-out accuracy at the
//! best training threshold, and the validation rate at a target FAR.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::curve::Interp1d;
use crate::config::ValidationConfig;
use crate::error::{Error, Result};

/// Output of a pair evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// True positive rate per ROC threshold, averaged over folds
    pub tpr: Vec<f64>,
    /// False positive rate per ROC threshold, averaged over folds
    pub fpr: Vec<f64>,
    /// Held-out accuracy per fold
    pub accuracy: Vec<f64>,
    /// Mean validation rate at the FAR target
    pub val: f64,
    /// Population standard deviation of the validation rate over folds
    pub val_std: f64,
    /// Mean false accept rate reached
    pub far: f64,
}

/// Turns interleaved pair embeddings into verification statistics
pub trait PairEvaluator: Send + Sync {
    /// Evaluate `embeddings` of shape `(2 * pairs, dim)` against `is_same`
    fn evaluate(&self, embeddings: &Array2<f32>, is_same: &[bool]) -> Result<EvaluationResult>;
}

/// Threshold-sweep evaluator over contiguous folds
#[derive(Debug, Clone)]
pub struct KFoldEvaluator {
    num_folds: usize,
    roc_thresholds: Vec<f64>,
    val_thresholds: Vec<f64>,
    far_target: f64,
}

impl Default for KFoldEvaluator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl KFoldEvaluator {
    /// Evaluator with the folds and sweeps of `config`
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            num_folds: config.num_folds,
            roc_thresholds: arange(config.max_threshold, config.roc_threshold_step),
            val_thresholds: arange(config.max_threshold, config.val_threshold_step),
            far_target: config.far_target,
        }
    }

    /// Thresholds swept for the ROC curve
    pub fn roc_thresholds(&self) -> &[f64] {
        &self.roc_thresholds
    }

    fn roc(&self, dist: &Array1<f64>, is_same: &[bool], folds: &[Fold]) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let per_fold: Vec<(Vec<f64>, Vec<f64>, f64)> = folds
            .par_iter()
            .map(|fold| {
                let (train_dist, train_same) = fold.train(dist, is_same);
                let (test_dist, test_same) = fold.test(dist, is_same);

                let best = self
                    .roc_thresholds
                    .iter()
                    .map(|&t| confusion(t, train_dist.view(), &train_same).accuracy())
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, acc)| if acc > best.1 { (i, acc) } else { best })
                    .0;

                let (tprs, fprs): (Vec<f64>, Vec<f64>) = self
                    .roc_thresholds
                    .iter()
                    .map(|&t| {
                        let c = confusion(t, test_dist.view(), &test_same);
                        (c.tpr(), c.fpr())
                    })
                    .unzip();
                let accuracy = confusion(self.roc_thresholds[best], test_dist.view(), &test_same).accuracy();
                debug!(
                    fold = fold.index,
                    threshold = self.roc_thresholds[best],
                    accuracy,
                    "Evaluated ROC fold"
                );
                (tprs, fprs, accuracy)
            })
            .collect();

        let n = self.roc_thresholds.len();
        let mut tpr = vec![0.0; n];
        let mut fpr = vec![0.0; n];
        let mut accuracy = Vec::with_capacity(per_fold.len());
        for (tprs, fprs, acc) in &per_fold {
            for i in 0..n {
                tpr[i] += tprs[i] / per_fold.len() as f64;
                fpr[i] += fprs[i] / per_fold.len() as f64;
            }
            accuracy.push(*acc);
        }
        Ok((tpr, fpr, accuracy))
    }

    fn val(&self, dist: &Array1<f64>, is_same: &[bool], folds: &[Fold]) -> Result<(f64, f64, f64)> {
        let per_fold: Vec<(f64, f64)> = folds
            .par_iter()
            .map(|fold| {
                let (train_dist, train_same) = fold.train(dist, is_same);
                let (test_dist, test_same) = fold.test(dist, is_same);

                let far_train: Vec<f64> = self
                    .val_thresholds
                    .iter()
                    .map(|&t| confusion(t, train_dist.view(), &train_same).far())
                    .collect();
                let max_far = far_train.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let threshold = if max_far >= self.far_target {
                    Interp1d::new(&far_train, &self.val_thresholds)?.eval(self.far_target)
                } else {
                    0.0
                };

                let c = confusion(threshold, test_dist.view(), &test_same);
                Ok((c.val(), c.far()))
            })
            .collect::<Result<_>>()?;

        let vals = Array1::from_iter(per_fold.iter().map(|(v, _)| *v));
        let fars = Array1::from_iter(per_fold.iter().map(|(_, f)| *f));
        let val = vals.mean().unwrap_or(0.0);
        let val_std = vals.std(0.0);
        let far = fars.mean().unwrap_or(0.0);
        Ok((val, val_std, far))
    }
}

impl PairEvaluator for KFoldEvaluator {
    fn evaluate(&self, embeddings: &Array2<f32>, is_same: &[bool]) -> Result<EvaluationResult> {
        if embeddings.nrows() % 2 != 0 {
            return Err(Error::evaluation(format!(
                "interleaved embeddings need an even row count, got {}",
                embeddings.nrows()
            )));
        }
        let pairs = (embeddings.nrows() / 2).min(is_same.len());
        let folds = Fold::split(pairs, self.num_folds)?;
        let dist = pair_distances(embeddings, pairs);
        let is_same = &is_same[..pairs];

        let (tpr, fpr, accuracy) = self.roc(&dist, is_same, &folds)?;
        let (val, val_std, far) = self.val(&dist, is_same, &folds)?;
        Ok(EvaluationResult {
            tpr,
            fpr,
            accuracy,
            val,
            val_std,
            far,
        })
    }
}

/// `[0, stop)` in increments of `step`
fn arange(stop: f64, step: f64) -> Vec<f64> {
    let n = (stop / step).ceil().max(0.0) as usize;
    (0..n).map(|i| i as f64 * step).collect()
}

/// Squared Euclidean distance of each interleaved pair
fn pair_distances(embeddings: &Array2<f32>, pairs: usize) -> Array1<f64> {
    let left = embeddings.slice(ndarray::s![0..2 * pairs;2, ..]);
    let right = embeddings.slice(ndarray::s![1..2 * pairs;2, ..]);
    let diff = (&left - &right).mapv(|v| f64::from(v) * f64::from(v));
    diff.sum_axis(Axis(1))
}

#[derive(Debug, Clone, Copy, Default)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn tpr(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn fpr(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.tp + self.fp + self.tn + self.fn_)
    }

    /// Fraction of same pairs accepted
    fn val(&self) -> f64 {
        self.tpr()
    }

    /// Fraction of different pairs accepted
    fn far(&self) -> f64 {
        self.fpr()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn confusion(threshold: f64, dist: ArrayView1<f64>, is_same: &[bool]) -> Confusion {
    let mut c = Confusion::default();
    for (&d, &same) in dist.iter().zip(is_same) {
        match (d < threshold, same) {
            (true, true) => c.tp += 1,
            (true, false) => c.fp += 1,
            (false, false) => c.tn += 1,
            (false, true) => c.fn_ += 1,
        }
    }
    c
}

/// One contiguous test fold; the rest is training data
#[derive(Debug, Clone, Copy)]
struct Fold {
    index: usize,
    start: usize,
    end: usize,
}

impl Fold {
    /// Contiguous folds, the first `n % k` one element larger
    fn split(n: usize, k: usize) -> Result<Vec<Fold>> {
        if k < 2 {
            return Err(Error::evaluation(format!("k-fold needs at least 2 folds, got {}", k)));
        }
        if n < k {
            return Err(Error::evaluation(format!(
                "cannot split {} pairs into {} folds",
                n, k
            )));
        }
        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for index in 0..k {
            let len = n / k + usize::from(index < n % k);
            folds.push(Fold {
                index,
                start,
                end: start + len,
            });
            start += len;
        }
        Ok(folds)
    }

    fn test(&self, dist: &Array1<f64>, is_same: &[bool]) -> (Array1<f64>, Vec<bool>) {
        (
            dist.slice(ndarray::s![self.start..self.end]).to_owned(),
            is_same[self.start..self.end].to_vec(),
        )
    }

    fn train(&self, dist: &Array1<f64>, is_same: &[bool]) -> (Array1<f64>, Vec<bool>) {
        let keep = |i: &usize| *i < self.start || *i >= self.end;
        let indices: Vec<usize> = (0..dist.len()).filter(keep).collect();
        (
            dist.select(Axis(0), &indices),
            indices.iter().map(|&i| is_same[i]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Pairs alternate same / different; same pairs are identical, different
    /// pairs are orthogonal unit vectors (squared distance 2)
    fn separable(pairs: usize) -> (Array2<f32>, Vec<bool>) {
        let mut rows = Vec::with_capacity(pairs * 4);
        let mut is_same = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let same = i % 2 == 0;
            rows.extend_from_slice(&[1.0, 0.0]);
            if same {
                rows.extend_from_slice(&[1.0, 0.0]);
            } else {
                rows.extend_from_slice(&[0.0, 1.0]);
            }
            is_same.push(same);
        }
        (Array2::from_shape_vec((pairs * 2, 2), rows).unwrap(), is_same)
    }

    #[test]
    fn test_arange_matches_sweep_lengths() {
        assert_eq!(arange(4.0, 0.01).len(), 400);
        assert_eq!(arange(4.0, 0.001).len(), 4000);
        assert_eq!(arange(4.0, 0.01)[0], 0.0);
    }

    #[test]
    fn test_folds_are_contiguous() {
        let folds = Fold::split(23, 10).unwrap();
        assert_eq!(folds.len(), 10);
        assert_eq!((folds[0].start, folds[0].end), (0, 3));
        assert_eq!((folds[2].start, folds[2].end), (6, 9));
        assert_eq!((folds[3].start, folds[3].end), (9, 11));
        assert_eq!(folds[9].end, 23);
        assert!(Fold::split(5, 10).is_err());
    }

    #[test]
    fn test_pair_distances() {
        let embeddings = array![[1f32, 0.], [0., 1.], [0.5, 0.5], [0.5, 0.5]];
        let dist = pair_distances(&embeddings, 2);
        assert_relative_eq!(dist[0], 2.0);
        assert_relative_eq!(dist[1], 0.0);
    }

    #[test]
    fn test_confusion_rates() {
        let dist = array![0.1, 0.5, 3.0, 0.2];
        let c = confusion(0.3, dist.view(), &[true, true, false, false]);
        assert_eq!((c.tp, c.fn_, c.fp, c.tn), (1, 1, 1, 1));
        assert_relative_eq!(c.accuracy(), 0.5);
        assert_eq!(confusion(0.3, dist.view(), &[]).tpr(), 0.0);
    }

    #[test]
    fn test_separable_pairs_are_perfectly_classified() {
        let (embeddings, is_same) = separable(40);
        let result = KFoldEvaluator::default().evaluate(&embeddings, &is_same).unwrap();

        assert_eq!(result.tpr.len(), 400);
        assert_eq!(result.accuracy.len(), 10);
        for acc in &result.accuracy {
            assert_relative_eq!(*acc, 1.0);
        }
        // threshold 0 accepts nothing, anything in (0, 2] accepts only same pairs
        assert_eq!(result.tpr[0], 0.0);
        assert_relative_eq!(result.tpr[100], 1.0);
        assert_relative_eq!(result.fpr[100], 0.0);
        assert_relative_eq!(result.fpr[399], 1.0);
        assert_relative_eq!(result.val, 1.0);
        assert_relative_eq!(result.val_std, 0.0);
    }

    #[test]
    fn test_rejects_odd_rows_and_too_few_pairs() {
        let odd = Array2::<f32>::zeros((3, 2));
        assert!(KFoldEvaluator::default().evaluate(&odd, &[true]).is_err());

        let (few, is_same) = separable(4);
        let err = KFoldEvaluator::default().evaluate(&few, &is_same).unwrap_err();
        assert!(err.is_evaluation_failure());
    }
}
