use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::TrainingConfig;

/// Features whose spread is below this are centred but not rescaled
const MIN_FEATURE_STD: f32 = 1e-6;
/// Bound of the uniform weight initialisation
const INIT_SCALE: f32 = 0.01;

/// Multinomial logistic regression over standardised features.
///
/// `weights` has one row per class in label-vocabulary order. The per-feature
/// mean and inverse spread of the training data are stored so inference applies
/// exactly the standardisation used during fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    weights: Array2<f32>,
    bias: Array1<f32>,
    feature_mean: Array1<f32>,
    feature_scale: Array1<f32>,
}

impl SoftmaxModel {
    /// Fits the model with full-batch gradient descent.
    ///
    /// `x` is `n_samples x n_features`, `y` holds class indices below
    /// `num_classes`. Returns the model and the number of epochs run. Callers
    /// validate that the data is non-empty.
    pub(crate) fn fit(
        x: &Array2<f32>,
        y: &[usize],
        num_classes: usize,
        config: &TrainingConfig,
    ) -> (Self, usize) {
        let (n_samples, n_features) = x.dim();
        let n = n_samples as f32;

        let feature_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let feature_scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > MIN_FEATURE_STD { 1.0 / s } else { 1.0 });
        let xs = (x - &feature_mean) * &feature_scale;

        let mut targets = Array2::<f32>::zeros((n_samples, num_classes));
        for (row, &class) in y.iter().enumerate() {
            targets[[row, class]] = 1.0;
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut model = Self {
            weights: Array2::from_shape_fn((num_classes, n_features), |_| {
                rng.gen_range(-INIT_SCALE..INIT_SCALE)
            }),
            bias: Array1::zeros(num_classes),
            feature_mean,
            feature_scale,
        };

        let mut epochs_run = 0;
        for epoch in 0..config.epochs {
            epochs_run = epoch + 1;
            let probs = model.standardized_scores(&xs);
            let diff = probs - &targets;

            let grad_w = diff.t().dot(&xs) / n + &model.weights * config.l2;
            let grad_b = diff.sum_axis(Axis(0)) / n;
            model.weights.scaled_add(-config.learning_rate, &grad_w);
            model.bias.scaled_add(-config.learning_rate, &grad_b);

            let max_grad = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f32, |m, g| m.max(g.abs()));
            if max_grad < config.tolerance {
                debug!("Converged after {} epochs (max gradient {:.2e})", epochs_run, max_grad);
                break;
            }
        }

        (model, epochs_run)
    }

    pub fn num_classes(&self) -> usize {
        self.weights.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Class probabilities for one raw feature vector.
    ///
    /// The caller guarantees `features.len() == self.num_features()`.
    pub fn scores(&self, features: ArrayView1<f32>) -> Array1<f32> {
        let standardized = (&features - &self.feature_mean) * &self.feature_scale;
        let mut logits = self.weights.dot(&standardized) + &self.bias;
        softmax_in_place(logits.view_mut());
        logits
    }

    /// Class probabilities for a batch of raw feature rows
    pub(crate) fn scores_batch(&self, x: &Array2<f32>) -> Array2<f32> {
        let xs = (x - &self.feature_mean) * &self.feature_scale;
        self.standardized_scores(&xs)
    }

    fn standardized_scores(&self, xs: &Array2<f32>) -> Array2<f32> {
        let mut logits = xs.dot(&self.weights.t()) + &self.bias;
        for row in logits.rows_mut() {
            softmax_in_place(row);
        }
        logits
    }
}

fn softmax_in_place(mut logits: ndarray::ArrayViewMut1<f32>) {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    logits.mapv_inplace(|v| (v - max).exp());
    let sum = logits.sum();
    logits.mapv_inplace(|v| v / sum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn config() -> TrainingConfig {
        TrainingConfig {
            epochs: 500,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_softmax_is_a_distribution() {
        let mut logits = array![1000.0f32, 999.0, -5.0];
        softmax_in_place(logits.view_mut());
        assert!((logits.sum() - 1.0).abs() < 1e-5);
        assert!(logits.iter().all(|&p| p >= 0.0 && p.is_finite()));
        assert!(logits[0] > logits[1]);
    }

    #[test]
    fn test_separates_linearly_separable_classes() {
        let x = array![
            [0.0f32, 0.1],
            [0.1, 0.0],
            [0.2, 0.1],
            [5.0, 5.1],
            [5.1, 4.9],
            [4.8, 5.0],
            [0.0, 9.0],
            [0.2, 9.1],
            [0.1, 8.8],
        ];
        let y = [0, 0, 0, 1, 1, 1, 2, 2, 2];

        let (model, epochs) = SoftmaxModel::fit(&x, &y, 3, &config());
        assert!(epochs > 0);
        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.num_features(), 2);

        let probs = model.scores_batch(&x);
        for (row, &class) in probs.rows().into_iter().zip(y.iter()) {
            let best = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(best, class);
        }

        let single = model.scores(x.row(4));
        assert!((single.sum() - 1.0).abs() < 1e-5);
        assert!(single
            .iter()
            .zip(probs.row(4).iter())
            .all(|(a, b)| (a - b).abs() < 1e-5));
    }

    #[test]
    fn test_constant_feature_is_not_rescaled() {
        let x = array![[1.0f32, 0.0], [1.0, 1.0]];
        let (model, _) = SoftmaxModel::fit(&x, &[0, 1], 2, &config());
        assert_eq!(model.feature_scale[0], 1.0);
        assert!((model.feature_scale[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let x = array![[0.0f32, 1.0], [1.0, 0.0], [0.5, 0.5]];
        let y = [0, 1, 1];
        let (a, _) = SoftmaxModel::fit(&x, &y, 2, &config());
        let (b, _) = SoftmaxModel::fit(&x, &y, 2, &config());
        assert_eq!(a, b);
    }
}
