use std::fmt;

use ndarray::{Array2, ArrayView1};

/// Probabilities are clipped to this before taking logs
const LOG_LOSS_EPSILON: f32 = 1e-15;

/// Quality of a fitted model on a set of labeled samples
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    pub samples: usize,
    /// Fraction of samples classified correctly
    pub micro_accuracy: f32,
    /// Mean of per-class accuracies over classes present in the data
    pub macro_accuracy: f32,
    /// Mean negative log-probability of the true class
    pub log_loss: f32,
}

impl EvaluationMetrics {
    /// Evaluates a matrix of class probabilities (one row per sample) against true classes
    pub fn evaluate(probs: &Array2<f32>, truth: &[usize]) -> Self {
        let predicted: Vec<usize> = probs.rows().into_iter().map(argmax).collect();
        let log_loss = if truth.is_empty() {
            0.0
        } else {
            truth
                .iter()
                .zip(probs.rows())
                .map(|(&class, row)| -row[class].max(LOG_LOSS_EPSILON).ln())
                .sum::<f32>()
                / truth.len() as f32
        };

        Self {
            samples: truth.len(),
            micro_accuracy: accuracy(&predicted, truth),
            macro_accuracy: macro_accuracy(&predicted, truth, probs.ncols()),
            log_loss,
        }
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "samples={} micro_accuracy={:.4} macro_accuracy={:.4} log_loss={:.4}",
            self.samples, self.micro_accuracy, self.macro_accuracy, self.log_loss
        )
    }
}

/// Index of the largest score; the first one wins ties
pub fn argmax(scores: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    best
}

pub fn accuracy(predicted: &[usize], truth: &[usize]) -> f32 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    correct as f32 / truth.len() as f32
}

pub fn macro_accuracy(predicted: &[usize], truth: &[usize], num_classes: usize) -> f32 {
    let mut correct = vec![0usize; num_classes];
    let mut total = vec![0usize; num_classes];
    for (&p, &t) in predicted.iter().zip(truth.iter()) {
        total[t] += 1;
        if p == t {
            correct[t] += 1;
        }
    }

    let per_class: Vec<f32> = correct
        .iter()
        .zip(total.iter())
        .filter(|&(_, &n)| n > 0)
        .map(|(&c, &n)| c as f32 / n as f32)
        .collect();
    if per_class.is_empty() {
        0.0
    } else {
        per_class.iter().sum::<f32>() / per_class.len() as f32
    }
}
