//! Categorical cross-entropy over probabilities and batch accuracy.

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

/// Probabilities are clipped to [EPSILON, 1 - EPSILON] before the log
pub const EPSILON: f32 = 1e-7;

/// Mean categorical cross-entropy between predicted probabilities and
/// one-hot targets, both `[batch_size, num_classes]`. Returns a `[1]` tensor.
pub fn categorical_crossentropy<B: Backend>(
    probabilities: Tensor<B, 2>,
    one_hot: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let clipped = probabilities.clamp(EPSILON, 1.0 - EPSILON);
    (clipped.log() * one_hot).sum_dim(1).neg().mean()
}

/// Number of rows whose argmax equals the target label
pub fn count_correct<B: Backend>(probabilities: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = probabilities.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Index of the largest value in each row of a flattened `[rows, cols]` buffer
pub fn argmax_rows(values: &[f32], cols: usize) -> Vec<usize> {
    if cols == 0 {
        return Vec::new();
    }
    values
        .chunks(cols)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_value), (i, &v)| {
                    if v > best_value {
                        (i, v)
                    } else {
                        (best, best_value)
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tensor2(values: Vec<f32>, shape: [usize; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn test_crossentropy_matches_manual() {
        let probs = tensor2(vec![0.7, 0.2, 0.1, 0.1, 0.8, 0.1], [2, 3]);
        let targets = tensor2(vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0], [2, 3]);

        let loss: f32 = categorical_crossentropy(probs, targets).into_scalar().elem();
        let expected = -(0.7f32.ln() + 0.1f32.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_crossentropy_clips_zero_probability() {
        let probs = tensor2(vec![0.0, 1.0], [1, 2]);
        let targets = tensor2(vec![1.0, 0.0], [1, 2]);

        let loss: f32 = categorical_crossentropy(probs, targets).into_scalar().elem();
        assert!(loss.is_finite());
        assert!((loss - (-EPSILON.ln())).abs() < 1e-3);
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let probs = tensor2(vec![0.9, 0.1, 0.3, 0.7, 0.6, 0.4], [3, 2]);
        let targets = TensorData::new(vec![0i64, 1, 1], [3]);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(targets, &device);

        assert_eq!(count_correct(probs, targets), 2);
    }

    #[test]
    fn test_argmax_rows() {
        assert_eq!(argmax_rows(&[0.1, 0.9, 0.8, 0.2, 0.5, 0.5], 2), vec![1, 0, 0]);
        assert!(argmax_rows(&[], 3).is_empty());
    }
}
