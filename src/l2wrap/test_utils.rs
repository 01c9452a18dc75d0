//! Shared test utilities for the l2wrap operator.

use burn::{
    backend::{Autodiff, NdArray},
    tensor::{backend::Backend, Distribution, ElementConversion, Tensor},
};

pub type TestBackend = NdArray<f32>;
pub type TestAutodiffBackend = Autodiff<TestBackend>;

/// Standard-normal logits of the given `[batch_size, seq_len, vocab_size]` shape.
pub fn random_logits<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 3> {
    Tensor::random(shape, Distribution::Normal(0.0, 1.0), device)
}

pub fn nonzero_count<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> usize {
    let count: i64 = tensor
        .not_equal_elem(0.0)
        .int()
        .sum()
        .into_scalar()
        .elem();
    count as usize
}

/// Panics when any element of `actual` is further than `atol + rtol * |expected|` away.
pub fn assert_data_close(actual: &[f32], expected: &[f32], rtol: f32, atol: f32, name: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{name}: length mismatch ({} vs {})",
        actual.len(),
        expected.len()
    );

    let worst = actual
        .iter()
        .zip(expected)
        .enumerate()
        .map(|(i, (&a, &e))| (i, a, e, (a - e).abs()))
        .max_by(|x, y| x.3.total_cmp(&y.3));

    if let Some((idx, a, e, diff)) = worst {
        let tolerance = atol + rtol * e.abs();
        assert!(
            diff <= tolerance,
            "{name}: worst element {idx} is {a}, expected {e} (diff {diff}, tolerance {tolerance})",
        );
    }
}
