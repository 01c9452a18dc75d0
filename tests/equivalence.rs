//! End-to-end consistency of the dense and sparse L2Wrap backward passes.
//!
//! Run with: cargo test --test equivalence

use burn::{
    backend::{Autodiff, NdArray},
    tensor::{Distribution, ElementConversion, Tensor},
};
use l2wrap::{
    l2_wrap,
    l2wrap::harness::{check_all_pairs, EquivalenceCase},
    BackwardStrategy, L2WrapConfig, PenaltyScaling,
};

type Inner = NdArray<f32>;
type Backend = Autodiff<Inner>;

const BATCH_SIZE: usize = 2;
const SEQ_LEN: usize = 3;
const VOCAB_SIZE: usize = 5;
const ATOL: f32 = 1e-6;

fn logits_grad(strategy: BackwardStrategy, y: &Tensor<Inner, 3>) -> Tensor<Inner, 3> {
    let device = Default::default();
    let config = L2WrapConfig::new()
        .with_strategy(strategy)
        .with_scaling(PenaltyScaling::UpstreamScaled);

    let loss = Tensor::<Backend, 1>::from_floats([1.0], &device).require_grad();
    let y = Tensor::<Backend, 3>::from_inner(y.clone()).require_grad();

    let out = l2_wrap(loss.clone(), y.clone(), BATCH_SIZE * SEQ_LEN, &config);
    assert_eq!(out.clone().into_data().to_vec::<f32>().unwrap(), vec![1.0]);

    let grads = out.backward();
    let grad_loss = loss.grad(&grads).expect("loss gradient");
    assert_eq!(grad_loss.into_data().to_vec::<f32>().unwrap(), vec![1.0]);

    y.grad(&grads).expect("logits gradient")
}

#[test]
fn dense_and_sparse_gradients_are_close() {
    let device = Default::default();
    let y = Tensor::<Inner, 3>::random(
        [BATCH_SIZE, SEQ_LEN, VOCAB_SIZE],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    let dense = logits_grad(BackwardStrategy::Dense, &y);
    let sparse = logits_grad(BackwardStrategy::Sparse, &y);

    let max_diff: f32 = (dense.clone() - sparse).abs().max().into_scalar().elem();
    assert!(
        max_diff <= ATOL,
        "Gradients from dense and sparse implementations differ by {max_diff}"
    );

    let nonzero: i64 = dense.not_equal_elem(0.0).int().sum().into_scalar().elem();
    assert!(nonzero as usize <= BATCH_SIZE * SEQ_LEN);
}

#[test]
fn harness_accepts_reference_case() {
    let case = EquivalenceCase::new();
    let config = L2WrapConfig::new().with_scaling(PenaltyScaling::UpstreamScaled);

    let reports = check_all_pairs::<Inner>(&case, &config, &Default::default())
        .expect("dense and sparse should agree");

    assert!(reports.iter().all(|report| report.passed()));
}
