//! Pairwise consistency check between backward strategies.
//!
//! Every strategy is run through burn's real reverse pass on the same logits
//! and the same upstream gradient. The resulting logits gradients must agree
//! elementwise within an absolute tolerance.

use burn::{
    backend::Autodiff,
    config::Config,
    tensor::{backend::Backend, Distribution, ElementConversion, Tensor},
};
use tracing::{info, warn};

use super::{l2_wrap, BackwardStrategy, L2WrapConfig, PenaltyScaling};
use crate::error::{self, Error};

/// Inputs of one equivalence run.
#[derive(Config, Debug)]
pub struct EquivalenceCase {
    #[config(default = 2)]
    pub batch_size: usize,
    #[config(default = 3)]
    pub seq_len: usize,
    #[config(default = 5)]
    pub vocab_size: usize,
    #[config(default = 6)]
    pub token_amount: usize,
    /// Value of the wrapped loss.
    #[config(default = 1.0)]
    pub loss: f32,
    /// Gradient fed into the wrapped loss during backward.
    #[config(default = 1.0)]
    pub grad_output: f32,
    #[config(default = 42)]
    pub seed: u64,
    /// Maximum allowed absolute elementwise difference.
    #[config(default = 1e-6)]
    pub tolerance: f32,
}

impl EquivalenceCase {
    pub fn shape(&self) -> [usize; 3] {
        [self.batch_size, self.seq_len, self.vocab_size]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceReport {
    pub lhs: BackwardStrategy,
    pub rhs: BackwardStrategy,
    pub lhs_scaling: PenaltyScaling,
    pub rhs_scaling: PenaltyScaling,
    pub max_abs_diff: f32,
    pub tolerance: f32,
}

impl EquivalenceReport {
    pub fn passed(&self) -> bool {
        self.max_abs_diff <= self.tolerance
    }

    pub fn into_result(self) -> error::Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(Error::EquivalenceFailed {
                lhs: self.lhs,
                rhs: self.rhs,
                max_abs_diff: self.max_abs_diff,
                tolerance: self.tolerance,
            })
        }
    }
}

/// Logits gradient produced by one configuration through the autodiff graph.
///
/// An absent gradient (zero token amount) is returned as zeros so that two
/// skipped runs compare equal.
pub fn logits_gradient<B: Backend>(
    case: &EquivalenceCase,
    config: &L2WrapConfig,
    logits: Tensor<B, 3>,
) -> Tensor<B, 3> {
    let device = logits.device();
    let loss = Tensor::<Autodiff<B>, 1>::from_floats([case.loss], &device).require_grad();
    let y = Tensor::<Autodiff<B>, 3>::from_inner(logits).require_grad();

    let grads = l2_wrap(loss, y.clone(), case.token_amount, config)
        .mul_scalar(case.grad_output)
        .backward();

    y.grad(&grads)
        .unwrap_or_else(|| Tensor::zeros(case.shape(), &device))
}

/// Runs `lhs` and `rhs` on identical random logits and reports their distance.
pub fn compare_configs<B: Backend>(
    case: &EquivalenceCase,
    lhs: &L2WrapConfig,
    rhs: &L2WrapConfig,
    device: &B::Device,
) -> EquivalenceReport {
    B::seed(case.seed);
    let logits = Tensor::<B, 3>::random(case.shape(), Distribution::Normal(0.0, 1.0), device);

    let grad_lhs = logits_gradient(case, lhs, logits.clone());
    let grad_rhs = logits_gradient(case, rhs, logits);

    let max_abs_diff: f32 = if case.shape().contains(&0) {
        0.0
    } else {
        (grad_lhs - grad_rhs).abs().max().into_scalar().elem()
    };

    let report = EquivalenceReport {
        lhs: lhs.strategy,
        rhs: rhs.strategy,
        lhs_scaling: lhs.scaling,
        rhs_scaling: rhs.scaling,
        max_abs_diff,
        tolerance: case.tolerance,
    };

    if report.passed() {
        info!(
            lhs = %report.lhs,
            rhs = %report.rhs,
            max_abs_diff,
            "strategies agree"
        );
    } else {
        warn!(
            lhs = %report.lhs,
            rhs = %report.rhs,
            max_abs_diff,
            tolerance = case.tolerance,
            "strategies disagree"
        );
    }

    report
}

/// Compares two strategies under an otherwise shared configuration.
pub fn compare_strategies<B: Backend>(
    case: &EquivalenceCase,
    config: &L2WrapConfig,
    lhs: BackwardStrategy,
    rhs: BackwardStrategy,
    device: &B::Device,
) -> EquivalenceReport {
    compare_configs::<B>(
        case,
        &config.clone().with_strategy(lhs),
        &config.clone().with_strategy(rhs),
        device,
    )
}

/// Compares every unordered pair of [`BackwardStrategy::ALL`].
pub fn check_all_pairs<B: Backend>(
    case: &EquivalenceCase,
    config: &L2WrapConfig,
    device: &B::Device,
) -> error::Result<Vec<EquivalenceReport>> {
    let strategies = BackwardStrategy::ALL;
    let mut reports = Vec::new();

    for (i, &lhs) in strategies.iter().enumerate() {
        for &rhs in &strategies[i + 1..] {
            reports.push(compare_strategies::<B>(case, config, lhs, rhs, device).into_result()?);
        }
    }

    Ok(reports)
}
