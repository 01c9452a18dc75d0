use burn::tensor::{backend::Backend, Tensor};
use tracing::debug;

use super::{
    argmax::ArgMax,
    strategy::{PenaltyParams, PenaltyStrategy},
    BackwardStrategy, L2WrapConfig, PenaltyScaling,
};

/// What a strategy keeps of the logits between forward and backward.
#[derive(Debug, Clone)]
pub enum SavedLogits<B: Backend> {
    /// The logits themselves, `[batch_size, seq_len, vocab_size]`.
    Full(Tensor<B, 3>),
    /// Only the per-row maximum and its index.
    Reduced(ArgMax<B>),
}

impl<B: Backend> SavedLogits<B> {
    pub fn into_argmax(self) -> ArgMax<B> {
        match self {
            Self::Full(y) => ArgMax::from_logits(y),
            Self::Reduced(argmax) => argmax,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        match self {
            Self::Full(y) => y.dims(),
            Self::Reduced(argmax) => argmax.shape,
        }
    }
}

/// State captured by the forward pass and consumed once by backward.
#[derive(Debug, Clone)]
pub enum SavedContext<B: Backend> {
    /// `token_amount` was zero: backward passes the loss gradient only.
    Skip,
    Penalty {
        logits: SavedLogits<B>,
        /// `coefficient / token_amount`
        factor: f64,
        strategy: BackwardStrategy,
        scaling: PenaltyScaling,
        min_max_logit: Option<f64>,
    },
}

/// Gradients produced by the L2Wrap node.
///
/// `token_amount` is a plain count and never receives a gradient, so it has
/// no field here.
#[derive(Debug, Clone)]
pub struct L2WrapGrads<B: Backend> {
    /// Always the upstream gradient, untouched.
    pub loss: Tensor<B, 1>,
    /// `None` when the context was captured with `token_amount == 0`.
    pub y: Option<Tensor<B, 3>>,
}

impl<B: Backend> SavedContext<B> {
    /// Forward half of the operator: keeps what `config.strategy` needs of `y`.
    pub fn capture(y: Tensor<B, 3>, token_amount: usize, config: &L2WrapConfig) -> Self {
        if token_amount == 0 {
            debug!("token_amount is zero, no penalty will be applied");
            return Self::Skip;
        }

        let factor = config.coefficient / token_amount as f64;
        debug!(
            strategy = %config.strategy,
            scaling = %config.scaling,
            token_amount,
            factor,
            "capturing l2wrap context"
        );

        Self::Penalty {
            logits: config.strategy.save(y),
            factor,
            strategy: config.strategy,
            scaling: config.scaling,
            min_max_logit: config.min_max_logit,
        }
    }

    /// Backward half of the operator.
    pub fn backward(self, grad_output: Tensor<B, 1>) -> L2WrapGrads<B> {
        match self {
            Self::Skip => L2WrapGrads {
                loss: grad_output,
                y: None,
            },
            Self::Penalty {
                logits,
                factor,
                strategy,
                scaling,
                min_max_logit,
            } => {
                let params = PenaltyParams {
                    factor,
                    scaling,
                    min_max_logit,
                    grad_output,
                };
                let grad_y = strategy.penalty(logits, &params);

                L2WrapGrads {
                    loss: params.grad_output,
                    y: Some(grad_y),
                }
            }
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}
