use burn::tensor::{backend::Backend, Tensor};

use super::{
    argmax::ArgMax, context::SavedLogits, dense::DenseScatter, sparse::SparseCoo,
    BackwardStrategy, PenaltyScaling,
};

/// Scalars and upstream gradient that shape the penalty values.
#[derive(Debug, Clone)]
pub struct PenaltyParams<B: Backend> {
    /// `coefficient / token_amount`
    pub factor: f64,
    pub scaling: PenaltyScaling,
    pub min_max_logit: Option<f64>,
    /// Gradient of the wrapped loss, `[1]`.
    pub grad_output: Tensor<B, 1>,
}

impl<B: Backend> PenaltyParams<B> {
    /// Penalty per `(batch, position)` row, `[batch_size, seq_len]`.
    pub fn row_values(&self, argmax: &ArgMax<B>) -> Tensor<B, 2> {
        let mut values = argmax.values.clone();

        if let Some(threshold) = self.min_max_logit {
            let below = values.clone().lower_elem(threshold);
            values = values.mask_fill(below, 0.0);
        }

        let values = values.mul_scalar(self.factor);

        match self.scaling {
            PenaltyScaling::Unscaled => values,
            PenaltyScaling::UpstreamScaled => values * self.grad_output.clone().reshape([1, 1]),
        }
    }
}

/// One way of turning saved logits into the penalty gradient for `y`.
///
/// Implementations must agree with each other up to floating-point error; the
/// choice only affects what is kept between forward and backward and how the
/// gradient is materialized.
pub trait PenaltyStrategy {
    /// Reduces the logits to whatever backward needs.
    fn save<B: Backend>(&self, y: Tensor<B, 3>) -> SavedLogits<B>;

    /// Gradient for `y`, zero everywhere except the arg-max of each row.
    fn penalty<B: Backend>(
        &self,
        saved: SavedLogits<B>,
        params: &PenaltyParams<B>,
    ) -> Tensor<B, 3>;
}

impl PenaltyStrategy for BackwardStrategy {
    fn save<B: Backend>(&self, y: Tensor<B, 3>) -> SavedLogits<B> {
        match self {
            Self::Dense => DenseScatter.save(y),
            Self::Sparse => SparseCoo.save(y),
        }
    }

    fn penalty<B: Backend>(
        &self,
        saved: SavedLogits<B>,
        params: &PenaltyParams<B>,
    ) -> Tensor<B, 3> {
        match self {
            Self::Dense => DenseScatter.penalty(saved, params),
            Self::Sparse => SparseCoo.penalty(saved, params),
        }
    }
}
