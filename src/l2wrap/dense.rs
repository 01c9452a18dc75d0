use burn::tensor::{backend::Backend, Tensor};

use super::{
    context::SavedLogits,
    strategy::{PenaltyParams, PenaltyStrategy},
};

/// Scatters the penalty into a zero tensor shaped like the logits.
///
/// Keeps the full logits alive until backward.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseScatter;

impl PenaltyStrategy for DenseScatter {
    fn save<B: Backend>(&self, y: Tensor<B, 3>) -> SavedLogits<B> {
        SavedLogits::Full(y)
    }

    fn penalty<B: Backend>(
        &self,
        saved: SavedLogits<B>,
        params: &PenaltyParams<B>,
    ) -> Tensor<B, 3> {
        let argmax = saved.into_argmax();
        let device = argmax.device();

        // [batch_size, seq_len, 1]
        let values = params.row_values(&argmax).unsqueeze_dim::<3>(2);
        let indices = argmax.indices.unsqueeze_dim::<3>(2);

        Tensor::zeros(argmax.shape, &device).scatter(2, indices, values)
    }
}
