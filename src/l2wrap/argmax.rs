use burn::tensor::{backend::Backend, Int, Tensor};

/// Per-row maximum of a logits tensor over its vocabulary axis.
#[derive(Debug, Clone)]
pub struct ArgMax<B: Backend> {
    /// `[batch_size, seq_len]`
    pub values: Tensor<B, 2>,
    /// `[batch_size, seq_len]`, index into the vocabulary axis.
    pub indices: Tensor<B, 2, Int>,
    /// Shape of the logits the reduction came from.
    pub shape: [usize; 3],
}

impl<B: Backend> ArgMax<B> {
    /// Reduces `[batch_size, seq_len, vocab_size]` logits over the last axis.
    pub fn from_logits(y: Tensor<B, 3>) -> Self {
        let shape = y.dims();
        let (values, indices) = y.max_dim_with_indices(2);
        Self {
            values: values.squeeze(2),
            indices: indices.squeeze(2),
            shape,
        }
    }

    pub fn rows(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    pub fn device(&self) -> B::Device {
        self.values.device()
    }
}
