use burn::tensor::{backend::Backend, Int, Tensor};

use super::{
    argmax::ArgMax,
    context::SavedLogits,
    strategy::{PenaltyParams, PenaltyStrategy},
};

/// A rank-3 tensor stored as a coordinate list.
#[derive(Debug, Clone)]
pub struct CooTensor<B: Backend> {
    /// `[3, nnz]`: batch, sequence and vocabulary coordinate of every value.
    pub indices: Tensor<B, 2, Int>,
    /// `[nnz]`
    pub values: Tensor<B, 1>,
    pub shape: [usize; 3],
}

impl<B: Backend> CooTensor<B> {
    pub fn new(indices: Tensor<B, 2, Int>, values: Tensor<B, 1>, shape: [usize; 3]) -> Self {
        let [rank, nnz] = indices.dims();
        debug_assert_eq!(rank, 3);
        debug_assert_eq!(values.dims(), [nnz]);
        Self {
            indices,
            values,
            shape,
        }
    }

    /// One coordinate list per `(batch, position)` row, pointing at its arg-max.
    pub fn from_argmax(argmax: ArgMax<B>, values: Tensor<B, 2>) -> Self {
        let [batch_size, seq_len, _vocab_size] = argmax.shape;
        let rows = argmax.rows();
        let device = argmax.device();

        if rows == 0 {
            let indices = Tensor::<B, 2, Int>::zeros([3, 0], &device);
            return Self::new(indices, values.reshape([0]), argmax.shape);
        }

        // 0,0,..,1,1,..  (each batch index repeated seq_len times)
        let batch_indices = Tensor::<B, 1, Int>::arange(0..batch_size as i64, &device)
            .reshape([batch_size, 1])
            .repeat_dim(1, seq_len)
            .reshape([rows]);
        // 0,1,..,0,1,..  (sequence range tiled batch_size times)
        let seq_indices =
            Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device).repeat_dim(0, batch_size);
        let vocab_indices = argmax.indices.reshape([rows]);

        let indices = Tensor::stack::<2>(vec![batch_indices, seq_indices, vocab_indices], 0);

        Self::new(indices, values.reshape([rows]), argmax.shape)
    }

    pub fn nnz(&self) -> usize {
        self.values.dims()[0]
    }

    /// Materializes the dense tensor. Values at repeated coordinates are summed.
    pub fn into_dense(self) -> Tensor<B, 3> {
        let [batch_size, seq_len, vocab_size] = self.shape;
        let nnz = self.nnz();
        let device = self.values.device();

        if nnz == 0 {
            return Tensor::zeros(self.shape, &device);
        }

        let coordinate = |axis: usize| {
            self.indices
                .clone()
                .slice([axis..axis + 1, 0..nnz])
                .reshape([nnz])
        };
        let flat = coordinate(0).mul_scalar((seq_len * vocab_size) as i64)
            + coordinate(1).mul_scalar(vocab_size as i64)
            + coordinate(2);

        Tensor::<B, 1>::zeros([batch_size * seq_len * vocab_size], &device)
            .scatter(0, flat, self.values)
            .reshape(self.shape)
    }
}

/// Builds the penalty as a sparse tensor over the arg-max coordinates and
/// densifies it.
///
/// Only the `[batch_size, seq_len]` reduction is kept between forward and
/// backward, which matters for large vocabularies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCoo;

impl PenaltyStrategy for SparseCoo {
    fn save<B: Backend>(&self, y: Tensor<B, 3>) -> SavedLogits<B> {
        SavedLogits::Reduced(ArgMax::from_logits(y))
    }

    fn penalty<B: Backend>(
        &self,
        saved: SavedLogits<B>,
        params: &PenaltyParams<B>,
    ) -> Tensor<B, 3> {
        let argmax = saved.into_argmax();
        let values = params.row_values(&argmax);

        CooTensor::from_argmax(argmax, values).into_dense()
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::l2wrap::test_utils::{assert_data_close, TestBackend};

    #[test]
    fn coordinates_cover_every_row() {
        let device = Default::default();
        let y = Tensor::<TestBackend, 3>::from_data(
            TensorData::from([
                [[0.0f32, 1.0, 0.0], [3.0, 0.0, 0.0]],
                [[0.0, 0.0, 2.0], [0.0, 4.0, 0.0]],
            ]),
            &device,
        );
        let argmax = ArgMax::from_logits(y);
        let values = argmax.values.clone();

        let coo = CooTensor::from_argmax(argmax, values);

        assert_eq!(coo.nnz(), 4);
        let indices = coo.indices.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(
            indices,
            vec![
                0, 0, 1, 1, // batch
                0, 1, 0, 1, // sequence
                1, 0, 2, 1, // vocab
            ]
        );
    }

    #[test]
    fn densify_places_and_accumulates_values() {
        let device = Default::default();
        let indices = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::from([[0i64, 1, 1], [1, 0, 0], [2, 0, 0]]),
            &device,
        );
        let values = Tensor::<TestBackend, 1>::from_floats([1.5, 2.0, 0.5], &device);

        let dense = CooTensor::new(indices, values, [2, 2, 3]).into_dense();

        let dense = dense.into_data().to_vec::<f32>().unwrap();
        #[rustfmt::skip]
        let expected = [
            0.0, 0.0, 0.0,   0.0, 0.0, 1.5,
            2.5, 0.0, 0.0,   0.0, 0.0, 0.0,
        ];
        assert_data_close(&dense, &expected, 0.0, 1e-7, "dense");
    }

    #[test]
    fn empty_sequence_densifies_to_zeros() {
        let y = Tensor::<TestBackend, 3>::zeros([2, 0, 5], &Default::default());
        let argmax = ArgMax::from_logits(y);
        let values = argmax.values.clone();

        let coo = CooTensor::from_argmax(argmax, values);
        assert_eq!(coo.nnz(), 0);

        assert_eq!(coo.into_dense().dims(), [2, 0, 5]);
    }
}
