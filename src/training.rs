use burn::{
    config::Config,
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::ElementConversion,
    train::ClassificationOutput,
};

use crate::l2wrap::{l2_wrap, L2WrapBackend, L2WrapConfig};

#[derive(Config, Debug)]
pub struct PenalizedLossConfig {
    pub l2wrap: L2WrapConfig,
    /// Target id excluded from both the loss and the token count.
    pub pad_token: Option<usize>,
}

/// Cross-entropy over next-token logits with the L2Wrap penalty attached.
#[derive(Debug, Clone)]
pub struct PenalizedLoss {
    l2wrap: L2WrapConfig,
    pad_token: Option<usize>,
}

impl PenalizedLossConfig {
    pub fn init(&self) -> PenalizedLoss {
        PenalizedLoss {
            l2wrap: self.l2wrap.clone(),
            pad_token: self.pad_token,
        }
    }
}

impl PenalizedLoss {
    /// # Parameters
    /// - `logits`: `[batch_size, seq_len, vocab_size]`
    /// - `targets`: `[batch_size, seq_len]`
    pub fn forward<B: L2WrapBackend>(
        &self,
        logits: Tensor<B, 3>,
        targets: Tensor<B, 2, Int>,
    ) -> ClassificationOutput<B> {
        let [batch_size, seq_length, vocab_size] = logits.dims();
        let device = logits.device();

        let output_flatten = logits.clone().reshape([batch_size * seq_length, vocab_size]);
        let targets_flatten = targets.reshape([batch_size * seq_length]);

        let token_amount = self.token_amount(targets_flatten.clone());

        let loss = CrossEntropyLossConfig::new()
            .with_pad_tokens(self.pad_token.map(|pad| vec![pad]))
            .init(&device)
            .forward(output_flatten.clone(), targets_flatten.clone());
        let loss = l2_wrap(loss, logits, token_amount, &self.l2wrap);

        ClassificationOutput {
            loss,
            output: output_flatten,
            targets: targets_flatten,
        }
    }

    /// Number of targets that are not padding.
    pub fn token_amount<B: Backend>(&self, targets: Tensor<B, 1, Int>) -> usize {
        match self.pad_token {
            Some(pad) => {
                let count: i64 = targets
                    .not_equal_elem(pad as i64)
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();
                count as usize
            }
            None => targets.dims()[0],
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::l2wrap::{
        test_utils::{assert_data_close, nonzero_count, random_logits, TestAutodiffBackend},
        BackwardStrategy,
    };

    fn targets(
        device: &<TestAutodiffBackend as Backend>::Device,
    ) -> Tensor<TestAutodiffBackend, 2, Int> {
        Tensor::from_data(TensorData::from([[1i64, 2, 0], [3, 0, 0]]), device)
    }

    #[test]
    fn pad_tokens_are_not_counted() {
        let device = Default::default();
        let loss = PenalizedLossConfig::new(L2WrapConfig::new())
            .with_pad_token(Some(0))
            .init();

        let flat = targets(&device).reshape([6]);
        assert_eq!(loss.token_amount(flat.clone()), 3);

        let unpadded = PenalizedLossConfig::new(L2WrapConfig::new()).init();
        assert_eq!(unpadded.token_amount(flat), 6);
    }

    #[test]
    fn wrapped_loss_equals_cross_entropy() {
        let device = Default::default();
        let logits =
            Tensor::<TestAutodiffBackend, 3>::from_inner(random_logits([2, 3, 4], &device));
        let penalized = PenalizedLossConfig::new(L2WrapConfig::new())
            .with_pad_token(Some(0))
            .init();

        let output = penalized.forward(logits.clone(), targets(&device));
        let plain = CrossEntropyLossConfig::new()
            .with_pad_tokens(Some(vec![0]))
            .init(&device)
            .forward(logits.reshape([6, 4]), targets(&device).reshape([6]));

        let wrapped = output.loss.into_data().to_vec::<f32>().unwrap();
        let plain = plain.into_data().to_vec::<f32>().unwrap();
        assert_data_close(&wrapped, &plain, 0.0, 0.0, "loss");
        assert_eq!(output.output.dims(), [6, 4]);
        assert_eq!(output.targets.dims(), [6]);
    }

    #[test]
    fn penalty_changes_logits_gradient_only_at_argmax() {
        let device = Default::default();
        let inner = random_logits([2, 3, 4], &device);
        let config = PenalizedLossConfig::new(
            L2WrapConfig::new().with_strategy(BackwardStrategy::Sparse),
        );

        let with_penalty = {
            let logits = Tensor::<TestAutodiffBackend, 3>::from_inner(inner.clone()).require_grad();
            let grads = config.init().forward(logits.clone(), targets(&device)).loss.backward();
            logits.grad(&grads).expect("logits gradient")
        };
        let without_penalty = {
            let logits = Tensor::<TestAutodiffBackend, 3>::from_inner(inner).require_grad();
            let grads = PenalizedLossConfig::new(L2WrapConfig::new().with_coefficient(0.0))
                .init()
                .forward(logits.clone(), targets(&device))
                .loss
                .backward();
            logits.grad(&grads).expect("logits gradient")
        };

        assert!(nonzero_count(with_penalty - without_penalty) <= 2 * 3);
    }
}
