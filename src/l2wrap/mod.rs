use std::fmt;

use burn::{
    config::Config,
    tensor::{Tensor, TensorPrimitive},
};
use serde::{Deserialize, Serialize};

pub mod argmax;
pub mod backend;
pub mod context;
pub mod dense;
pub mod harness;
pub mod sparse;
pub mod strategy;

#[cfg(test)]
pub mod test_utils;

pub use argmax::ArgMax;
pub use backend::L2WrapBackend;
pub use context::{L2WrapGrads, SavedContext, SavedLogits};
pub use dense::DenseScatter;
pub use harness::{EquivalenceCase, EquivalenceReport};
pub use sparse::{CooTensor, SparseCoo};
pub use strategy::{PenaltyParams, PenaltyStrategy};

/// Environment variable that switches the penalty to [`PenaltyScaling::UpstreamScaled`].
pub const SCALE_BY_GRAD_ENV: &str = "L2WRAP_SCALE_BY_GRAD";

/// Older name of [`SCALE_BY_GRAD_ENV`], still honored by existing training scripts.
pub const LEGACY_SCALE_BY_GRAD_ENV: &str = "WN_FIX_L2WRAP";

/// Which backward implementation produces the logits gradient.
#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BackwardStrategy {
    /// Scatter into a zero tensor shaped like the logits.
    #[default]
    Dense,
    /// Build a coordinate-list tensor from the arg-max rows, then densify.
    Sparse,
}

impl BackwardStrategy {
    pub const ALL: [Self; 2] = [Self::Dense, Self::Sparse];
}

impl fmt::Display for BackwardStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => write!(f, "dense"),
            Self::Sparse => write!(f, "sparse"),
        }
    }
}

/// Whether the penalty is multiplied by the gradient flowing into the loss.
#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PenaltyScaling {
    /// `max * factor`, independent of the upstream gradient.
    #[default]
    Unscaled,
    /// `max * factor * grad_output`.
    UpstreamScaled,
}

impl PenaltyScaling {
    /// Reads [`SCALE_BY_GRAD_ENV`] and [`LEGACY_SCALE_BY_GRAD_ENV`]. A non-empty
    /// value in either selects `UpstreamScaled`.
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = [SCALE_BY_GRAD_ENV, LEGACY_SCALE_BY_GRAD_ENV]
            .iter()
            .any(|name| std::env::var(name).is_ok_and(|value| !value.is_empty()));

        if enabled {
            Self::UpstreamScaled
        } else {
            Self::Unscaled
        }
    }
}

impl fmt::Display for PenaltyScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unscaled => write!(f, "unscaled"),
            Self::UpstreamScaled => write!(f, "upstream-scaled"),
        }
    }
}

/// Configuration for the L2Wrap operator.
#[derive(Config, Debug, PartialEq)]
pub struct L2WrapConfig {
    /// Backward implementation.
    #[config(default = "BackwardStrategy::Dense")]
    pub strategy: BackwardStrategy,
    #[config(default = "PenaltyScaling::Unscaled")]
    pub scaling: PenaltyScaling,
    /// Numerator of the normalization factor `coefficient / token_amount`.
    #[config(default = 1e-4)]
    pub coefficient: f64,
    /// Rows whose maximum logit is below this value get no penalty.
    pub min_max_logit: Option<f64>,
}

impl L2WrapConfig {
    /// Applies the environment toggle on top of this config.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        match PenaltyScaling::from_env() {
            PenaltyScaling::UpstreamScaled => self.with_scaling(PenaltyScaling::UpstreamScaled),
            PenaltyScaling::Unscaled => self,
        }
    }
}

/// Wraps `loss` so that the reverse pass also pushes down the arg-max logit of `y`.
///
/// The returned tensor is `loss`, value for value. During backward the loss
/// receives the upstream gradient unchanged, `y` receives the penalty gradient
/// computed by `config.strategy`, and `token_amount` receives nothing. With
/// `token_amount == 0` the logits get no gradient from this node at all.
///
/// # Parameters
/// - `loss`: Scalar loss of shape `[1]`.
/// - `y`: Logits of shape `[batch_size, seq_len, vocab_size]`.
/// - `token_amount`: Number of tokens that contributed to `loss`.
pub fn l2_wrap<B: L2WrapBackend>(
    loss: Tensor<B, 1>,
    y: Tensor<B, 3>,
    token_amount: usize,
    config: &L2WrapConfig,
) -> Tensor<B, 1> {
    let output = B::l2_wrap(
        loss.into_primitive().tensor(),
        y.into_primitive().tensor(),
        token_amount,
        config,
    );
    Tensor::from_primitive(TensorPrimitive::Float(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_factor() {
        let config = L2WrapConfig::new();
        assert_eq!(config.strategy, BackwardStrategy::Dense);
        assert_eq!(config.scaling, PenaltyScaling::Unscaled);
        assert!((config.coefficient - 1e-4).abs() < f64::EPSILON);
        assert_eq!(config.min_max_logit, None);
    }

    #[test]
    fn env_toggle_selects_upstream_scaling() {
        std::env::set_var(SCALE_BY_GRAD_ENV, "1");
        let scaled = L2WrapConfig::new().with_env_overrides();
        std::env::set_var(SCALE_BY_GRAD_ENV, "");
        let empty = L2WrapConfig::new().with_env_overrides();
        std::env::remove_var(SCALE_BY_GRAD_ENV);
        let unset = L2WrapConfig::new().with_env_overrides();

        std::env::set_var(LEGACY_SCALE_BY_GRAD_ENV, "1");
        let legacy = L2WrapConfig::new().with_env_overrides();
        std::env::remove_var(LEGACY_SCALE_BY_GRAD_ENV);

        assert_eq!(scaled.scaling, PenaltyScaling::UpstreamScaled);
        assert_eq!(empty.scaling, PenaltyScaling::Unscaled);
        assert_eq!(unset.scaling, PenaltyScaling::Unscaled);
        assert_eq!(legacy.scaling, PenaltyScaling::UpstreamScaled);
    }
}
