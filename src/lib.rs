#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]

//! L2Wrap - logit penalty gradients for language-model training on burn.
//!
//! The core is [`l2wrap::l2_wrap`], a custom autodiff node that is an identity
//! on the loss but adds a small gradient on the arg-max logit of every token
//! position during the reverse pass. [`accelerator`] carries the device
//! adapter used by training loops that run on wgpu.

pub mod accelerator;
pub mod error;
pub mod l2wrap;
pub mod training;

pub use error::{Error, Result};
pub use l2wrap::{
    l2_wrap, BackwardStrategy, L2WrapBackend, L2WrapConfig, L2WrapGrads, PenaltyScaling,
    SavedContext,
};
pub use training::{PenalizedLoss, PenalizedLossConfig};
