use burn::{
    backend::autodiff::{
        checkpoint::{base::Checkpointer, strategy::CheckpointStrategy},
        grads::Gradients,
        ops::{Backward, Ops, OpsKind},
        Autodiff,
    },
    tensor::{
        backend::{AutodiffBackend, Backend},
        ops::FloatTensor,
        Tensor, TensorPrimitive,
    },
};

use super::{context::SavedContext, L2WrapConfig};

/// Backends that can record the L2Wrap node in their gradient graph.
pub trait L2WrapBackend: AutodiffBackend {
    /// Identity on `loss` that registers the penalty backward for `y`.
    fn l2_wrap(
        loss: FloatTensor<Self>,
        y: FloatTensor<Self>,
        token_amount: usize,
        config: &L2WrapConfig,
    ) -> FloatTensor<Self>;
}

/// Parents are `[loss, y]`.
#[derive(Debug)]
struct L2WrapBackward;

impl<B: Backend> Backward<B, 2> for L2WrapBackward {
    type State = SavedContext<B>;

    fn backward(
        self,
        ops: Ops<Self::State, 2>,
        grads: &mut Gradients,
        _checkpointer: &mut Checkpointer,
    ) {
        let [node_loss, node_y] = ops.parents;
        let grad_output = Tensor::<B, 1>::from_primitive(TensorPrimitive::Float(
            grads.consume::<B>(&ops.node),
        ));

        let grad_inputs = ops.state.backward(grad_output);

        if let Some(node) = node_loss {
            grads.register::<B>(node.id, grad_inputs.loss.into_primitive().tensor());
        }
        if let (Some(node), Some(grad_y)) = (node_y, grad_inputs.y) {
            grads.register::<B>(node.id, grad_y.into_primitive().tensor());
        }
    }
}

impl<B: Backend, C: CheckpointStrategy> L2WrapBackend for Autodiff<B, C> {
    fn l2_wrap(
        loss: FloatTensor<Self>,
        y: FloatTensor<Self>,
        token_amount: usize,
        config: &L2WrapConfig,
    ) -> FloatTensor<Self> {
        match L2WrapBackward
            .prepare::<C>([loss.node.clone(), y.node.clone()])
            .compute_bound()
            .stateful()
        {
            OpsKind::Tracked(prep) => {
                let y = Tensor::<B, 3>::from_primitive(TensorPrimitive::Float(y.primitive));
                let ctx = SavedContext::capture(y, token_amount, config);
                prep.finish(ctx, loss.primitive)
            }
            OpsKind::UnTracked(prep) => prep.finish(loss.primitive),
        }
    }
}
