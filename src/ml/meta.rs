// ============================================================
// Layer 5 — Inner Update
// ============================================================
// Produces the "fast weights" θ' = θ − α·clip(∇θ L_task) used to
// evaluate the meta-test losses.
//
// The gradient g is taken from a separate backward pass and is
// detached (first-order approximation), but θ' is built FROM the
// tracked θ tensors, so anything computed with θ' still sends
// its gradient back to θ:
//
//   ∂L(θ')/∂θ = ∂L(θ')/∂θ' · ∂θ'/∂θ = ∂L(θ')/∂θ'   (g treated as const)
//
// The mapper walks every float parameter of a Burn module and
// rewrites it in place; parameters without a gradient (e.g.
// ones not used by the task loss) pass through untouched.
//
// Reference: Burn Book §3 (ModuleMapper)
//            Finn et al. (2017) MAML, Nichol et al. (2018) FOMAML

use burn::{
    module::{AutodiffModule, ModuleMapper, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

struct InnerStep<'a, B: AutodiffBackend> {
    grads:   &'a GradientsParams,
    lr:      f64,
    clip:    f64,
    updated: usize,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleMapper<B> for InnerStep<'_, B> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) else {
            return tensor;
        };
        self.updated += 1;

        let step = grad.clamp(-self.clip, self.clip).mul_scalar(self.lr);
        tensor - Tensor::from_inner(step)
    }
}

/// Apply one clipped SGD step to `module` without detaching it.
pub fn inner_update<B, M>(module: M, grads: &GradientsParams, lr: f64, clip: f64) -> M
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut step = InnerStep::<B> {
        grads,
        lr,
        clip,
        updated: 0,
        _backend: PhantomData,
    };
    let module = module.map(&mut step);
    tracing::trace!("Inner update touched {} parameter tensors", step.updated);
    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
    };

    type TB = Autodiff<NdArray<f32>>;
    type Inner = NdArray<f32>;

    fn setup() -> (Linear<TB>, Tensor<TB, 2>) {
        let device = Default::default();
        let layer: Linear<TB> = LinearConfig::new(2, 1).init(&device);
        let input = Tensor::<TB, 1>::from_floats([1.0, 3.0].as_slice(), &device).reshape([1, 2]);
        (layer, input)
    }

    #[test]
    fn test_moves_against_gradient() {
        let (layer, input) = setup();

        // d(sum(w·x + b))/dw = x = [1, 3]
        let loss  = layer.forward(input).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &layer);

        let before = layer.weight.val().inner().into_data().to_vec::<f32>().unwrap();
        let adapted = inner_update::<TB, _>(layer.clone(), &grads, 0.1, 100.0);
        let after   = adapted.weight.val().inner().into_data().to_vec::<f32>().unwrap();

        assert!((before[0] - after[0] - 0.1).abs() < 1e-5);
        assert!((before[1] - after[1] - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_gradient_is_clipped() {
        let (layer, input) = setup();
        let loss  = layer.forward(input).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &layer);

        let before  = layer.weight.val().inner().into_data().to_vec::<f32>().unwrap();
        let adapted = inner_update::<TB, _>(layer.clone(), &grads, 1.0, 2.0);
        let after   = adapted.weight.val().inner().into_data().to_vec::<f32>().unwrap();

        // grad 3.0 clipped to 2.0
        assert!((before[1] - after[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_fast_weights_stay_connected_to_originals() {
        let (layer, input) = setup();
        let loss  = layer.forward(input.clone()).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &layer);

        let adapted   = inner_update::<TB, _>(layer.clone(), &grads, 0.1, 100.0);
        let meta_loss = adapted.forward(input).sum();
        let meta      = GradientsParams::from_grads(meta_loss.backward(), &layer);

        let g = meta
            .get::<Inner, 2>(layer.weight.id)
            .expect("original weights receive gradient through the fast weights");
        assert_eq!(g.into_data().to_vec::<f32>().unwrap(), vec![1.0, 3.0]);
    }
}
