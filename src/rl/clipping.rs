//! Global gradient-norm clipping across several modules
//!
//! burn's `GradientClippingConfig::Norm` clips each parameter tensor on its
//! own inside the optimizer. The policy and value network are stepped by two
//! optimizers, so the joint norm is measured here over both gradient sets and
//! every gradient is rescaled by the same factor before `step`.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, Module, ModuleVisitor, ParamId},
    optim::GradientsParams,
    tensor::{ElementConversion, Tensor, backend::AutodiffBackend},
};

const NORM_EPS: f64 = 1e-6;

struct SquaredNorm<'a, B> {
    grads: &'a GradientsParams,
    total: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Scale<'a, B> {
    grads: &'a mut GradientsParams,
    factor: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Scale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, grad.mul_scalar(self.factor));
        }
    }
}

/// Sum of squared gradient entries over every parameter of `module`
pub fn squared_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> {
        grads,
        total: 0.0,
        backend: PhantomData,
    };
    module.visit(&mut visitor);
    visitor.total
}

/// Multiply every gradient of `module` by `factor`
pub fn scale_grads<B, M>(module: &M, grads: &mut GradientsParams, factor: f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = Scale::<B> {
        grads,
        factor,
        backend: PhantomData,
    };
    module.visit(&mut visitor);
}

/// Factor that brings `total_norm` down to `max_norm`, never above 1
pub fn clip_factor(total_norm: f64, max_norm: f64) -> f64 {
    (max_norm / (total_norm + NORM_EPS)).min(1.0)
}
