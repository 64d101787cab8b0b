// ============================================================
// Layer 5 - Burn-backed StanceModel
// ============================================================
// Wraps StanceClassifier and its optimiser behind the domain
// StanceModel trait so the trainer never sees burn types.
//
//   train_step → forward on the autodiff backend (dropout on),
//                backward, gradient norm, Adam update with
//                per-parameter norm clipping
//   batch_loss / predict → model.valid(): inner backend, no
//                autodiff graph, dropout off
//   parameters / load_parameters → burn binary record, full precision
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{anyhow, Result};
use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    grad_clipping::GradientClippingConfig,
    tensor::backend::AutodiffBackend,
};

use crate::domain::batch::Batch;
use crate::domain::stance::Stance;
use crate::domain::traits::{StanceModel, StepOutcome};
use crate::ml::model::{cross_entropy, Reduction, StanceClassifier, StanceClassifierConfig};
use crate::ml::tensors::BatchTensors;

type ParamRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// Backend used outside of tests: WGPU with autodiff for training
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Optimiser hyperparameters
#[derive(Debug, Clone, Copy)]
pub struct OptimSettings {
    pub learning_rate:     f64,
    pub max_gradient_norm: f64,
}

pub struct BurnStanceModel<B: AutodiffBackend, O> {
    model:     StanceClassifier<B>,
    optim:     O,
    lr:        f64,
    reduction: Reduction,
    device:    B::Device,
}

/// Build a fresh classifier with an Adam optimiser.
pub fn build_stance_model<B: AutodiffBackend>(
    model_cfg: &StanceClassifierConfig,
    settings:  OptimSettings,
    reduction: Reduction,
    device:    B::Device,
) -> BurnStanceModel<B, impl Optimizer<StanceClassifier<B>, B>> {
    let model: StanceClassifier<B> = model_cfg.init(&device);

    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(settings.max_gradient_norm as f32)))
        .init::<B, StanceClassifier<B>>();

    BurnStanceModel {
        model,
        optim,
        lr: settings.learning_rate,
        reduction,
        device,
    }
}

/// Build the classifier on the default WGPU device. The backend RNG is
/// seeded first so weight initialisation is reproducible.
pub fn wgpu_stance_model(
    model_cfg: &StanceClassifierConfig,
    settings:  OptimSettings,
    reduction: Reduction,
    seed:      u64,
) -> BurnStanceModel<TrainBackend, impl Optimizer<StanceClassifier<TrainBackend>, TrainBackend>> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    TrainBackend::seed(seed);
    build_stance_model::<TrainBackend>(model_cfg, settings, reduction, device)
}

impl<B, O> StanceModel for BurnStanceModel<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<StanceClassifier<B>, B>,
{
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutcome> {
        let tensors = BatchTensors::<B>::from_batch(batch, &self.device);
        let logits  = self.model.forward(tensors.inputs, self.reduction);
        let loss    = cross_entropy(logits, tensors.labels);
        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();

        // Backward pass + Adam update
        let grads     = loss.backward();
        let grad_norm = gradient_norm(&self.model, &grads);
        let grads     = GradientsParams::from_grads(grads, &self.model);
        self.model    = self.optim.step(self.lr, self.model.clone(), grads);

        Ok(StepOutcome {
            loss: loss_value,
            grad_norm,
            param_norm: parameter_norm(&self.model),
        })
    }

    fn batch_loss(&self, batch: &Batch) -> Result<f64> {
        let model   = self.model.valid();
        let tensors = BatchTensors::<B::InnerBackend>::from_batch(batch, &self.device);
        let logits  = model.forward(tensors.inputs, self.reduction);
        Ok(cross_entropy(logits, tensors.labels).into_scalar().elem::<f64>())
    }

    fn predict(&self, batch: &Batch) -> Result<Vec<Stance>> {
        let model   = self.model.valid();
        let tensors = BatchTensors::<B::InnerBackend>::from_batch(batch, &self.device);
        let logits  = model.forward(tensors.inputs, self.reduction);

        // argmax(1) returns shape [batch, 1]; flatten to [batch]
        let classes = logits.argmax(1).flatten::<1>(0, 1).into_data();
        classes
            .iter::<i64>()
            .map(|i| {
                Stance::from_index(i as usize)
                    .ok_or_else(|| anyhow!("Model produced out-of-range class {i}"))
            })
            .collect()
    }

    fn parameters(&self) -> Result<Vec<u8>> {
        let recorder = ParamRecorder::default();
        <ParamRecorder as Recorder<B>>::record(&recorder, self.model.clone().into_record(), ())
            .map_err(|e| anyhow!("Cannot serialise parameters: {e:?}"))
    }

    fn load_parameters(&mut self, bytes: Vec<u8>) -> Result<()> {
        let recorder = ParamRecorder::default();
        let record = <ParamRecorder as Recorder<B>>::load(&recorder, bytes, &self.device)
            .map_err(|e| anyhow!("Cannot restore parameters: {e:?}"))?;
        self.model = self.model.clone().load_record(record);
        Ok(())
    }

    fn num_params(&self) -> usize {
        self.model.num_params()
    }
}

// ─── Norms ────────────────────────────────────────────────────────────────────

/// Global L2 norm of every float parameter
fn parameter_norm<B: Backend, M: Module<B>>(module: &M) -> f64 {
    let mut visitor = SumOfSquares::<B> { total: 0.0, _backend: core::marker::PhantomData };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Global L2 norm of the gradients of every float parameter
fn gradient_norm<B: AutodiffBackend, M: Module<B>>(module: &M, grads: &B::Gradients) -> f64 {
    let mut visitor = GradSumOfSquares::<B> { grads, total: 0.0 };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

struct SumOfSquares<B: Backend> {
    total:    f64,
    _backend: core::marker::PhantomData<B>,
}

impl<B: Backend> ModuleVisitor<B> for SumOfSquares<B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.total += (tensor.clone() * tensor.clone()).sum().into_scalar().elem::<f64>();
    }
}

struct GradSumOfSquares<'a, B: AutodiffBackend> {
    grads: &'a B::Gradients,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradSumOfSquares<'_, B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if let Some(grad) = tensor.grad(self.grads) {
            self.total += (grad.clone() * grad).sum().into_scalar().elem::<f64>();
        }
    }
}
