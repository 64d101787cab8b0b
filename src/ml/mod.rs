// ============================================================
// Layer 5 - ML / Training Layer
// ============================================================
// Everything that touches burn lives in model.rs, tensors.rs and
// learner.rs. evaluator.rs and trainer.rs only see the domain
// StanceModel trait, so they run unchanged against test doubles.
//
//   model.rs     - StanceClassifier: shared embedding + encoder,
//                  body-to-headline attention, masked pooling,
//                  4-way stance head
//   tensors.rs   - Batch (nested Vecs) → burn tensors
//   learner.rs   - BurnStanceModel: Adam step, norms, parameter bytes
//   evaluator.rs - dataset loss and dataset score
//   trainer.rs   - the scheduled training loop
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Headline/body stance classifier architecture
pub mod model;

/// Batch → tensor conversion
pub mod tensors;

/// burn-backed StanceModel implementation
pub mod learner;

/// Whole-dataset loss and score
pub mod evaluator;

/// Training loop with periodic logging, checkpointing and evaluation
pub mod trainer;
