// ============================================================
// Layer 5 - Batch → Tensors
// ============================================================
// Converts a domain Batch (nested Vecs) into burn tensors on a
// given device. The Batch is already padded to a fixed width,
// so every matrix is flattened row by row and reshaped:
//
//   [r1_t1, r1_t2, ..., r1_tW, r2_t1, ..., rN_tW] → [N, W]

use burn::prelude::*;

use crate::domain::batch::Batch;
use crate::ml::model::StanceInputs;

pub struct BatchTensors<B: Backend> {
    pub inputs: StanceInputs<B>,
    /// Gold stance indices, shape [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> BatchTensors<B> {
    pub fn from_batch(batch: &Batch, device: &B::Device) -> Self {
        let inputs = StanceInputs {
            body_ids:      int_matrix(&batch.body_ids, batch.context_len(), device),
            body_mask:     int_matrix(&batch.body_mask, batch.context_len(), device),
            headline_ids:  int_matrix(&batch.headline_ids, batch.question_len(), device),
            headline_mask: int_matrix(&batch.headline_mask, batch.question_len(), device),
        };

        let labels: Vec<i32> = batch.labels.iter().map(|s| s.index() as i32).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        Self { inputs, labels }
    }
}

fn int_matrix<B: Backend>(rows: &[Vec<u32>], width: usize, device: &B::Device) -> Tensor<B, 2, Int> {
    let flat: Vec<i32> = rows
        .iter()
        .flat_map(|row| row.iter().map(|&x| x as i32))
        .collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), width])
}
