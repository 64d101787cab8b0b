// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Wires the other layers together for one goal: training a
// stance model, or evaluating a saved checkpoint.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination

// The training workflow
pub mod train_use_case;

// Checkpoint evaluation on a data split
pub mod eval_use_case;
