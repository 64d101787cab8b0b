use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{gelu, relu},
};
use serde::{Deserialize, Serialize};

use crate::domain::stance::Stance;

/// How per-position body representations are pooled into one vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    #[default]
    Mean,
    Max,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally. Do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct StanceClassifierConfig {
    pub vocab_size:     usize,
    /// Longest sequence the position embedding covers
    pub max_len:        usize,
    pub embedding_size: usize,
    pub hidden_size:    usize,
    pub num_heads:      usize,
    pub num_layers:     usize,
    pub d_ff:           usize,
    #[config(default = 0.15)]
    pub dropout:        f64,
}

impl StanceClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> StanceClassifier<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.embedding_size).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_len, self.embedding_size).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.embedding_size).init(device);
        let cross_attn = MultiHeadAttentionConfig::new(self.embedding_size, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let blend      = LinearConfig::new(self.embedding_size * 2, self.hidden_size).init(device);
        let classifier = LinearConfig::new(self.hidden_size, Stance::COUNT).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        StanceClassifier {
            token_embedding, position_embedding, layers, final_norm,
            cross_attn, blend, classifier, dropout,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.embedding_size, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.embedding_size, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.embedding_size).init(device);
        let norm1   = LayerNormConfig::new(self.embedding_size).init(device);
        let norm2   = LayerNormConfig::new(self.embedding_size).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad`: [batch, seq_len], true at padding positions
    pub fn forward(&self, x: Tensor<B, 3>, pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self.self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Headline/body stance classifier.
///
/// The token embedding and the encoder stack are shared between the
/// headline and the body. Every body position then attends over the
/// headline; the attended vector is concatenated to the body state,
/// projected, pooled over the real body positions and classified.
#[derive(Module, Debug)]
pub struct StanceClassifier<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub cross_attn:         MultiHeadAttention<B>,
    pub blend:              Linear<B>,
    pub classifier:         Linear<B>,
    pub dropout:            Dropout,
}

/// Model inputs, all [batch, len] with mask 1 = token, 0 = padding
pub struct StanceInputs<B: Backend> {
    pub body_ids:      Tensor<B, 2, Int>,
    pub body_mask:     Tensor<B, 2, Int>,
    pub headline_ids:  Tensor<B, 2, Int>,
    pub headline_mask: Tensor<B, 2, Int>,
}

impl<B: Backend> StanceClassifier<B> {
    /// → class logits [batch, 4]
    pub fn forward(&self, inputs: StanceInputs<B>, reduction: Reduction) -> Tensor<B, 2> {
        let body_pad     = inputs.body_mask.clone().equal_elem(0);
        let headline_pad = inputs.headline_mask.equal_elem(0);

        let body     = self.encode(inputs.body_ids, body_pad);         // [b, n, e]
        let headline = self.encode(inputs.headline_ids, headline_pad.clone()); // [b, m, e]

        let attended = self.cross_attn
            .forward(MhaInput::new(body.clone(), headline.clone(), headline).mask_pad(headline_pad))
            .context;                                                   // [b, n, e]

        let blended = Tensor::cat(vec![body, attended], 2);             // [b, n, 2e]
        let blended = relu(self.blend.forward(self.dropout.forward(blended))); // [b, n, h]

        let pooled = pool(blended, inputs.body_mask.float(), reduction); // [b, h]
        self.classifier.forward(pooled)
    }

    fn encode(&self, ids: Tensor<B, 2, Int>, pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let tok_emb = self.token_embedding.forward(ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, pad.clone());
        }
        self.final_norm.forward(x)
    }
}

/// Pool [b, n, h] over the positions where `mask` ([b, n]) is 1.
fn pool<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>, reduction: Reduction) -> Tensor<B, 2> {
    let mask = mask.unsqueeze_dim::<3>(2); // [b, n, 1]
    match reduction {
        Reduction::Mean => {
            let summed = (x * mask.clone()).sum_dim(1);   // [b, 1, h]
            let count  = mask.sum_dim(1).clamp_min(1.0);  // [b, 1, 1]
            (summed / count).squeeze::<2>(1)
        }
        Reduction::Max => {
            // padding positions pushed far below any real activation
            let penalty = (mask - 1.0) * 1.0e9;
            (x + penalty).max_dim(1).squeeze::<2>(1)
        }
    }
}

/// Mean cross entropy over the batch
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}
