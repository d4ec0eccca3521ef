use anyhow::{anyhow, Result};
use candle_core::{DType, Tensor};

/// Sentence pooling for a `[batch, tokens, hidden]` encoder output: average the
/// token states selected by `attention_mask`, then scale each row to unit
/// length. Rows with no attended tokens come out as zero vectors.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _tokens, hidden_dim) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        other => return Err(anyhow!("hidden shape must be [B,T,H], got {other:?}")),
    };

    let weights = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&weights.unsqueeze(2)?)?.sum(1)?;
    let counts = weights.sum_keepdim(1)?.clamp(1f32, f32::MAX)?;
    let mean = summed.broadcast_div(&counts)?;

    let eps = match hidden.dtype() {
        DType::F16 | DType::BF16 => 1e-6f64,
        _ => 1e-12f64,
    };
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    let pooled = mean.broadcast_div(&norm)?;
    if pooled.dims() != [batch, hidden_dim] {
        return Err(anyhow!("pooled shape {:?} != [{batch}, {hidden_dim}]", pooled.dims()));
    }
    Ok(pooled)
}
