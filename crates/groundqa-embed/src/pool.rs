use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Mean of the token states selected by `attention_mask`, per batch row.
/// `hidden` is `[B,T,H]`, `attention_mask` is `[B,T]`; the result is `[B,H]`.
pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {:?}", dims);
    let hidden_dim = dims[2];

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
    };
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    // A fully masked row would divide by zero; clamp its length to one token.
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?.maximum(1f64)?;
    Ok(sum.broadcast_div(&lengths)?)
}

/// Row-wise L2 normalisation of a `[B,H]` tensor.
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let eps_val = match x.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], x.device())?.to_dtype(x.dtype())?.unsqueeze(0)?;
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    Ok(x.broadcast_div(&norm)?)
}

pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    l2_normalize(&masked_mean(hidden, attention_mask)?)
}
