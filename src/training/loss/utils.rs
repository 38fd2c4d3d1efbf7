//! Primitive metrics the SRFR losses are built from
//!
//! Every function here stays inside candle's autograd: no branching on tensor
//! values, so gradients flow through all of them.

use candle_core::{DType, Device, Tensor, D};

use crate::error::{Error, Result};

/// Softmax over the last dimension
pub fn softmax(xs: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::softmax(xs, D::Minus1)?)
}

/// Element-wise logistic function
pub fn sigmoid(xs: &Tensor) -> Result<Tensor> {
    Ok(xs.neg()?.exp()?.affine(1.0, 1.0)?.recip()?)
}

/// Mean binary cross-entropy of probabilities against targets
///
/// Probabilities are clipped to `[eps, 1 - eps]` before the logarithm.
pub fn binary_crossentropy(targets: &Tensor, probs: &Tensor, eps: f64) -> Result<Tensor> {
    let probs = probs.clamp(eps, 1.0 - eps)?;
    let positive = targets.mul(&probs.log()?)?;
    let negative = targets
        .affine(-1.0, 1.0)?
        .mul(&probs.affine(-1.0, 1.0)?.log()?)?;
    Ok(positive.add(&negative)?.neg()?.mean_all()?)
}

/// Per-sample categorical cross-entropy of a probability matrix `(batch, classes)`
pub fn categorical_crossentropy(probs: &Tensor, one_hot: &Tensor, eps: f64) -> Result<Tensor> {
    let log_probs = probs.clamp(eps, 1.0 - eps)?.log()?;
    Ok(one_hot.mul(&log_probs)?.sum(1)?.neg()?)
}

/// Mean over the batch of the per-sample L2 distance between `a` and `b`
///
/// Distances below `eps` count as exactly zero, with a zero gradient.
pub fn euclidean_distance(a: &Tensor, b: &Tensor, eps: f64) -> Result<Tensor> {
    ensure_same_shape(a, b, "euclidean_distance")?;
    let diff = a.sub(b)?;
    let diff = if diff.rank() > 1 {
        diff.flatten_from(1)?
    } else {
        diff.unsqueeze(0)?
    };
    let squared = diff.sqr()?.sum(1)?;
    let threshold = squared.ones_like()?.affine(eps * eps, 0.0)?;
    let nonzero = squared.gt(&threshold)?;
    // sqrt only sees positive inputs so its gradient stays finite
    let safe = nonzero.where_cond(&squared, &squared.ones_like()?)?;
    let distance = nonzero.where_cond(&safe.sqrt()?, &squared.zeros_like()?)?;
    Ok(distance.mean_all()?)
}

/// Mean absolute difference
pub fn l1_distance(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    ensure_same_shape(a, b, "l1_distance")?;
    Ok(a.sub(b)?.abs()?.mean_all()?)
}

/// Sum per-sample losses and divide by the global batch size
///
/// Falls back to the local batch when no global size is given, which makes
/// this a plain mean on a single replica.
pub fn sum_over_batch_size(per_sample: &Tensor, global_batch_size: Option<usize>) -> Result<Tensor> {
    let batch = match global_batch_size {
        Some(size) => size,
        None => per_sample.elem_count(),
    };
    if batch == 0 {
        return Err(Error::invalid_input("cannot reduce an empty batch"));
    }
    Ok(per_sample.sum_all()?.affine(1.0 / batch as f64, 0.0)?)
}

/// One-hot matrix `(batch, num_classes)` for integer class labels
pub fn one_hot(labels: &Tensor, num_classes: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    let ids = labels.flatten_all()?.to_dtype(DType::U32)?.to_vec1::<u32>()?;
    let mut data = vec![0f32; ids.len() * num_classes];
    for (row, &class) in ids.iter().enumerate() {
        let class = class as usize;
        if class >= num_classes {
            return Err(Error::invalid_input(format!(
                "class id {} out of range for {} classes",
                class, num_classes
            )));
        }
        data[row * num_classes + class] = 1.0;
    }
    Ok(Tensor::from_vec(data, (ids.len(), num_classes), device)?.to_dtype(dtype)?)
}

/// Divide each row by its L2 norm; zero rows stay zero
pub fn l2_normalize_rows(xs: &Tensor, eps: f64) -> Result<Tensor> {
    let norms = xs.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.maximum(eps)?;
    Ok(xs.broadcast_div(&norms)?)
}

/// Read a single-element tensor back as `f64`
pub fn to_f64(tensor: &Tensor) -> Result<f64> {
    Ok(tensor
        .flatten_all()?
        .to_dtype(DType::F64)?
        .to_vec1::<f64>()?
        .first()
        .copied()
        .ok_or_else(|| Error::invalid_input("expected a scalar tensor, got an empty one"))?)
}

/// Fail when two tensors that are compared element-wise differ in shape
pub fn ensure_same_shape(a: &Tensor, b: &Tensor, what: &str) -> Result<()> {
    if a.dims() != b.dims() {
        return Err(Error::invalid_input(format!(
            "{}: shape mismatch {:?} vs {:?}",
            what,
            a.dims(),
            b.dims()
        )));
    }
    Ok(())
}
