use candle_core::{Result, Tensor};

/// KL divergence loss between `N(mu, sigma^2)` and `N(0, 1)`
///
/// 0.5 * sum_k (mu^2 + sigma^2 - log(sigma^2) - 1)
///
/// * `z_mean` - mean of Gaussian distribution (n x k)
/// * `z_lnvar` - log variance of Gaussian distribution (n x k)
///
/// # Returns `kl_n` (n)
pub fn gaussian_kl_loss(z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
    let z_var = z_lnvar.exp()?;
    (z_var - 1. + z_mean.powf(2.)? - z_lnvar)?.sum(z_mean.rank() - 1)? * 0.5
}

/// sum over every axis but the first (the batch axis)
fn sum_per_sample(x: &Tensor) -> Result<Tensor> {
    match x.rank() {
        0 | 1 => Ok(x.clone()),
        _ => x.flatten_from(1)?.sum(1),
    }
}

/// Bernoulli log-likelihood with logits
///
/// llik(i) = - sum_j [ max(l,0) - l * x + log(1 + exp(-|l|)) ]
///
/// * `x` - observed data in [0, 1]
/// * `logits` - reconstruction logits (same shape as `x`)
///
pub fn bernoulli_logit_likelihood(x: &Tensor, logits: &Tensor) -> Result<Tensor> {
    let log1p_exp = (logits.abs()?.neg()?.exp()? + 1.)?.log()?;
    let bce = ((logits.relu()? - logits.mul(x)?)? + log1p_exp)?;
    sum_per_sample(&bce)?.neg()
}

/// Squared-error log-likelihood on sigmoid means
///
/// llik(i) = - sum_j [ sigmoid(l) - x ]^2
///
/// * `x` - observed data in [0, 1]
/// * `logits` - reconstruction logits (same shape as `x`)
///
pub fn normal_sigmoid_likelihood(x: &Tensor, logits: &Tensor) -> Result<Tensor> {
    let mean = candle_nn::ops::sigmoid(logits)?;
    sum_per_sample(&mean.sub(x)?.powf(2.)?)?.neg()
}
