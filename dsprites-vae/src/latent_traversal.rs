use crate::candle_vae::BetaVae;

use candle_core::{Device, Tensor};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Settings of a one-dimension-at-a-time latent sweep
#[derive(Clone, Debug)]
pub struct TraversalConfig {
    pub n_images: usize,
    pub lower: f32,
    pub upper: f32,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            n_images: 10,
            lower: -5.,
            upper: 5.,
        }
    }
}

/// `n` evenly spaced points from `lower` to `upper` (both included)
pub fn linspace(lower: f32, upper: f32, n: usize) -> Vec<f32> {
    match n {
        0 => vec![],
        1 => vec![lower],
        _ => {
            let delta = (upper - lower) / (n - 1) as f32;
            (0..n).map(|i| lower + delta * i as f32).collect()
        }
    }
}

/// Latent states `n x k` that share a random base vector drawn from
/// `U(lower, upper)^k` and differ only in column `dim`, which runs
/// through `linspace(lower, upper, n)`
pub fn latent_sweep<R: Rng>(
    z_dim: usize,
    dim: usize,
    config: &TraversalConfig,
    rng: &mut R,
    device: &Device,
) -> anyhow::Result<Tensor> {
    if dim >= z_dim {
        anyhow::bail!("latent dimension {} out of range 0..{}", dim, z_dim);
    }
    if config.upper <= config.lower {
        anyhow::bail!("empty sweep range [{}, {}]", config.lower, config.upper);
    }

    let unif = Uniform::new(config.lower, config.upper)?;
    let base: Vec<f32> = (0..z_dim).map(|_| unif.sample(rng)).collect();
    let sweep = linspace(config.lower, config.upper, config.n_images);

    let mut z = Vec::with_capacity(config.n_images * z_dim);
    for &v in sweep.iter() {
        let mut row = base.clone();
        row[dim] = v;
        z.extend(row);
    }

    Ok(Tensor::from_vec(z, (config.n_images, z_dim), device)?)
}

/// Decode a sweep along every latent dimension
///
/// # Returns one `n x 1 x h x w` tensor of `sigmoid(logits)` per dimension
pub fn traverse_latents<R: Rng>(
    vae: &BetaVae,
    config: &TraversalConfig,
    rng: &mut R,
    device: &Device,
) -> anyhow::Result<Vec<Tensor>> {
    let z_dim = vae.dim_latent();
    (0..z_dim)
        .map(|dim| {
            let z_nk = latent_sweep(z_dim, dim, config, rng, device)?;
            let logits = vae.decode(&z_nk)?;
            Ok(candle_nn::ops::sigmoid(&logits)?)
        })
        .collect()
}
