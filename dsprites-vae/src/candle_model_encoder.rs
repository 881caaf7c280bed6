use crate::candle_aux_layers::*;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{Conv2d, Linear, Module, ModuleT, VarBuilder};

/// input images are `1 x 64 x 64`
pub const IMAGE_CHANNELS: usize = 1;
pub const IMAGE_SIDE: usize = 64;

/// channels of the four downsampling blocks: 64 -> 32 -> 16 -> 8 -> 4
pub const ENCODER_CHANNELS: [usize; 4] = [32, 32, 64, 64];

/// `n x 64 x 4 x 4` flattened
pub const FEATURE_CHANNELS: usize = 64;
pub const FEATURE_SIDE: usize = 4;
pub const FEATURE_DIM: usize = FEATURE_CHANNELS * FEATURE_SIDE * FEATURE_SIDE;

pub const DEFAULT_LATENT_DIM: usize = 10;

/// `n x 1 x 64 x 64` -> `n x 64 x 4 x 4`
///
/// * `{vb}.{j}.conv.*`, `{vb}.{j}.bn.*` for each block `j`
pub fn conv_encoder_stack(vb: VarBuilder) -> Result<StackLayers<NormLayer<Conv2d>>> {
    let mut conv = StackLayers::new();
    let mut prev_dim = IMAGE_CHANNELS;
    for (j, &next_dim) in ENCODER_CHANNELS.iter().enumerate() {
        conv.push_with_act(encoder_block(prev_dim, next_dim, vb.pp(j.to_string()))?, elu());
        prev_dim = next_dim;
    }
    debug_assert_eq!(prev_dim, FEATURE_CHANNELS);
    Ok(conv)
}

/// `n x c x h x w` -> `n x (c * h * w)`
pub fn flatten_features(h_nchw: &Tensor) -> Result<Tensor> {
    let n = h_nchw.dim(0)?;
    h_nchw.reshape((n, FEATURE_DIM))
}

pub struct ConvGaussianEncoder {
    n_latent: usize,
    conv: StackLayers<NormLayer<Conv2d>>,
    z_mean: Linear,
    z_lnvar: Linear,
}

impl EncoderModuleT for ConvGaussianEncoder {
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<(Tensor, GaussianLatent)> {
        let latent = self.latent_gaussian_params(x_nchw, train)?;
        let z_nk = self.reparameterize(&latent.mean, &latent.lnvar, train)?;
        Ok((z_nk, latent))
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl ConvGaussianEncoder {
    ///
    /// Evaluate latent Gaussian parameters: mu and log_var
    /// z ~ (mu(x), log_var(x)), where log_var passes through softplus
    pub fn latent_gaussian_params(&self, x_nchw: &Tensor, train: bool) -> Result<GaussianLatent> {
        let h_nchw = self.conv.forward_t(x_nchw, train)?;
        let h_nd = flatten_features(&h_nchw)?;
        let mean = self.z_mean.forward(&h_nd)?;
        let lnvar = softplus(&self.z_lnvar.forward(&h_nd)?)?;
        Ok(GaussianLatent { mean, lnvar })
    }

    ///
    /// z = mu + sigma * eps
    /// where eps ~ N(0, 1)
    ///
    /// # Arguments
    /// * `z_mean` - mean of Gaussian distribution
    /// * `z_lnvar` - log variance of Gaussian distribution
    pub fn reparameterize(&self, z_mean: &Tensor, z_lnvar: &Tensor, train: bool) -> Result<Tensor> {
        if train {
            let eps = Tensor::randn_like(z_mean, 0., 1.)?;
            z_mean + (z_lnvar * 0.5)?.exp()? * eps
        } else {
            Ok(z_mean.clone())
        }
    }

    /// Will create a new convolutional encoder module
    /// with these variables:
    ///
    /// * `{vs}.conv.{j}.*` where {j} is the block index
    /// * `{vs}.mean.weight`, `{vs}.mean.bias`
    /// * `{vs}.lnvar.weight`, `{vs}.lnvar.bias`
    pub fn new(n_latent: usize, vs: VarBuilder) -> Result<Self> {
        let conv = conv_encoder_stack(vs.pp("conv"))?;
        let z_mean = candle_nn::linear(FEATURE_DIM, n_latent, vs.pp("mean"))?;
        let z_lnvar = candle_nn::linear(FEATURE_DIM, n_latent, vs.pp("lnvar"))?;

        Ok(Self {
            n_latent,
            conv,
            z_mean,
            z_lnvar,
        })
    }
}
