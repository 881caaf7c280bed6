use candle_core::{Result, Tensor};

/// Gaussian posterior statistics `q(z|x) = N(mean, exp(lnvar))`
pub struct GaussianLatent {
    pub mean: Tensor,
    pub lnvar: Tensor,
}

pub trait EncoderModuleT {
    /// An encoder that spits out a latent sample and its posterior
    ///
    /// # Arguments
    /// * `x_nchw` - input images (n x c x h x w)
    /// * `train` - whether to sample and update batchnorm or not
    ///
    /// # Returns `(z_nk, latent)`
    /// * `z_nk` - latent sample (n x k)
    /// * `latent` - posterior mean and log variance (n x k each)
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<(Tensor, GaussianLatent)>;

    fn dim_latent(&self) -> usize;
}

pub trait DecoderModuleT {
    /// A decoder that spits out reconstruction logits (n x c x h x w)
    fn forward_t(&self, z_nk: &Tensor, train: bool) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and log-likelihood
    /// * `z_nk` - latent states
    /// * `x_nchw` - observed data to validate with
    /// * `llik` - fn (observed, logits) -> log-likelihood (n)
    fn forward_with_llik<LlikFn>(
        &self,
        z_nk: &Tensor,
        x_nchw: &Tensor,
        llik: &LlikFn,
        train: bool,
    ) -> Result<(Tensor, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let logits = self.forward_t(z_nk, train)?;
        let llik = llik(x_nchw, &logits)?;
        Ok((logits, llik))
    }

    fn dim_latent(&self) -> usize;
}

pub struct AutoEncoderOutput {
    pub logits: Tensor,
    /// `None` for deterministic bottlenecks
    pub latent: Option<GaussianLatent>,
}

/// Anything the training loop can fit: images in, logits out
pub trait AutoEncoderT {
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<AutoEncoderOutput>;

    /// same as `forward_t`, plus the per-sample log-likelihood of `x_nchw`
    fn forward_with_llik<LlikFn>(
        &self,
        x_nchw: &Tensor,
        llik: &LlikFn,
        train: bool,
    ) -> Result<(AutoEncoderOutput, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let out = self.forward_t(x_nchw, train)?;
        let llik = llik(x_nchw, &out.logits)?;
        Ok((out, llik))
    }
}
