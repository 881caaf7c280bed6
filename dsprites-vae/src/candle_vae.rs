use crate::candle_model_decoder::ConvDecoder;
use crate::candle_model_encoder::ConvGaussianEncoder;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

/// Variables a pretrained checkpoint may seed
pub const PRETRAINED_PREFIXES: [&str; 2] = ["encoder", "decoder"];

/// x -> encoder -> (mu, log_var) -> z -> decoder -> logits
pub struct BetaVae {
    pub encoder: ConvGaussianEncoder,
    pub decoder: ConvDecoder,
}

impl BetaVae {
    /// * `encoder.*` - see `ConvGaussianEncoder::new`
    /// * `decoder.*` - see `ConvDecoder::new`
    pub fn new(n_latent: usize, vs: VarBuilder) -> Result<Self> {
        let encoder = ConvGaussianEncoder::new(n_latent, vs.pp("encoder"))?;
        let decoder = ConvDecoder::new(n_latent, vs.pp("decoder"))?;
        Self::from_parts(encoder, decoder)
    }

    /// Pair an encoder and a decoder of the same latent dimension
    pub fn from_parts(encoder: ConvGaussianEncoder, decoder: ConvDecoder) -> Result<Self> {
        if encoder.dim_latent() != decoder.dim_latent() {
            return Err(candle_core::Error::Msg(format!(
                "encoder latent {} != decoder latent {}",
                encoder.dim_latent(),
                decoder.dim_latent()
            )));
        }
        Ok(Self { encoder, decoder })
    }

    pub fn dim_latent(&self) -> usize {
        self.encoder.dim_latent()
    }

    /// `(logits, mu, log_var)` of the input images
    pub fn forward_stats(&self, x_nchw: &Tensor, train: bool) -> Result<(Tensor, Tensor, Tensor)> {
        let (z_nk, latent) = self.encoder.forward_t(x_nchw, train)?;
        let logits = self.decoder.forward_t(&z_nk, train)?;
        Ok((logits, latent.mean, latent.lnvar))
    }

    /// Decode latent states with frozen batchnorm statistics
    pub fn decode(&self, z_nk: &Tensor) -> Result<Tensor> {
        self.decoder.forward_t(z_nk, false)
    }
}

impl AutoEncoderT for BetaVae {
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<AutoEncoderOutput> {
        let (logits, mean, lnvar) = self.forward_stats(x_nchw, train)?;
        Ok(AutoEncoderOutput {
            logits,
            latent: Some(GaussianLatent { mean, lnvar }),
        })
    }

    fn forward_with_llik<LlikFn>(
        &self,
        x_nchw: &Tensor,
        llik: &LlikFn,
        train: bool,
    ) -> Result<(AutoEncoderOutput, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let (z_nk, latent) = self.encoder.forward_t(x_nchw, train)?;
        let (logits, llik) = self.decoder.forward_with_llik(&z_nk, x_nchw, llik, train)?;
        Ok((
            AutoEncoderOutput {
                logits,
                latent: Some(latent),
            },
            llik,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_model_encoder::IMAGE_SIDE;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn vae_shapes() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let vae = BetaVae::new(10, vb)?;

        let x = Tensor::rand(0f32, 1f32, (2, 1, IMAGE_SIDE, IMAGE_SIDE), &dev)?;
        let (logits, mu, lnvar) = vae.forward_stats(&x, true)?;
        assert_eq!(logits.dims(), x.dims());
        assert_eq!(mu.dims(), &[2, 10]);
        assert_eq!(lnvar.dims(), &[2, 10]);
        assert!(lnvar.min_all()?.to_scalar::<f32>()? >= 0.);

        let z = Tensor::zeros((3, 10), DType::F32, &dev)?;
        assert_eq!(vae.decode(&z)?.dims(), &[3, 1, IMAGE_SIDE, IMAGE_SIDE]);
        Ok(())
    }

    #[test]
    fn mismatched_latent_dimensions_are_an_error() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = ConvGaussianEncoder::new(10, vb.pp("encoder"))?;
        let decoder = ConvDecoder::new(6, vb.pp("decoder"))?;
        let err = BetaVae::from_parts(encoder, decoder).err();
        assert!(err.is_some_and(|e| e.to_string().contains("10 != decoder latent 6")));
        Ok(())
    }

    #[test]
    fn variables_live_under_encoder_and_decoder() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _vae = BetaVae::new(10, vb)?;

        let data = varmap.data().lock().map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        assert!(data.contains_key("encoder.mean.weight"));
        assert!(data.contains_key("encoder.conv.0.conv.weight"));
        assert!(data.contains_key("decoder.ffwd.0.bn.running_mean"));
        assert!(data.contains_key("decoder.deconv.3.deconv.weight"));
        assert!(data
            .keys()
            .all(|k| PRETRAINED_PREFIXES.iter().any(|p| k.starts_with(p))));
        Ok(())
    }
}
