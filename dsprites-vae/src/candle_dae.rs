use crate::candle_aux_layers::*;
use crate::candle_model_decoder::{conv_decoder_stack, unflatten_features};
use crate::candle_model_encoder::{conv_encoder_stack, flatten_features, FEATURE_DIM};
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{Conv2d, ConvTranspose2d, Linear, ModuleT, VarBuilder};

pub const DEFAULT_BOTTLENECK_DIM: usize = 100;

/// Deterministic autoencoder for comparison with `BetaVae`
///
/// x -> conv -> 1024 -> 100 -> 1024 -> deconv -> logits
pub struct Dae {
    n_bottleneck: usize,
    encoder: StackLayers<NormLayer<Conv2d>>,
    bottleneck: StackLayers<NormLayer<Linear>>,
    decoder: StackLayers<NormLayer<ConvTranspose2d>>,
}

impl Dae {
    /// * `encoder.{j}.*`
    /// * `bottleneck.{0,1}.*`
    /// * `decoder.{j}.*`
    pub fn new(n_bottleneck: usize, vs: VarBuilder) -> Result<Self> {
        let encoder = conv_encoder_stack(vs.pp("encoder"))?;

        let mut bottleneck = StackLayers::new();
        bottleneck.push_with_act(dense_block(FEATURE_DIM, n_bottleneck, vs.pp("bottleneck.0"))?, elu());
        bottleneck.push_with_act(dense_block(n_bottleneck, FEATURE_DIM, vs.pp("bottleneck.1"))?, elu());

        let decoder = conv_decoder_stack(vs.pp("decoder"))?;

        Ok(Self {
            n_bottleneck,
            encoder,
            bottleneck,
            decoder,
        })
    }

    pub fn dim_bottleneck(&self) -> usize {
        self.n_bottleneck
    }
}

impl AutoEncoderT for Dae {
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<AutoEncoderOutput> {
        let h_nd = flatten_features(&self.encoder.forward_t(x_nchw, train)?)?;
        let h_nd = self.bottleneck.forward_t(&h_nd, train)?;
        let logits = self.decoder.forward_t(&unflatten_features(&h_nd)?, train)?;
        Ok(AutoEncoderOutput {
            logits,
            latent: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_model_encoder::IMAGE_SIDE;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn dae_reconstructs_input_shape() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let dae = Dae::new(DEFAULT_BOTTLENECK_DIM, vb)?;

        let x = Tensor::rand(0f32, 1f32, (2, 1, IMAGE_SIDE, IMAGE_SIDE), &dev)?;
        let out = dae.forward_t(&x, true)?;
        assert_eq!(out.logits.dims(), x.dims());
        assert!(out.latent.is_none());
        Ok(())
    }
}
