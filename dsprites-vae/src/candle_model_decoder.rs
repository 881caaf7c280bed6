use crate::candle_aux_layers::*;
use crate::candle_model_encoder::{
    ENCODER_CHANNELS, FEATURE_CHANNELS, FEATURE_DIM, FEATURE_SIDE, IMAGE_CHANNELS,
};
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{ConvTranspose2d, Linear, ModuleT, VarBuilder};

/// `n x 64 x 4 x 4` -> `n x 1 x 64 x 64` logits
///
/// Mirrors the encoder channels: 64 -> 64 -> 32 -> 32 -> 1
pub fn conv_decoder_stack(vb: VarBuilder) -> Result<StackLayers<NormLayer<ConvTranspose2d>>> {
    let mut deconv = StackLayers::new();
    let mut prev_dim = FEATURE_CHANNELS;
    let channels = ENCODER_CHANNELS.iter().rev().skip(1);
    for (j, &next_dim) in channels.enumerate() {
        deconv.push_with_act(decoder_block(prev_dim, next_dim, vb.pp(j.to_string()))?, elu());
        prev_dim = next_dim;
    }
    let last = ENCODER_CHANNELS.len() - 1;
    deconv.push(decoder_output_layer(prev_dim, IMAGE_CHANNELS, vb.pp(last.to_string()))?);
    Ok(deconv)
}

/// `n x (c * h * w)` -> `n x c x h x w`
pub fn unflatten_features(h_nd: &Tensor) -> Result<Tensor> {
    let n = h_nd.dim(0)?;
    h_nd.reshape((n, FEATURE_CHANNELS, FEATURE_SIDE, FEATURE_SIDE))
}

pub struct ConvDecoder {
    n_latent: usize,
    ffwd: StackLayers<NormLayer<Linear>>,
    deconv: StackLayers<NormLayer<ConvTranspose2d>>,
}

impl DecoderModuleT for ConvDecoder {
    fn forward_t(&self, z_nk: &Tensor, train: bool) -> Result<Tensor> {
        let h_nd = self.ffwd.forward_t(z_nk, train)?;
        self.deconv.forward_t(&unflatten_features(&h_nd)?, train)
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl ConvDecoder {
    /// Will create a new convolutional decoder module
    /// with these variables:
    ///
    /// * `{vs}.ffwd.0.fc.*`, `{vs}.ffwd.0.bn.*`
    /// * `{vs}.deconv.{j}.*` where {j} is the block index
    pub fn new(n_latent: usize, vs: VarBuilder) -> Result<Self> {
        let mut ffwd = StackLayers::new();
        ffwd.push_with_act(dense_block(n_latent, FEATURE_DIM, vs.pp("ffwd").pp("0"))?, elu());

        let deconv = conv_decoder_stack(vs.pp("deconv"))?;

        Ok(Self {
            n_latent,
            ffwd,
            deconv,
        })
    }
}
