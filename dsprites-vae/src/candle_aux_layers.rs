use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{Activation, BatchNorm, Conv2d, ConvTranspose2d, Linear, VarBuilder};

pub const BLOCK_KERNEL: usize = 4;
pub const BLOCK_STRIDE: usize = 2;
pub const BLOCK_PADDING: usize = 1;

/// build a stack of alternating `M` and `A` layers
pub struct StackLayers<M>
where
    M: ModuleT,
{
    module_layers: Vec<M>,
    activation_layers: Vec<Option<Activation>>,
}

impl<M> ModuleT for StackLayers<M>
where
    M: ModuleT,
{
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward_t(&x, train)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
            }
        }
        Ok(x)
    }
}

impl<M> StackLayers<M>
where
    M: ModuleT,
{
    pub fn new() -> Self {
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
        }
    }

    /// Appends a layer after all the current layers.
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.module_layers.push(layer);
        self.activation_layers.push(Some(activation));
    }

    pub fn push(&mut self, layer: M) {
        self.module_layers.push(layer);
        self.activation_layers.push(None);
    }

    pub fn len(&self) -> usize {
        self.module_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: ModuleT,
{
    fn default() -> Self {
        Self::new()
    }
}

/////////////////////////////////////////////
// A layer followed by batch normalization //
/////////////////////////////////////////////

/// A layer `M` optionally followed by batch normalization over
/// dimension 1 (channels for `n x c x h x w`, features for `n x d`)
pub struct NormLayer<M>
where
    M: Module,
{
    layer: M,
    bn: Option<BatchNorm>,
}

impl<M> NormLayer<M>
where
    M: Module,
{
    pub fn new(layer: M, bn: Option<BatchNorm>) -> Self {
        Self { layer, bn }
    }

    pub fn bare(layer: M) -> Self {
        Self { layer, bn: None }
    }
}

impl<M> ModuleT for NormLayer<M>
where
    M: Module,
{
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.layer.forward(x)?;
        match &self.bn {
            Some(bn) => bn.forward_t(&h, train),
            None => Ok(h),
        }
    }
}

pub fn batch_norm_config() -> candle_nn::BatchNormConfig {
    candle_nn::BatchNormConfig {
        eps: 1e-5,
        remove_mean: true,
        affine: true,
        momentum: 0.1,
    }
}

pub fn elu() -> Activation {
    Activation::Elu(1.0)
}

/// conv(k=4, s=2, p=1) -> batchnorm: `n x c_in x h x w` -> `n x c_out x h/2 x w/2`
///
/// * `{vb}.conv.weight`, `{vb}.conv.bias`
/// * `{vb}.bn.*`
pub fn encoder_block(c_in: usize, c_out: usize, vb: VarBuilder) -> Result<NormLayer<Conv2d>> {
    let cfg = candle_nn::Conv2dConfig {
        padding: BLOCK_PADDING,
        stride: BLOCK_STRIDE,
        ..Default::default()
    };
    let conv = candle_nn::conv2d(c_in, c_out, BLOCK_KERNEL, cfg, vb.pp("conv"))?;
    let bn = candle_nn::batch_norm(c_out, batch_norm_config(), vb.pp("bn"))?;
    Ok(NormLayer::new(conv, Some(bn)))
}

fn deconv_config() -> candle_nn::ConvTranspose2dConfig {
    candle_nn::ConvTranspose2dConfig {
        padding: BLOCK_PADDING,
        stride: BLOCK_STRIDE,
        ..Default::default()
    }
}

/// deconv(k=4, s=2, p=1) -> batchnorm: `n x c_in x h x w` -> `n x c_out x 2h x 2w`
pub fn decoder_block(
    c_in: usize,
    c_out: usize,
    vb: VarBuilder,
) -> Result<NormLayer<ConvTranspose2d>> {
    let deconv = candle_nn::conv_transpose2d(c_in, c_out, BLOCK_KERNEL, deconv_config(), vb.pp("deconv"))?;
    let bn = candle_nn::batch_norm(c_out, batch_norm_config(), vb.pp("bn"))?;
    Ok(NormLayer::new(deconv, Some(bn)))
}

/// The last upsampling layer has neither normalization nor activation
pub fn decoder_output_layer(
    c_in: usize,
    c_out: usize,
    vb: VarBuilder,
) -> Result<NormLayer<ConvTranspose2d>> {
    let deconv = candle_nn::conv_transpose2d(c_in, c_out, BLOCK_KERNEL, deconv_config(), vb.pp("deconv"))?;
    Ok(NormLayer::bare(deconv))
}

/// linear -> batchnorm: `n x d_in` -> `n x d_out`
pub fn dense_block(d_in: usize, d_out: usize, vb: VarBuilder) -> Result<NormLayer<Linear>> {
    let fc = candle_nn::linear(d_in, d_out, vb.pp("fc"))?;
    let bn = candle_nn::batch_norm(d_out, batch_norm_config(), vb.pp("bn"))?;
    Ok(NormLayer::new(fc, Some(bn)))
}

/// softplus(x) = log(1 + exp(x)) = relu(x) + log(1 + exp(-|x|))
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = ((x.abs()?.neg()?.exp()? + 1.0)?).log()?;
    x.relu()? + tail
}
