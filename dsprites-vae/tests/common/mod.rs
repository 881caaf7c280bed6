#![allow(dead_code)]

use candle_core::{DType, Device, Tensor};

pub const SIDE: usize = 64;

/// `n x 64 x 64` binary images with one white square each
pub fn square_sprites(n: usize, width: usize) -> candle_core::Result<Tensor> {
    let mut pixels = vec![0u8; n * SIDE * SIDE];
    for k in 0..n {
        let offset = 4 + (k * 7) % (SIDE - width - 8);
        for i in offset..offset + width {
            for j in offset..offset + width {
                pixels[k * SIDE * SIDE + i * SIDE + j] = 1;
            }
        }
    }
    Tensor::from_vec(pixels, (n, SIDE, SIDE), &Device::Cpu)
}

pub fn first_var(varmap: &candle_nn::VarMap, name: &str) -> candle_core::Result<Vec<f32>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
    let var = data
        .get(name)
        .ok_or_else(|| candle_core::Error::Msg(format!("no {}", name)))?;
    var.as_tensor().to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()
}
