use crate::candle_model_encoder::IMAGE_SIDE;
use crate::dsprites_io;

use candle_core::{DType, Device, Tensor};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

pub struct MinibatchData {
    /// `n x 1 x h x w` images in [0, 1]
    pub input: Tensor,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData>;

    fn num_minibatch(&self) -> usize;

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn new(nsamples: usize) -> Self {
        Self {
            samples: (0..nsamples).collect(),
            chunks: vec![],
        }
    }

    /// Permute the samples and cut the permutation into chunks of
    /// `batch_size`; only the last chunk can be shorter
    pub fn shuffle_minibatch<R: Rng>(&mut self, batch_size: usize, rng: &mut R) {
        debug_assert!(batch_size > 0);
        self.samples.shuffle(rng);
        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}

///
/// In-memory dSprites images. The whole `n x 64 x 64` array stays
/// in `u8`; only the requested minibatch is cast to `f32`.
///
pub struct DspritesData {
    images_nhw: Tensor,
    minibatches: Minibatches,
    rng: StdRng,
}

impl DspritesData {
    /// Read the `imgs` array of a dSprites `.npz` file
    pub fn from_npz(npz_file: &Path, seed: u64) -> anyhow::Result<Self> {
        let images_nhw = dsprites_io::load_images(npz_file)?;
        Self::from_tensor(images_nhw, seed)
    }

    /// Wrap an `n x h x w` image tensor
    pub fn from_tensor(images_nhw: Tensor, seed: u64) -> anyhow::Result<Self> {
        let dims = images_nhw.dims().to_vec();
        if dims.len() != 3 {
            return Err(anyhow::anyhow!(
                "expected n x h x w images, got {:?}",
                dims
            ));
        }
        if dims[0] == 0 {
            return Err(anyhow::anyhow!("empty image set"));
        }

        Ok(Self {
            minibatches: Minibatches::new(dims[0]),
            images_nhw,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn num_samples(&self) -> usize {
        self.minibatches.size()
    }

    pub fn image_side(&self) -> anyhow::Result<usize> {
        Ok(self.images_nhw.dim(2)?)
    }

    /// Take samples by index as `n x 1 x h x w` floats
    pub fn images(&self, samples: &[usize], target_device: &Device) -> anyhow::Result<Tensor> {
        let idx: Vec<u32> = samples.iter().map(|&i| i as u32).collect();
        let idx = Tensor::from_vec(idx, samples.len(), self.images_nhw.device())?;
        Ok(self
            .images_nhw
            .index_select(&idx, 0)?
            .to_dtype(DType::F32)?
            .unsqueeze(1)?
            .to_device(target_device)?)
    }
}

impl DataLoader for DspritesData {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData> {
        if self.minibatches.chunks.is_empty() {
            return Err(anyhow::anyhow!("need to shuffle data"));
        }

        if let Some(samples) = self.minibatches.chunks.get(batch_idx) {
            Ok(MinibatchData {
                input: self.images(samples, target_device)?,
            })
        } else {
            Err(anyhow::anyhow!(
                "invalid index = {} vs. total # = {}",
                batch_idx,
                self.num_minibatch()
            ))
        }
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch size must be positive"));
        }
        self.minibatches.shuffle_minibatch(batch_size, &mut self.rng);
        Ok(())
    }
}

/// check that the images fit the convolutional stacks
pub fn check_image_side(data: &DspritesData) -> anyhow::Result<()> {
    let side = data.image_side()?;
    if side != IMAGE_SIDE {
        return Err(anyhow::anyhow!(
            "images must be {} x {}, got {} x {}",
            IMAGE_SIDE,
            IMAGE_SIDE,
            side,
            side
        ));
    }
    Ok(())
}
