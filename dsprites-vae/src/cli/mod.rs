pub mod probe;
pub mod train;

use candle_core::Device;
use clap::{Parser, Subcommand};
use log::{info, warn};

pub use probe::ProbeArgs;
pub use train::{ModelType, TrainArgs};

#[derive(Parser)]
#[command(name = "dsprites-vae")]
#[command(about = "beta-VAE on dSprites: training and disentanglement probing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Train(args) => args.verbose,
            Commands::Probe(args) => args.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Train a beta-VAE (or a deterministic autoencoder) on dSprites",
        long_about = "Train an encoder-decoder on dSprites by Adam:\n\
		      (1) Download and cache the dSprites images\n\
		      (2) Minimize reconstruction + annealed beta * KL divergence\n\
		      (3) Log scalars, histograms and reconstructions; save checkpoints.\n"
    )]
    Train(TrainArgs),

    #[command(
        about = "Render latent traversals of the latest checkpoint",
        long_about = "Load the most recent checkpoint and sweep one latent\n\
		      dimension at a time, decoding the sweep into an image grid\n\
		      to see which dimension controls which generative factor.\n"
    )]
    Probe(ProbeArgs),
}

/// CUDA (or Metal) if compiled in, available and not disabled
pub fn select_device(no_cuda: bool) -> Device {
    if no_cuda {
        return Device::Cpu;
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            return dev;
        }
    }

    match Device::cuda_if_available(0) {
        Ok(dev) => dev,
        Err(e) => {
            warn!("falling back to cpu: {}", e);
            Device::Cpu
        }
    }
}

/// Seed the device generator; the cpu generator cannot be seeded
pub fn seed_device(device: &Device, seed: u64) -> candle_core::Result<()> {
    if device.is_cpu() {
        info!("cpu noise is not seeded; seed {} applies to data shuffling", seed);
        Ok(())
    } else {
        device.set_seed(seed)
    }
}
