use crate::candle_model_encoder::DEFAULT_LATENT_DIM;
use crate::candle_vae::BetaVae;
use crate::checkpoint::{latest_checkpoint, restore_parameters};
use crate::event_log::EventWriter;
use crate::image_grid::{make_grid, DEFAULT_NROW, DEFAULT_PADDING};
use crate::latent_traversal::{traverse_latents, TraversalConfig};

use super::{seed_device, select_device};

use anyhow::Result;
use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use clap::Args;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[arg(
        long,
        default_value = "./.saves/beta-vae",
        help = "Checkpoint directory",
        long_help = "Directory with `.ckpt` records of a beta-VAE run.\n\
		     The record with the most training steps is used."
    )]
    pub checkpoint_dir: PathBuf,

    #[arg(long, default_value = "./.logs/beta-vae", help = "Event log directory")]
    pub log_dir: PathBuf,

    #[arg(long, default_value = "beta-vae", help = "Tag prefix of the images")]
    pub tag: String,

    #[arg(long, default_value_t = 10, help = "Images per latent sweep")]
    pub n_images: usize,

    #[arg(long, default_value_t = 5.0, help = "Sweep over [-range, range]")]
    pub range: f32,

    #[arg(long, default_value_t = DEFAULT_LATENT_DIM, help = "Latent dimension of the model")]
    pub latent_dim: usize,

    #[arg(long, default_value_t = false, help = "Disables CUDA")]
    pub no_cuda: bool,

    #[arg(long, default_value_t = 7691, help = "Random seed")]
    pub seed: u64,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

pub fn run(args: &ProbeArgs) -> Result<()> {
    let device = select_device(args.no_cuda);
    seed_device(&device, args.seed)?;

    let record_file = latest_checkpoint(&args.checkpoint_dir).map_err(|e| {
        anyhow::anyhow!("{}; pass the directory of a trained run with --checkpoint-dir", e)
    })?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let vae = BetaVae::new(args.latent_dim, vb)?;

    let record = restore_parameters(&varmap, &record_file, &[])?;
    info!("Checkpoint loaded: {}", record_file.display());

    let config = TraversalConfig {
        n_images: args.n_images,
        lower: -args.range,
        upper: args.range,
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut events = EventWriter::new(&args.log_dir)?;

    for (dim, probs) in traverse_latents(&vae, &config, &mut rng, &device)?
        .iter()
        .enumerate()
    {
        let grid = make_grid(probs, DEFAULT_NROW, DEFAULT_PADDING)?;
        let tag = format!("{}/feature_{}", args.tag, dim);
        events.add_image(&tag, &grid, record.steps)?;
        info!("wrote {}", tag);
    }

    events.flush()?;
    info!("Done");
    Ok(())
}
