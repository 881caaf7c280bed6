use crate::candle_dae::{Dae, DEFAULT_BOTTLENECK_DIM};
use crate::candle_data_loader::{check_image_side, DspritesData};
use crate::candle_inference::*;
use crate::candle_model_encoder::DEFAULT_LATENT_DIM;
use crate::candle_model_traits::AutoEncoderT;
use crate::candle_vae::{BetaVae, PRETRAINED_PREFIXES};
use crate::candle_vae_inference::{RunSink, TrainTrace, Vae, VaeT};
use crate::checkpoint::{latest_checkpoint, restore_parameters};
use crate::dsprites_io::ensure_downloaded;
use crate::event_log::EventWriter;

use super::{seed_device, select_device};

use anyhow::Result;
use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use clap::{Args, ValueEnum};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// environment variable of a batch-scheduled job; its value is
/// appended to the output folder
pub const JOB_ID_VAR: &str = "SLURM_JOB_ID";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// beta-VAE with a 10-dimensional Gaussian latent
    Vae,
    /// deterministic autoencoder with a 100-unit bottleneck
    Dae,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct TrainArgs {
    #[arg(
        long,
        default_value_t = 100,
        help = "Input batch size for training",
        long_help = "Number of images per minibatch.\n\
		     The last minibatch of an epoch can be smaller."
    )]
    pub batch_size: usize,

    #[arg(long, default_value_t = 200_000, help = "Number of training steps")]
    pub num_steps: usize,

    #[arg(
        long,
        default_value_t = 200,
        help = "Log interval",
        long_help = "Number of steps between reconstruction images\n\
		     and checkpoints."
    )]
    pub log_interval: usize,

    #[arg(long, default_value_t = 1.0, help = "Value of the hyperparameter beta")]
    pub beta: f64,

    #[arg(
        long,
        default_value_t = DEFAULT_BETA_WARMUP_START,
        help = "Step at which beta starts to rise from 0"
    )]
    pub beta_warmup_start: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_BETA_WARMUP_STEPS,
        help = "Steps for beta to reach its final value",
        long_help = "beta(t) = clamp(beta * (t - start) / steps, 0, beta).\n\
		     Set to 0 to switch beta on at once."
    )]
    pub beta_warmup_steps: usize,

    #[arg(
        long,
        value_enum,
        default_value = "normal",
        help = "Type of the observation model",
        long_help = "Observation model of the pixels:\n\
		     normal: squared error of sigmoid(logits)\n\
		     bernoulli: binary cross entropy with logits"
    )]
    pub obs: ObservationModel,

    #[arg(long, value_enum, default_value = "vae", help = "Model to train")]
    pub model: ModelType,

    #[arg(
        long,
        help = "Path to pretrained model",
        long_help = "Checkpoint directory of a previous run.\n\
		     Encoder and decoder parameters of its latest checkpoint\n\
		     are copied before training."
    )]
    pub pretrained: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_LEARNING_RATE, help = "Adam learning rate")]
    pub learning_rate: f64,

    #[arg(long, default_value_t = false, help = "Disables CUDA training")]
    pub no_cuda: bool,

    #[arg(long, default_value_t = 7691, help = "Random seed")]
    pub seed: u64,

    #[arg(
        long,
        default_value = "vae",
        help = "Name of the output folder",
        long_help = "Run name: checkpoints go to {save_root}/{name}/,\n\
		     events to {log_root}/{name}/.\n\
		     `-{SLURM_JOB_ID}` is appended when set."
    )]
    pub output_folder: String,

    #[arg(long, default_value = "./data/dsprites", help = "dSprites cache directory")]
    pub data_root: PathBuf,

    #[arg(long, default_value = "./.saves", help = "Root of checkpoint folders")]
    pub save_root: PathBuf,

    #[arg(long, default_value = "./.logs", help = "Root of event folders")]
    pub log_root: PathBuf,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

impl TrainArgs {
    /// `output_folder`, suffixed by the scheduler job id if any
    pub fn run_name(&self) -> String {
        run_name(&self.output_folder, std::env::var(JOB_ID_VAR).ok().as_deref())
    }

    pub fn train_config(&self, device: candle_core::Device) -> TrainConfig {
        TrainConfig {
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            num_steps: self.num_steps,
            log_interval: self.log_interval,
            beta: self.beta,
            beta_warmup_start: self.beta_warmup_start,
            beta_warmup_steps: self.beta_warmup_steps,
            observation: self.obs,
            device,
            verbose: self.verbose,
            show_progress: true,
        }
    }
}

pub fn run_name(folder: &str, job_id: Option<&str>) -> String {
    match job_id {
        Some(id) if !id.is_empty() => format!("{}-{}", folder, id),
        _ => folder.to_string(),
    }
}

pub fn run(args: &TrainArgs) -> Result<()> {
    let device = select_device(args.no_cuda);
    info!("Using device: {:?}", device);
    seed_device(&device, args.seed)?;

    let run_name = args.run_name();
    let checkpoint_dir = args.save_root.join(&run_name);
    std::fs::create_dir_all(&checkpoint_dir)?;

    // 1. data
    let npz_file = ensure_downloaded(&args.data_root)?;
    let mut data = DspritesData::from_npz(&npz_file, args.seed)?;
    check_image_side(&data)?;
    info!("{} images", data.num_samples());

    // 2. model
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

    let mut sink = RunSink {
        events: EventWriter::new(&args.log_root.join(&run_name))?,
        checkpoint_dir,
        run_name: run_name.clone(),
        args: serde_json::to_value(args)?,
    };

    let config = args.train_config(device.clone());

    let trace = match args.model {
        ModelType::Vae => {
            let vae = BetaVae::new(DEFAULT_LATENT_DIM, vb)?;
            if let Some(dir) = args.pretrained.as_deref() {
                load_pretrained(&varmap, dir)?;
            }
            info!("beta-VAE with {} latent dimensions", vae.dim_latent());
            fit(&vae, &varmap, &mut data, &config, &mut sink)?
        }
        ModelType::Dae => {
            let dae = Dae::new(DEFAULT_BOTTLENECK_DIM, vb)?;
            if let Some(dir) = args.pretrained.as_deref() {
                load_pretrained(&varmap, dir)?;
            }
            info!("autoencoder with {} bottleneck units", dae.dim_bottleneck());
            fit(&dae, &varmap, &mut data, &config, &mut sink)?
        }
    };

    if let Some(last) = trace.loss.last() {
        info!("final loss after {} steps: {}", trace.loss.len(), last);
    }
    info!("Done");
    Ok(())
}

fn load_pretrained(varmap: &VarMap, dir: &Path) -> Result<()> {
    let record_file = latest_checkpoint(dir)?;
    restore_parameters(varmap, &record_file, &PRETRAINED_PREFIXES)?;
    Ok(())
}

fn fit<Model>(
    model: &Model,
    varmap: &VarMap,
    data: &mut DspritesData,
    config: &TrainConfig,
    sink: &mut RunSink,
) -> Result<TrainTrace>
where
    Model: AutoEncoderT,
{
    let mut vae = Vae::build(model, varmap);
    vae.train_autoencoder(data, config, Some(sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_suffixes_the_run_name() {
        assert_eq!(run_name("vae", None), "vae");
        assert_eq!(run_name("vae", Some("")), "vae");
        assert_eq!(run_name("vae", Some("1234")), "vae-1234");
    }
}
