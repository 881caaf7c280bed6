use crate::candle_data_loader::*;
use crate::candle_inference::TrainConfig;
use crate::candle_loss_functions::gaussian_kl_loss;
use crate::candle_model_traits::{AutoEncoderT, GaussianLatent};
use crate::checkpoint::{save_checkpoint, OptimizerState};
use crate::event_log::EventWriter;
use crate::image_grid::{make_grid, DEFAULT_NROW, DEFAULT_PADDING};

use candle_core::{DType, Result, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use std::path::PathBuf;

/// Per-step training curves
#[derive(Default, Debug)]
pub struct TrainTrace {
    pub loss: Vec<f32>,
    pub reconst_loss: Vec<f32>,
    pub kl_divergence: Vec<f32>,
    pub beta: Vec<f64>,
}

impl TrainTrace {
    fn with_capacity(n: usize) -> Self {
        Self {
            loss: Vec::with_capacity(n),
            reconst_loss: Vec::with_capacity(n),
            kl_divergence: Vec::with_capacity(n),
            beta: Vec::with_capacity(n),
        }
    }
}

/// Where a training run leaves its events and checkpoints
pub struct RunSink {
    pub events: EventWriter,
    pub checkpoint_dir: PathBuf,
    pub run_name: String,
    /// run configuration stored in every checkpoint record
    pub args: serde_json::Value,
}

impl RunSink {
    /// Render `sigmoid(logits)` or raw images as a normalized grid
    pub fn add_images(&mut self, tag: &str, images_nchw: &Tensor, step: usize) -> anyhow::Result<()> {
        let grid = make_grid(images_nchw, DEFAULT_NROW, DEFAULT_PADDING)?;
        self.events.add_image(tag, &grid, step)
    }

    fn add_step(
        &mut self,
        step: usize,
        stat: &StepStat,
        latent: Option<&GaussianLatent>,
    ) -> anyhow::Result<()> {
        self.events.add_scalar("loss", stat.loss as f64, step)?;
        self.events.add_scalar("reconst_loss", stat.reconst_loss as f64, step)?;
        self.events.add_scalar("kl_divergence", stat.kl_divergence as f64, step)?;
        self.events.add_scalar("beta", stat.beta, step)?;

        if let Some(latent) = latent {
            self.events.add_histogram("mu", &latent.mean, step)?;
            self.events.add_histogram("log_var", &latent.lnvar, step)?;
        }
        Ok(())
    }

    fn save(
        &mut self,
        step: usize,
        loss: f32,
        optimizer: OptimizerState,
        variable_map: &VarMap,
    ) -> anyhow::Result<PathBuf> {
        self.events.flush()?;
        save_checkpoint(
            &self.checkpoint_dir,
            &self.run_name,
            step,
            loss,
            optimizer,
            self.args.clone(),
            variable_map,
        )
    }
}

struct StepStat {
    loss: f32,
    reconst_loss: f32,
    kl_divergence: f32,
    beta: f64,
}

pub struct Vae<'a, Model>
where
    Model: AutoEncoderT,
{
    pub model: &'a Model,
    pub variable_map: &'a VarMap,
}

pub trait VaeT<'a, Model>
where
    Model: AutoEncoderT,
{
    /// Train the autoencoder for `num_steps` minibatch updates
    ///
    /// * `data` - data loader, reshuffled every time it runs out
    /// * `train_config` - training configuration
    /// * `sink` - events and checkpoints (optional)
    fn train_autoencoder<DataL>(
        &mut self,
        data: &mut DataL,
        train_config: &TrainConfig,
        sink: Option<&mut RunSink>,
    ) -> anyhow::Result<TrainTrace>
    where
        DataL: DataLoader;

    /// Reconstruction probabilities `sigmoid(logits)` in eval mode
    fn reconstruct(&self, x_nchw: &Tensor) -> Result<Tensor>;

    fn build(model: &'a Model, variable_map: &'a VarMap) -> Self;
}

impl<'a, Model> VaeT<'a, Model> for Vae<'a, Model>
where
    Model: AutoEncoderT,
{
    fn train_autoencoder<DataL>(
        &mut self,
        data: &mut DataL,
        train_config: &TrainConfig,
        mut sink: Option<&mut RunSink>,
    ) -> anyhow::Result<TrainTrace>
    where
        DataL: DataLoader,
    {
        let device = &train_config.device;
        let adam_params = ParamsAdamW {
            lr: train_config.learning_rate,
            weight_decay: 0.,
            ..Default::default()
        };
        let mut adam = AdamW::new(self.variable_map.all_vars(), adam_params.clone())?;

        let pb = ProgressBar::new(train_config.num_steps as u64);

        if !train_config.show_progress || train_config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let llik_func = train_config.observation.llik();
        let mut trace = TrainTrace::with_capacity(train_config.num_steps);

        data.shuffle_minibatch(train_config.batch_size)?;

        // the first minibatch is kept to show reconstructions over time
        let fixed_x = data.minibatch_data(0, device)?.input;
        if let Some(sink) = sink.as_deref_mut() {
            sink.add_images("original", &fixed_x, 0)?;
        }

        info!("Start training for {} steps...", train_config.num_steps);

        let mut steps = 0;
        while steps < train_config.num_steps {
            for b in 0..data.num_minibatch() {
                let x_nchw = data.minibatch_data(b, device)?.input;

                let (out, llik) = self.model.forward_with_llik(&x_nchw, &llik_func, true)?;
                let reconst_loss = llik.sum_all()?.neg()?;

                let beta = train_config.beta_at(steps);
                let kl = match out.latent.as_ref() {
                    Some(latent) => {
                        (gaussian_kl_loss(&latent.mean, &latent.lnvar)?.sum_all()? * beta)?
                    }
                    None => Tensor::zeros((), DType::F32, device)?,
                };

                let loss = (&reconst_loss + &kl)?;
                adam.backward_step(&loss)?;

                let stat = StepStat {
                    loss: loss.to_scalar::<f32>()?,
                    reconst_loss: reconst_loss.to_scalar::<f32>()?,
                    kl_divergence: kl.to_scalar::<f32>()?,
                    beta,
                };

                if let Some(sink) = sink.as_deref_mut() {
                    sink.add_step(steps, &stat, out.latent.as_ref())?;
                }

                if train_config.is_log_step(steps) {
                    info!(
                        "[{}] loss: {:.3}, reconst: {:.3}, kl: {:.3}, beta: {:.4}",
                        steps, stat.loss, stat.reconst_loss, stat.kl_divergence, beta
                    );
                    if let Some(sink) = sink.as_deref_mut() {
                        let recon = self.reconstruct(&fixed_x)?;
                        sink.add_images("reconstruction", &recon, steps)?;
                        let optimizer = OptimizerState::new(&adam_params, steps + 1);
                        sink.save(steps, stat.loss, optimizer, self.variable_map)?;
                    }
                } else if train_config.verbose {
                    info!(
                        "[{}] loss: {:.3}, reconst: {:.3}, kl: {:.3}",
                        steps, stat.loss, stat.reconst_loss, stat.kl_divergence
                    );
                }

                trace.loss.push(stat.loss);
                trace.reconst_loss.push(stat.reconst_loss);
                trace.kl_divergence.push(stat.kl_divergence);
                trace.beta.push(beta);

                pb.inc(1);
                steps += 1;
                if steps >= train_config.num_steps {
                    break;
                }
            }

            if steps < train_config.num_steps {
                data.shuffle_minibatch(train_config.batch_size)?;
            }
        }

        pb.finish_and_clear();

        if let Some(sink) = sink.as_deref_mut() {
            sink.events.flush()?;
        }

        info!("done model training");
        Ok(trace)
    }

    fn reconstruct(&self, x_nchw: &Tensor) -> Result<Tensor> {
        let out = self.model.forward_t(x_nchw, false)?;
        candle_nn::ops::sigmoid(&out.logits)
    }

    fn build(model: &'a Model, variable_map: &'a VarMap) -> Self {
        Self {
            model,
            variable_map,
        }
    }
}
