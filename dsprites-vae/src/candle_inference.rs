use crate::candle_loss_functions::{bernoulli_logit_likelihood, normal_sigmoid_likelihood};
use candle_core::{Result, Tensor};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEARNING_RATE: f64 = 5e-4;
pub const DEFAULT_BETA_WARMUP_START: usize = 10_000;
pub const DEFAULT_BETA_WARMUP_STEPS: usize = 10_000;

/// Observation model `p(x|z)` on the decoder logits
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ObservationModel {
    /// squared error between sigmoid(logits) and pixels
    Normal,
    /// binary cross entropy with logits
    Bernoulli,
}

impl ObservationModel {
    /// fn (observed, logits) -> log-likelihood (n)
    pub fn llik(&self) -> fn(&Tensor, &Tensor) -> Result<Tensor> {
        match self {
            ObservationModel::Normal => normal_sigmoid_likelihood,
            ObservationModel::Bernoulli => bernoulli_logit_likelihood,
        }
    }
}

pub struct TrainConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub num_steps: usize,
    pub log_interval: usize,
    pub beta: f64,
    pub beta_warmup_start: usize,
    pub beta_warmup_steps: usize,
    pub observation: ObservationModel,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}

impl TrainConfig {
    pub fn beta_at(&self, step: usize) -> f64 {
        annealed_beta(self.beta, step, self.beta_warmup_start, self.beta_warmup_steps)
    }

    /// reconstruction images and checkpoints are due
    pub fn is_log_step(&self, step: usize) -> bool {
        self.log_interval > 0 && step > 0 && step % self.log_interval == 0
    }
}

/// KL weight: 0 until `start`, then linear up to `beta` over `length` steps
///
/// beta(t) = clamp(beta * (t - start) / length, 0, beta)
pub fn annealed_beta(beta: f64, step: usize, start: usize, length: usize) -> f64 {
    if length == 0 {
        return if step >= start { beta } else { 0. };
    }
    let progress = (step as f64 - start as f64) / length as f64;
    (beta * progress).max(0.).min(beta)
}
