use candle_core::Device;
use candle_nn::{ParamsAdamW, VarMap};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const RECORD_EXT: &str = "ckpt";
pub const PARAMETER_EXT: &str = "safetensors";

/// AdamW hyper-parameters plus the number of updates applied
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OptimizerState {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    pub num_updates: usize,
}

impl OptimizerState {
    pub fn new(params: &ParamsAdamW, num_updates: usize) -> Self {
        Self {
            lr: params.lr,
            beta1: params.beta1,
            beta2: params.beta2,
            eps: params.eps,
            weight_decay: params.weight_decay,
            num_updates,
        }
    }

    pub fn params(&self) -> ParamsAdamW {
        ParamsAdamW {
            lr: self.lr,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        }
    }
}

/// `{folder}_{steps}.ckpt`: everything but the tensors, which go
/// to the `parameters` file next to it
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointRecord {
    pub steps: usize,
    /// `None` if the loss was not finite
    pub loss: Option<f32>,
    pub optimizer: OptimizerState,
    pub args: serde_json::Value,
    /// file name of the safetensors file, relative to the record
    pub parameters: String,
}

pub fn checkpoint_stem(folder: &str, steps: usize) -> String {
    format!("{}_{}", folder, steps)
}

/// Write `{dir}/{folder}_{steps}.safetensors` and `{dir}/{folder}_{steps}.ckpt`
///
/// Returns the record path
pub fn save_checkpoint(
    dir: &Path,
    folder: &str,
    steps: usize,
    loss: f32,
    optimizer: OptimizerState,
    args: serde_json::Value,
    varmap: &VarMap,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stem = checkpoint_stem(folder, steps);

    let parameters = format!("{}.{}", stem, PARAMETER_EXT);
    varmap.save(dir.join(&parameters))?;

    let record = CheckpointRecord {
        steps,
        loss: loss.is_finite().then_some(loss),
        optimizer,
        args,
        parameters,
    };

    let record_file = dir.join(format!("{}.{}", stem, RECORD_EXT));
    std::fs::write(&record_file, serde_json::to_string_pretty(&record)?)?;
    info!("Saved checkpoint {}", record_file.display());
    Ok(record_file)
}

pub fn load_record(record_file: &Path) -> anyhow::Result<CheckpointRecord> {
    let text = std::fs::read_to_string(record_file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", record_file.display(), e))?;
    Ok(serde_json::from_str(&text)?)
}

/// The record with the largest `steps` in `dir`; unreadable records
/// are skipped with a warning
pub fn latest_checkpoint(dir: &Path) -> anyhow::Result<PathBuf> {
    if !dir.is_dir() {
        anyhow::bail!(
            "checkpoint directory {} does not exist; please correct the directory",
            dir.display()
        );
    }

    let mut latest: Option<(usize, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }
        let steps = match load_record(&path) {
            Ok(record) => record.steps,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if latest.as_ref().map_or(true, |(s, _)| steps > *s) {
            latest = Some((steps, path));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| anyhow::anyhow!("no .{} files in {}", RECORD_EXT, dir.display()))
}

/// Copy tensors of a checkpoint into `varmap`
///
/// * `record_file` - a `.ckpt` record
/// * `prefixes` - restore only variables with these name prefixes;
///   every variable if empty
pub fn restore_parameters(
    varmap: &VarMap,
    record_file: &Path,
    prefixes: &[&str],
) -> anyhow::Result<CheckpointRecord> {
    let record = load_record(record_file)?;
    let dir = record_file.parent().unwrap_or(Path::new("."));
    let tensors = candle_core::safetensors::load(dir.join(&record.parameters), &Device::Cpu)?;

    let data = varmap
        .data()
        .lock()
        .map_err(|e| anyhow::anyhow!("variable map lock: {}", e))?;

    let mut nrestored = 0;
    for (name, var) in data.iter() {
        if !prefixes.is_empty() && !prefixes.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        let value = tensors
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("cannot find {} in {}", name, record.parameters))?;
        var.set(&value.to_dtype(var.dtype())?.to_device(var.device())?)?;
        nrestored += 1;
    }

    info!(
        "Restored {} variables from {} (step {})",
        nrestored,
        record_file.display(),
        record.steps
    );
    Ok(record)
}
