mod common;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use dsprites_vae::candle_dae::{Dae, DEFAULT_BOTTLENECK_DIM};
use dsprites_vae::candle_data_loader::{DataLoader, DspritesData};
use dsprites_vae::candle_inference::{ObservationModel, TrainConfig};
use dsprites_vae::candle_vae::BetaVae;
use dsprites_vae::candle_vae_inference::{RunSink, Vae, VaeT};
use dsprites_vae::checkpoint::{latest_checkpoint, load_record};
use dsprites_vae::event_log::{Event, EventWriter, EVENT_FILE};

fn config(num_steps: usize, batch_size: usize, observation: ObservationModel) -> TrainConfig {
    TrainConfig {
        learning_rate: 1e-3,
        batch_size,
        num_steps,
        log_interval: 0,
        beta: 1.,
        beta_warmup_start: 0,
        beta_warmup_steps: 0,
        observation,
        device: Device::Cpu,
        verbose: false,
        show_progress: false,
    }
}

#[test]
fn minibatches_are_float_images() -> anyhow::Result<()> {
    let mut data = DspritesData::from_tensor(common::square_sprites(10, 16)?, 1)?;
    assert!(data.minibatch_data(0, &Device::Cpu).is_err());

    data.shuffle_minibatch(4)?;
    assert_eq!(data.num_minibatch(), 3);

    let mb = data.minibatch_data(2, &Device::Cpu)?;
    assert_eq!(mb.input.dims(), &[2, 1, 64, 64]);
    assert_eq!(mb.input.dtype(), DType::F32);
    assert_eq!(mb.input.max_all()?.to_scalar::<f32>()?, 1.);
    assert!(data.minibatch_data(3, &Device::Cpu).is_err());
    Ok(())
}

#[test]
fn reconstruction_loss_drops_on_a_fixed_batch() -> anyhow::Result<()> {
    let mut data = DspritesData::from_tensor(common::square_sprites(8, 16)?, 7)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let dae = Dae::new(DEFAULT_BOTTLENECK_DIM, vb)?;

    let mut vae = Vae::build(&dae, &varmap);
    let trace = vae.train_autoencoder(&mut data, &config(30, 8, ObservationModel::Bernoulli), None)?;

    assert_eq!(trace.reconst_loss.len(), 30);
    assert!(trace.kl_divergence.iter().all(|&kl| kl == 0.));

    let head: f32 = trace.reconst_loss[..3].iter().sum();
    let tail: f32 = trace.reconst_loss[27..].iter().sum();
    assert!(tail < head, "{} vs. {}", tail, head);
    Ok(())
}

#[test]
fn beta_is_annealed_and_checkpoints_are_written() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut data = DspritesData::from_tensor(common::square_sprites(6, 12)?, 3)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = BetaVae::new(10, vb)?;

    let mut train_config = config(6, 4, ObservationModel::Normal);
    train_config.log_interval = 2;
    train_config.beta = 2.;
    train_config.beta_warmup_start = 2;
    train_config.beta_warmup_steps = 2;

    let mut sink = RunSink {
        events: EventWriter::new(&tmp.path().join("logs"))?,
        checkpoint_dir: tmp.path().join("saves"),
        run_name: "vae".to_string(),
        args: serde_json::json!({ "beta": 2.0 }),
    };

    let mut vae = Vae::build(&model, &varmap);
    let trace = vae.train_autoencoder(&mut data, &train_config, Some(&mut sink))?;
    drop(sink);

    assert_eq!(trace.beta, vec![0., 0., 0., 1., 2., 2.]);
    assert_eq!(trace.kl_divergence[0], 0.);
    assert!(trace.kl_divergence[4] > 0.);
    for (i, loss) in trace.loss.iter().enumerate() {
        let sum = trace.reconst_loss[i] + trace.kl_divergence[i];
        assert!((loss - sum).abs() <= 1e-3 * loss.abs().max(1.));
    }

    let latest = latest_checkpoint(&tmp.path().join("saves"))?;
    let record = load_record(&latest)?;
    assert_eq!(record.steps, 4);
    assert_eq!(record.optimizer.num_updates, 5);
    assert_eq!(record.args["beta"], 2.0);
    assert!(tmp.path().join("saves").join("vae_2.ckpt").exists());
    assert!(tmp.path().join("saves").join("vae_4.safetensors").exists());

    let text = std::fs::read_to_string(tmp.path().join("logs").join(EVENT_FILE))?;
    let events: Vec<Event> = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    let images: Vec<(String, usize)> = events
        .iter()
        .filter_map(|e| match e {
            Event::Image { tag, step, .. } => Some((tag.clone(), *step)),
            _ => None,
        })
        .collect();
    assert_eq!(
        images,
        vec![
            ("original".to_string(), 0),
            ("reconstruction".to_string(), 2),
            ("reconstruction".to_string(), 4)
        ]
    );

    let nscalars = events
        .iter()
        .filter(|e| matches!(e, Event::Scalar { .. }))
        .count();
    let nhist = events
        .iter()
        .filter(|e| matches!(e, Event::Histogram { .. }))
        .count();
    assert_eq!(nscalars, 6 * 4);
    assert_eq!(nhist, 6 * 2);
    Ok(())
}
