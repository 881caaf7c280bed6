mod common;

use candle_core::{DType, Device, Tensor};
use candle_nn::{ParamsAdamW, VarBuilder, VarMap};
use dsprites_vae::candle_data_loader::{DataLoader, DspritesData};
use dsprites_vae::candle_vae::BetaVae;
use dsprites_vae::checkpoint::*;

fn fresh_vae() -> anyhow::Result<(VarMap, BetaVae)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let vae = BetaVae::new(10, vb)?;
    Ok((varmap, vae))
}

fn save(dir: &std::path::Path, varmap: &VarMap, steps: usize) -> anyhow::Result<std::path::PathBuf> {
    save_with_loss(dir, varmap, steps, 1.5)
}

fn save_with_loss(
    dir: &std::path::Path,
    varmap: &VarMap,
    steps: usize,
    loss: f32,
) -> anyhow::Result<std::path::PathBuf> {
    let optimizer = OptimizerState::new(&ParamsAdamW::default(), steps);
    save_checkpoint(dir, "beta-vae", steps, loss, optimizer, serde_json::json!({}), varmap)
}

#[test]
fn latest_checkpoint_is_by_steps_not_by_count() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (varmap, _vae) = fresh_vae()?;

    for steps in [200, 1000, 400] {
        save(tmp.path(), &varmap, steps)?;
    }

    let latest = latest_checkpoint(tmp.path())?;
    assert_eq!(latest, tmp.path().join("beta-vae_1000.ckpt"));
    assert_eq!(load_record(&latest)?.loss, Some(1.5));
    Ok(())
}

#[test]
fn diverged_loss_keeps_the_folder_loadable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (varmap, _vae) = fresh_vae()?;

    save_with_loss(tmp.path(), &varmap, 200, 10.0)?;
    save_with_loss(tmp.path(), &varmap, 400, f32::NAN)?;

    let latest = latest_checkpoint(tmp.path())?;
    assert_eq!(latest, tmp.path().join("beta-vae_400.ckpt"));
    let record = load_record(&latest)?;
    assert_eq!(record.steps, 400);
    assert_eq!(record.loss, None);
    assert_eq!(
        load_record(&tmp.path().join("beta-vae_200.ckpt"))?.loss,
        Some(10.0)
    );
    Ok(())
}

#[test]
fn unreadable_records_are_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (varmap, _vae) = fresh_vae()?;

    save(tmp.path(), &varmap, 200)?;
    std::fs::write(tmp.path().join("beta-vae_900.ckpt"), "{ \"steps\": ")?;

    let latest = latest_checkpoint(tmp.path())?;
    assert_eq!(latest, tmp.path().join("beta-vae_200.ckpt"));
    Ok(())
}

#[test]
fn empty_directory_has_no_checkpoint() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    assert!(latest_checkpoint(tmp.path()).is_err());
    Ok(())
}

#[test]
fn parameters_round_trip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (saved, _) = fresh_vae()?;
    let record_file = save(tmp.path(), &saved, 10)?;

    let (restored, _) = fresh_vae()?;
    let name = "encoder.mean.weight";
    assert_ne!(common::first_var(&saved, name)?, common::first_var(&restored, name)?);

    let record = restore_parameters(&restored, &record_file, &[])?;
    assert_eq!(record.steps, 10);
    assert_eq!(common::first_var(&saved, name)?, common::first_var(&restored, name)?);
    assert_eq!(
        common::first_var(&saved, "decoder.deconv.3.deconv.weight")?,
        common::first_var(&restored, "decoder.deconv.3.deconv.weight")?
    );
    Ok(())
}

#[test]
fn prefix_restore_leaves_other_variables_alone() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (saved, _) = fresh_vae()?;
    let record_file = save(tmp.path(), &saved, 3)?;

    let (restored, _) = fresh_vae()?;
    let decoder_before = common::first_var(&restored, "decoder.ffwd.0.fc.weight")?;

    restore_parameters(&restored, &record_file, &["encoder"])?;

    assert_eq!(
        common::first_var(&saved, "encoder.conv.0.conv.weight")?,
        common::first_var(&restored, "encoder.conv.0.conv.weight")?
    );
    assert_eq!(decoder_before, common::first_var(&restored, "decoder.ffwd.0.fc.weight")?);
    Ok(())
}

#[test]
fn restored_model_decodes_like_the_saved_one() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (saved_map, saved) = fresh_vae()?;
    let record_file = save(tmp.path(), &saved_map, 1)?;

    let (restored_map, restored) = fresh_vae()?;
    restore_parameters(&restored_map, &record_file, &[])?;

    let z = Tensor::randn(0f32, 1f32, (4, 10), &Device::Cpu)?;
    let diff = (saved.decode(&z)? - restored.decode(&z)?)?
        .abs()?
        .max_all()?
        .to_scalar::<f32>()?;
    assert!(diff < 1e-6);
    Ok(())
}

#[test]
fn npz_images_load_as_u8() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let npz = tmp.path().join("sprites.npz");
    let imgs = common::square_sprites(5, 10)?;
    Tensor::write_npz(&[("imgs", &imgs)], &npz)?;

    let mut data = DspritesData::from_npz(&npz, 0)?;
    assert_eq!(data.num_samples(), 5);
    data.shuffle_minibatch(5)?;
    let x = data.minibatch_data(0, &Device::Cpu)?.input;
    assert_eq!(x.dims(), &[5, 1, 64, 64]);
    assert_eq!(x.sum_all()?.to_scalar::<f32>()?, (5 * 10 * 10) as f32);
    Ok(())
}
