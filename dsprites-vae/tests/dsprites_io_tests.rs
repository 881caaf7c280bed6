mod common;

use candle_core::{DType, Tensor};
use dsprites_vae::dsprites_io::*;
use std::io::Write;

/// `.npz` with `imgs.npy` stored deflate-compressed, as the released
/// dSprites archive is
fn write_deflated_npz(npz: &std::path::Path, imgs: &Tensor) -> anyhow::Result<()> {
    let npy = npz.with_extension("npy");
    imgs.write_npy(&npy)?;
    let bytes = std::fs::read(&npy)?;

    let mut archive = zip::ZipWriter::new(std::fs::File::create(npz)?);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    archive.start_file(format!("{}.npy", IMAGES_KEY), options)?;
    archive.write_all(&bytes)?;
    archive.finish()?;
    Ok(())
}

#[test]
fn deflated_npz_images_load_as_u8() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let npz = tmp.path().join("sprites.npz");
    let imgs = common::square_sprites(5, 10)?;
    write_deflated_npz(&npz, &imgs)?;

    let loaded = load_images(&npz)?;
    assert_eq!(loaded.dims(), &[5, 64, 64]);
    assert_eq!(loaded.dtype(), DType::U8);

    let diff = (loaded.to_dtype(DType::F32)? - imgs.to_dtype(DType::F32)?)?
        .abs()?
        .sum_all()?
        .to_scalar::<f32>()?;
    assert_eq!(diff, 0.);
    Ok(())
}

#[test]
fn cached_archive_is_returned_as_is() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let target = tmp.path().join(DSPRITES_FILE);
    std::fs::write(&target, b"cached")?;

    let found = ensure_downloaded(tmp.path())?;
    assert_eq!(found, target);
    assert_eq!(std::fs::read(&found)?, b"cached");
    assert_eq!(std::fs::read_dir(tmp.path())?.count(), 1);
    Ok(())
}
