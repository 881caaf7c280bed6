use candle_core::{DType, Tensor};
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DSPRITES_URL: &str = "https://github.com/deepmind/dsprites-dataset/raw/master/dsprites_ndarray_co1sh3sc6or40x32y32_64x64.npz";
pub const DSPRITES_FILE: &str = "dsprites_ndarray_co1sh3sc6or40x32y32_64x64.npz";

/// name of the image array in the `.npz` archive
pub const IMAGES_KEY: &str = "imgs";

/// Make sure `{root}/{DSPRITES_FILE}` exists, downloading it once
///
/// The download goes to a temporary file in `root` that is renamed
/// into place only after the whole body was written.
pub fn ensure_downloaded(root: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let target = root.join(DSPRITES_FILE);

    if target.exists() {
        info!("Found cached dSprites: {}", target.display());
        return Ok(target);
    }

    info!("Downloading dSprites from {}", DSPRITES_URL);
    let mut response = reqwest::blocking::get(DSPRITES_URL)?.error_for_status()?;

    let mut tmp = tempfile::NamedTempFile::new_in(root)?;
    let nbytes = response.copy_to(&mut tmp)?;
    tmp.flush()?;
    tmp.persist(&target).map_err(|e| e.error)?;

    info!("Saved {} bytes to {}", nbytes, target.display());
    Ok(target)
}

/// Read the `n x 64 x 64` image array as `u8`
pub fn load_images(npz_file: &Path) -> anyhow::Result<Tensor> {
    let mut arrays = Tensor::read_npz_by_name(npz_file, &[IMAGES_KEY])?;
    let images = arrays
        .pop()
        .ok_or_else(|| anyhow::anyhow!("no `{}` in {}", IMAGES_KEY, npz_file.display()))?;

    if images.rank() != 3 {
        return Err(anyhow::anyhow!(
            "`{}` should be n x h x w, got {:?}",
            IMAGES_KEY,
            images.dims()
        ));
    }

    let images = match images.dtype() {
        DType::U8 => images,
        _ => images.to_dtype(DType::F32)?.clamp(0f32, 1f32)?.to_dtype(DType::U8)?,
    };

    info!("Loaded {:?} images from {}", images.dims(), npz_file.display());
    Ok(images)
}
