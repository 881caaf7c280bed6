use candle_core::{DType, Device, Tensor};
use image::{GrayImage, Luma};
use std::path::Path;

pub const DEFAULT_NROW: usize = 8;
pub const DEFAULT_PADDING: usize = 2;

/// Tile `n x 1 x h x w` images into one picture, normalizing each image
/// to [0, 1] by its own minimum and maximum
///
/// * `images_nchw` - single-channel images
/// * `nrow` - images per grid row
/// * `padding` - zero pixels around every cell
pub fn make_grid(images_nchw: &Tensor, nrow: usize, padding: usize) -> anyhow::Result<GrayImage> {
    let (n, c, h, w) = images_nchw.dims4()?;
    if c != 1 {
        anyhow::bail!("expected single-channel images, got {} channels", c);
    }
    if n == 0 || nrow == 0 {
        anyhow::bail!("empty grid: {} images, {} per row", n, nrow);
    }

    let pixels = images_nchw
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?;

    let ncols = nrow.min(n);
    let nrows = n.div_ceil(ncols);
    let cell_h = h + padding;
    let cell_w = w + padding;

    let mut grid = GrayImage::new((ncols * cell_w + padding) as u32, (nrows * cell_h + padding) as u32);

    for (k, img) in pixels.chunks(h * w).enumerate() {
        let (lo, hi) = img
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let scale = (hi - lo).max(1e-5);

        let x0 = (k % ncols) * cell_w + padding;
        let y0 = (k / ncols) * cell_h + padding;

        for i in 0..h {
            for j in 0..w {
                let v = ((img[i * w + j] - lo) / scale).clamp(0., 1.);
                let px = (v * 255. + 0.5) as u8;
                grid.put_pixel((x0 + j) as u32, (y0 + i) as u32, Luma([px]));
            }
        }
    }

    Ok(grid)
}

pub fn save_png(grid: &GrayImage, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    grid.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}
