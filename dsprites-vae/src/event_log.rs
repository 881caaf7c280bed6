use candle_core::{DType, Device, Tensor};
use image::GrayImage;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::image_grid::save_png;

pub const EVENT_FILE: &str = "events.jsonl";
pub const IMAGE_DIR: &str = "images";
pub const HISTOGRAM_BUCKETS: usize = 30;

/// One line of `events.jsonl`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Event {
    Scalar {
        tag: String,
        step: usize,
        value: f64,
    },
    Histogram {
        tag: String,
        step: usize,
        #[serde(flatten)]
        histogram: Histogram,
    },
    Image {
        tag: String,
        step: usize,
        /// relative to the log directory
        path: String,
        width: u32,
        height: u32,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub num: usize,
    pub sum: f64,
    pub sum_squares: f64,
    /// right edge of each bucket
    pub bucket_limits: Vec<f64>,
    pub bucket_counts: Vec<usize>,
}

impl Histogram {
    /// equal-width buckets between the minimum and maximum of `values`
    pub fn from_values(values: &[f32], nbuckets: usize) -> Self {
        let nbuckets = nbuckets.max(1);
        let (min, max, sum, sum_squares) = values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0., 0.),
            |(lo, hi, s, ss), &x| {
                let x = x as f64;
                (lo.min(x), hi.max(x), s + x, ss + x * x)
            },
        );

        if values.is_empty() {
            return Self {
                min: 0.,
                max: 0.,
                num: 0,
                sum: 0.,
                sum_squares: 0.,
                bucket_limits: vec![],
                bucket_counts: vec![],
            };
        }

        if max <= min {
            return Self {
                min,
                max,
                num: values.len(),
                sum,
                sum_squares,
                bucket_limits: vec![max],
                bucket_counts: vec![values.len()],
            };
        }

        let width = (max - min) / nbuckets as f64;
        let bucket_limits = (1..=nbuckets).map(|b| min + width * b as f64).collect();
        let mut bucket_counts = vec![0; nbuckets];
        for &x in values {
            let b = (((x as f64) - min) / width) as usize;
            bucket_counts[b.min(nbuckets - 1)] += 1;
        }

        Self {
            min,
            max,
            num: values.len(),
            sum,
            sum_squares,
            bucket_limits,
            bucket_counts,
        }
    }
}

/// Appends scalar, histogram and image events for a dashboard to
/// `{log_dir}/events.jsonl`; images go to `{log_dir}/images/`
pub struct EventWriter {
    log_dir: PathBuf,
    writer: BufWriter<File>,
}

impl EventWriter {
    pub fn new(log_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(EVENT_FILE))?;
        Ok(Self {
            log_dir: log_dir.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn write_event(&mut self, event: &Event) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> anyhow::Result<()> {
        self.write_event(&Event::Scalar {
            tag: tag.to_string(),
            step,
            value,
        })
    }

    pub fn add_histogram(&mut self, tag: &str, values: &Tensor, step: usize) -> anyhow::Result<()> {
        let values = values
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        self.write_event(&Event::Histogram {
            tag: tag.to_string(),
            step,
            histogram: Histogram::from_values(&values, HISTOGRAM_BUCKETS),
        })
    }

    /// Save `grid` as `images/{tag}_{step}.png` and log its location
    pub fn add_image(&mut self, tag: &str, grid: &GrayImage, step: usize) -> anyhow::Result<()> {
        let relative = Path::new(IMAGE_DIR).join(format!("{}_{}.png", tag.replace('/', "_"), step));
        save_png(grid, &self.log_dir.join(&relative))?;
        self.write_event(&Event::Image {
            tag: tag.to_string(),
            step,
            path: relative.to_string_lossy().into_owned(),
            width: grid.width(),
            height: grid.height(),
        })
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("failed to flush events in {}: {}", self.log_dir.display(), e);
        }
    }
}
