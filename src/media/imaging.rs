use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage, imageops};
use thiserror::Error;

use super::ImageTransformer;
use crate::bundle::unique_path;
use crate::config::{FilterKind, ImageConfig};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot decode {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("cannot encode {}: {message}", .path.display())]
    Encode { path: PathBuf, message: String },

    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("image task aborted: {0}")]
    Aborted(String),
}

impl ImageError {
    /// Whether the failure means no later write can succeed either.
    pub fn is_systemic(&self) -> bool {
        matches!(self, ImageError::Io { source, .. } if crate::error::is_systemic(source))
    }
}

const BORDER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Filter, bottom crop and border, written out as JPEG.
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    filter: FilterKind,
    border_px: u32,
    keep_height_permille: u32,
}

impl ImagePipeline {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            filter: config.filter,
            border_px: config.border_px,
            keep_height_permille: config.keep_height_permille.clamp(1, 1000),
        }
    }

    fn process(&self, mut img: RgbImage) -> RgbImage {
        apply_filter(&mut img, self.filter);
        let cropped = crop_bottom(&img, self.keep_height_permille);
        add_border(&cropped, self.border_px, BORDER_COLOR)
    }
}

impl ImageTransformer for ImagePipeline {
    fn transform(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, ImageError> {
        let decoded = image::open(source).map_err(|e| ImageError::Decode {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        let processed = self.process(decoded.to_rgb8());

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let out = unique_path(&dest_dir.join(format!("{stem}.jpg")));

        write_jpeg(&processed, &out)?;

        tracing::debug!(source = %source.display(), output = %out.display(), "image processed");
        Ok(out)
    }
}

/// Encode to `path`, flushing explicitly so late write errors surface.
fn write_jpeg(img: &RgbImage, path: &Path) -> Result<(), ImageError> {
    let io_err = |source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    img.write_to(&mut writer, ImageFormat::Jpeg)
        .map_err(|e| match e {
            image::ImageError::IoError(source) => io_err(source),
            other => ImageError::Encode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;
    writer.flush().map_err(io_err)
}

pub fn apply_filter(img: &mut RgbImage, kind: FilterKind) {
    match kind {
        FilterKind::Natural => {
            for px in img.pixels_mut() {
                for c in px.0.iter_mut() {
                    *c = scale_channel(*c, 1.1, 0.0);
                }
                *px = boost_saturation(*px, 10.0 / 255.0);
            }
        }
        FilterKind::Warm => {
            for px in img.pixels_mut() {
                for c in px.0.iter_mut() {
                    *c = scale_channel(*c, 1.05, 10.0);
                }
                px.0[0] = px.0[0].saturating_add(5);
            }
        }
    }
}

/// `|v * alpha + beta|`, rounded and clamped to a byte.
fn scale_channel(value: u8, alpha: f32, beta: f32) -> u8 {
    (value as f32 * alpha + beta).abs().round().clamp(0.0, 255.0) as u8
}

/// Raise HSV saturation by `delta` (0..1 scale). Grey pixels stay grey.
fn boost_saturation(px: Rgb<u8>, delta: f32) -> Rgb<u8> {
    let [r, g, b] = px.0.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    if max == 0.0 || chroma == 0.0 {
        return px;
    }

    let hue = if max == r {
        60.0 * ((g - b) / chroma).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / chroma + 2.0)
    } else {
        60.0 * ((r - g) / chroma + 4.0)
    };
    let saturation = (chroma / max + delta).min(1.0);

    let c = max * saturation;
    let x = c * (1.0 - ((hue / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = max - c;
    let (r1, g1, b1) = match hue {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    Rgb([r1 + m, g1 + m, b1 + m].map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
}

/// Keep the top `keep_permille / 1000` of the rows.
pub fn crop_bottom(img: &RgbImage, keep_permille: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let keep = ((height as u64 * keep_permille as u64) / 1000).max(1) as u32;
    imageops::crop_imm(img, 0, 0, width, keep.min(height)).to_image()
}

pub fn add_border(img: &RgbImage, border: u32, color: Rgb<u8>) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut canvas = RgbImage::from_pixel(width + 2 * border, height + 2 * border, color);
    imageops::replace(&mut canvas, img, border as i64, border as i64);
    canvas
}
