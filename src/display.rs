//! Output surfaces a playback session draws into.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fast_image_resize as fir;
use image::RgbaImage;
use tracing::debug;

use crate::config::DisplayConfig;
use crate::error::DreamError;

/// One decoded picture and how long it stays up during animated playback.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    pub delay: Duration,
}

impl Frame {
    pub fn still(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            delay: Duration::ZERO,
        }
    }
}

pub trait Surface: Send + Sync {
    fn present(&self, frame: &Frame) -> Result<(), DreamError>;
}

/// Headless surface; frames only show up in the log.
#[derive(Debug, Default)]
pub struct LogSurface;

impl Surface for LogSurface {
    fn present(&self, frame: &Frame) -> Result<(), DreamError> {
        debug!(
            width = frame.image.width(),
            height = frame.image.height(),
            delay_ms = frame.delay.as_millis() as u64,
            "present frame (headless)"
        );
        Ok(())
    }
}

/// Writes letterboxed BGRA frames straight into a Linux framebuffer device.
#[derive(Debug)]
pub struct FramebufferSurface {
    device: PathBuf,
    width: u32,
    height: u32,
}

impl FramebufferSurface {
    pub fn new(device: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            device: device.into(),
            width,
            height,
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl Surface for FramebufferSurface {
    fn present(&self, frame: &Frame) -> Result<(), DreamError> {
        let canvas = letterbox(&frame.image, self.width, self.height)
            .map_err(|err| DreamError::Surface(format!("{err:#}")))?;
        let bgra = to_bgra(&canvas);
        let mut fb = OpenOptions::new().write(true).open(&self.device)?;
        fb.write_all(&bgra)?;
        fb.flush()?;
        debug!(
            device = %self.device.display(),
            width = self.width,
            height = self.height,
            "frame written to framebuffer"
        );
        Ok(())
    }
}

/// Pick the surface the configuration asks for.
pub fn surface_from_config(cfg: &DisplayConfig) -> Arc<dyn Surface> {
    match &cfg.framebuffer {
        Some(device) => {
            let surface = FramebufferSurface::new(device, cfg.width, cfg.height);
            tracing::info!(device = %surface.device().display(), "drawing to framebuffer");
            Arc::new(surface)
        }
        None => {
            tracing::info!("no framebuffer configured; running headless");
            Arc::new(LogSurface)
        }
    }
}

/// Largest size that fits `src` inside `bounds` with its aspect ratio intact.
pub fn fit_within(src: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = src;
    let (bw, bh) = bounds;
    if sw == 0 || sh == 0 || bw == 0 || bh == 0 {
        return (0, 0);
    }
    let scale = f64::min(f64::from(bw) / f64::from(sw), f64::from(bh) / f64::from(sh));
    let w = (f64::from(sw) * scale).round().clamp(1.0, f64::from(bw)) as u32;
    let h = (f64::from(sh) * scale).round().clamp(1.0, f64::from(bh)) as u32;
    (w, h)
}

/// Scale `source` to fit the canvas and center it on black.
pub fn letterbox(source: &RgbaImage, width: u32, height: u32) -> anyhow::Result<RgbaImage> {
    let (fit_w, fit_h) = fit_within(source.dimensions(), (width, height));
    anyhow::ensure!(fit_w > 0 && fit_h > 0, "cannot fit an empty image");

    let scaled = if (fit_w, fit_h) == source.dimensions() {
        source.clone()
    } else {
        let src_view = fir::images::ImageRef::new(
            source.width(),
            source.height(),
            source.as_raw(),
            fir::PixelType::U8x4,
        )
        .context("failed to create source view for letterbox resize")?;
        let mut dst_image = fir::images::Image::new(fit_w, fit_h, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
        let mut resizer = fir::Resizer::new();
        resizer
            .resize(&src_view, &mut dst_image, Some(&options))
            .context("letterbox resize failed")?;
        RgbaImage::from_raw(fit_w, fit_h, dst_image.into_vec())
            .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))?
    };

    let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
    let x = i64::from((width - fit_w) / 2);
    let y = i64::from((height - fit_h) / 2);
    image::imageops::overlay(&mut canvas, &scaled, x, y);
    Ok(canvas)
}

fn to_bgra(image: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.as_raw().len());
    for px in image.as_raw().chunks_exact(4) {
        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
    }
    out
}
