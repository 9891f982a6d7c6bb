// Network abstraction consumed by the driving loop.
//
// The loop only needs a handful of calls from a detection or segmentation
// network: run on a frame, render into a caller-owned buffer, and report a
// smoothed throughput figure. Models are looked up by identifier with
// `load_segmentation` / `load_detection`.

pub mod luma;
pub mod motion;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{luma, FrameBuffer};

pub use luma::LumaSegNet;
pub use motion::MotionDetectNet;

/// How the class grid is upscaled when it is rendered into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// nearest cell, blocky edges
    Point,
    /// bilinear blend of the four nearest cells
    #[default]
    Linear,
}

impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point" => Ok(FilterMode::Point),
            "linear" => Ok(FilterMode::Linear),
            other => Err(Error::Config(format!(
                "invalid filter mode '{other}' (valid: 'point' 'linear')"
            ))),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterMode::Point => "point",
            FilterMode::Linear => "linear",
        })
    }
}

/// One detected object, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Per-pixel classification network.
pub trait SegmentationNet {
    /// Classify `frame`. Cells of `ignore_class` are left out of the visualizations.
    fn process(&mut self, frame: &FrameBuffer, ignore_class: &str) -> Result<()>;

    /// Class colours blended over the last processed frame.
    fn overlay(&self, dst: &mut FrameBuffer, filter: FilterMode) -> Result<()>;

    /// Class colours alone.
    fn mask(&self, dst: &mut FrameBuffer, filter: FilterMode) -> Result<()>;

    /// Raw class ids, one per pixel of `dst` (normally the grid size).
    fn class_mask(&self, dst: &mut FrameBuffer) -> Result<()>;

    fn grid_size(&self) -> (usize, usize);

    fn num_classes(&self) -> usize;

    fn class_name(&self, class_id: usize) -> &str;

    /// Overlay opacity, 0..=255.
    fn set_overlay_alpha(&mut self, alpha: f32);

    fn network_fps(&self) -> f32;
}

/// Bounding-box detection network. `detect` also draws its boxes onto the frame.
pub trait DetectionNet {
    fn detect(&mut self, frame: &mut FrameBuffer) -> Result<Vec<Detection>>;

    fn class_name(&self, class_id: usize) -> &str;

    fn network_fps(&self) -> f32;
}

/// Exponentially smoothed inferences-per-second.
#[derive(Debug, Clone, Copy, Default)]
pub struct FpsMeter {
    fps: f32,
}

impl FpsMeter {
    const SMOOTHING: f32 = 0.1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the duration of one inference call.
    pub fn record(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f32();
        if secs <= 0.0 {
            return;
        }
        let instant = 1.0 / secs;
        self.fps = if self.fps == 0.0 {
            instant
        } else {
            self.fps * (1.0 - Self::SMOOTHING) + instant * Self::SMOOTHING
        };
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Mean luma of every cell of a `gw` x `gh` grid laid over `frame`, row-major.
/// Cells always cover at least one pixel, even when the grid is finer than the frame.
pub(crate) fn cell_mean_luma(frame: &FrameBuffer, gw: usize, gh: usize, out: &mut Vec<f32>) {
    out.clear();
    out.reserve(gw * gh);
    let (w, h) = (frame.width, frame.height);
    for cy in 0..gh {
        let y0 = (cy * h / gh).min(h - 1);
        let y1 = ((cy + 1) * h / gh).clamp(y0 + 1, h);
        for cx in 0..gw {
            let x0 = (cx * w / gw).min(w - 1);
            let x1 = ((cx + 1) * w / gw).clamp(x0 + 1, w);
            let mut sum = 0u64;
            for y in y0..y1 {
                let row = &frame.pixels[y * w + x0..y * w + x1];
                sum += row.iter().map(|&p| luma(p) as u64).sum::<u64>();
            }
            out.push(sum as f32 / ((y1 - y0) * (x1 - x0)) as f32);
        }
    }
}

/// Built-in segmentation models by identifier.
pub fn load_segmentation(model: &str) -> Result<Box<dyn SegmentationNet>> {
    match model {
        "luma-bands" => Ok(Box::new(LumaSegNet::new(64, 36))),
        other => Err(Error::Config(format!(
            "unknown segmentation network '{other}' (available: luma-bands)"
        ))),
    }
}

/// Built-in detection models by identifier.
pub fn load_detection(model: &str, threshold: f32) -> Result<Box<dyn DetectionNet>> {
    match model {
        "motion" => Ok(Box::new(MotionDetectNet::new(32, 24, threshold))),
        other => Err(Error::Config(format!(
            "unknown detection network '{other}' (available: motion)"
        ))),
    }
}
