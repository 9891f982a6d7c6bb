// Luminance-band segmenter: a stand-in network that classifies every grid
// cell by its mean brightness. Cheap, deterministic and good enough to drive
// the overlay/mask/composite path with real camera frames.

use std::time::Instant;

use log::debug;

use super::{cell_mean_luma, FilterMode, FpsMeter, SegmentationNet};
use crate::compose::blend_linear;
use crate::error::{Error, Result};
use crate::gamma::GammaLut;
use crate::types::{pack_rgb, unpack_rgb, FrameBuffer, PixelFormat};

pub const CLASSES: [&str; 4] = ["void", "dark", "mid", "bright"];

// class colours, 0x00RRGGBB
const PALETTE: [u32; 4] = [0x0000_0000, 0x0030_50C8, 0x0030_C850, 0x00F0_C030];

// upper luma bound (exclusive) of each class but the last
const BANDS: [f32; 3] = [16.0, 85.0, 170.0];

pub struct LumaSegNet {
    grid_w: usize,
    grid_h: usize,
    classes: Vec<u8>,      // class id per grid cell, row-major
    means: Vec<f32>,       // scratch: mean luma per cell
    ignore: Option<u8>,
    frame: FrameBuffer,    // copy of the last processed frame (overlay base)
    alpha: f32,            // 0..=255
    lut: GammaLut,
    fps: FpsMeter,
}

impl LumaSegNet {
    pub fn new(grid_w: usize, grid_h: usize) -> Self {
        Self {
            grid_w: grid_w.max(1),
            grid_h: grid_h.max(1),
            classes: Vec::new(),
            means: Vec::new(),
            ignore: None,
            frame: FrameBuffer::new(0, 0, PixelFormat::Rgb8),
            alpha: 100.0,
            lut: GammaLut::new(),
            fps: FpsMeter::new(),
        }
    }

    fn classify(mean: f32) -> u8 {
        BANDS.iter().position(|&b| mean < b).unwrap_or(BANDS.len()) as u8
    }

    /// Class ids of the last processed frame.
    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn ensure_processed(&self, what: &str) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::InvalidState(format!("{what} requested before process")));
        }
        Ok(())
    }

    fn cell_colour(&self, cx: usize, cy: usize) -> Option<u32> {
        let class = self.classes[cy * self.grid_w + cx];
        if Some(class) == self.ignore {
            None
        } else {
            Some(PALETTE[class as usize])
        }
    }

    /// Colour of the class field at the centre of dst pixel (x, y), plus how much
    /// of it is covered by non-ignored classes (0..=1).
    fn sample(&self, x: usize, y: usize, dw: usize, dh: usize, filter: FilterMode) -> (u32, f32) {
        let (gw, gh) = (self.grid_w, self.grid_h);
        match filter {
            FilterMode::Point => {
                let cx = (x * gw / dw).min(gw - 1);
                let cy = (y * gh / dh).min(gh - 1);
                match self.cell_colour(cx, cy) {
                    Some(c) => (c, 1.0),
                    None => (0, 0.0),
                }
            }
            FilterMode::Linear => {
                let gx = ((x as f32 + 0.5) * gw as f32 / dw as f32 - 0.5).clamp(0.0, (gw - 1) as f32);
                let gy = ((y as f32 + 0.5) * gh as f32 / dh as f32 - 0.5).clamp(0.0, (gh - 1) as f32);
                let (x0, y0) = (gx.floor() as usize, gy.floor() as usize);
                let (x1, y1) = ((x0 + 1).min(gw - 1), (y0 + 1).min(gh - 1));
                let (fx, fy) = (gx - x0 as f32, gy - y0 as f32);

                let taps = [
                    (x0, y0, (1.0 - fx) * (1.0 - fy)),
                    (x1, y0, fx * (1.0 - fy)),
                    (x0, y1, (1.0 - fx) * fy),
                    (x1, y1, fx * fy),
                ];
                let (mut r, mut g, mut b, mut cover) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
                for (cx, cy, w) in taps {
                    if let Some(c) = self.cell_colour(cx, cy) {
                        let (cr, cg, cb) = unpack_rgb(c);
                        r += cr as f32 * w;
                        g += cg as f32 * w;
                        b += cb as f32 * w;
                        cover += w;
                    }
                }
                if cover <= 0.0 {
                    return (0, 0.0);
                }
                let q = |v: f32| (v / cover).round().clamp(0.0, 255.0) as u8;
                (pack_rgb(q(r), q(g), q(b)), cover.min(1.0))
            }
        }
    }
}

fn check_target(dst: &FrameBuffer, what: &str) -> Result<()> {
    if dst.width == 0 || dst.height == 0 || dst.format == PixelFormat::Gray8 {
        return Err(Error::InvalidState(format!(
            "{what} target must be a non-empty colour image, got {}",
            dst.geometry()
        )));
    }
    Ok(())
}

#[inline]
fn opaque(px: u32, format: PixelFormat) -> u32 {
    if format == PixelFormat::Rgba8 { px | 0xFF00_0000 } else { px }
}

impl SegmentationNet for LumaSegNet {
    fn process(&mut self, frame: &FrameBuffer, ignore_class: &str) -> Result<()> {
        if frame.width == 0 || frame.height == 0 {
            return Err(Error::InvalidState("process: empty frame".into()));
        }
        let start = Instant::now();

        // keep our own copy for the overlay; reuse the allocation when the size holds
        if self.frame.geometry() == frame.geometry() {
            self.frame.pixels.copy_from_slice(&frame.pixels);
        } else {
            self.frame = frame.clone();
        }

        self.ignore = CLASSES.iter().position(|&c| c == ignore_class).map(|i| i as u8);
        if self.ignore.is_none() && !ignore_class.is_empty() {
            debug!("ignore class '{ignore_class}' is not a luma-bands class");
        }

        cell_mean_luma(frame, self.grid_w, self.grid_h, &mut self.means);
        self.classes.clear();
        self.classes.extend(self.means.iter().map(|&m| Self::classify(m)));

        self.fps.record(start.elapsed());
        Ok(())
    }

    fn overlay(&self, dst: &mut FrameBuffer, filter: FilterMode) -> Result<()> {
        self.ensure_processed("overlay")?;
        check_target(dst, "overlay")?;
        let (dw, dh) = (dst.width, dst.height);
        let (fw, fh) = (self.frame.width, self.frame.height);
        let strength = (self.alpha / 255.0).clamp(0.0, 1.0);

        for y in 0..dh {
            let sy = (y * fh / dh).min(fh - 1);
            for x in 0..dw {
                let sx = (x * fw / dw).min(fw - 1);
                let base = self.frame.get(sx, sy) & 0x00FF_FFFF;
                let (colour, cover) = self.sample(x, y, dw, dh, filter);
                let px = blend_linear(base, colour, cover * strength, &self.lut);
                dst.set(x, y, opaque(px, dst.format));
            }
        }
        Ok(())
    }

    fn mask(&self, dst: &mut FrameBuffer, filter: FilterMode) -> Result<()> {
        self.ensure_processed("mask")?;
        check_target(dst, "mask")?;
        let (dw, dh) = (dst.width, dst.height);

        for y in 0..dh {
            for x in 0..dw {
                let (colour, cover) = self.sample(x, y, dw, dh, filter);
                let (r, g, b) = unpack_rgb(colour);
                let s = |v: u8| (v as f32 * cover).round() as u8;
                dst.set(x, y, opaque(pack_rgb(s(r), s(g), s(b)), dst.format));
            }
        }
        Ok(())
    }

    fn class_mask(&self, dst: &mut FrameBuffer) -> Result<()> {
        self.ensure_processed("class mask")?;
        if dst.width == 0 || dst.height == 0 {
            return Err(Error::InvalidState("class mask: empty target".into()));
        }
        let (gw, gh) = (self.grid_w, self.grid_h);
        let (dw, dh) = (dst.width, dst.height);
        for y in 0..dh {
            let cy = (y * gh / dh).min(gh - 1);
            for x in 0..dw {
                let cx = (x * gw / dw).min(gw - 1);
                dst.set(x, y, self.classes[cy * gw + cx] as u32);
            }
        }
        Ok(())
    }

    fn grid_size(&self) -> (usize, usize) {
        (self.grid_w, self.grid_h)
    }

    fn num_classes(&self) -> usize {
        CLASSES.len()
    }

    fn class_name(&self, class_id: usize) -> &str {
        CLASSES.get(class_id).copied().unwrap_or("unknown")
    }

    fn set_overlay_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 255.0);
    }

    fn network_fps(&self) -> f32 {
        self.fps.fps()
    }
}
