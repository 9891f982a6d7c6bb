// Frame-difference detector: a stand-in network that boxes the regions of the
// picture whose brightness changed since the previous frame.

use std::time::Instant;

use super::{cell_mean_luma, Detection, DetectionNet, FpsMeter};
use crate::draw::draw_rect;
use crate::error::{Error, Result};
use crate::types::FrameBuffer;

pub const CLASSES: [&str; 1] = ["motion"];

// mean luma change (0..255) that counts as full confidence
const FULL_SCALE: f32 = 32.0;
const BOX_COLOUR: u32 = 0x0000_FF66;
const BOX_THICKNESS: i32 = 2;

pub struct MotionDetectNet {
    grid_w: usize,
    grid_h: usize,
    threshold: f32,
    prev: Vec<f32>,     // cell means of the previous frame
    means: Vec<f32>,    // scratch for the current frame
    scores: Vec<f32>,
    fps: FpsMeter,
}

impl MotionDetectNet {
    pub fn new(grid_w: usize, grid_h: usize, threshold: f32) -> Self {
        Self {
            grid_w: grid_w.max(1),
            grid_h: grid_h.max(1),
            threshold,
            prev: Vec::new(),
            means: Vec::new(),
            scores: Vec::new(),
            fps: FpsMeter::new(),
        }
    }

    /// Group active cells into 4-connected components, one detection each.
    fn components(&self, frame_w: usize, frame_h: usize) -> Vec<Detection> {
        let (gw, gh) = (self.grid_w, self.grid_h);
        let active = |i: usize| self.scores[i] >= self.threshold;
        let mut seen = vec![false; gw * gh];
        let mut stack = Vec::new();
        let mut out = Vec::new();

        for start in 0..gw * gh {
            if seen[start] || !active(start) {
                continue;
            }
            seen[start] = true;
            stack.push(start);
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (gw, gh, 0, 0);
            let mut confidence = 0.0f32;

            while let Some(i) = stack.pop() {
                let (cx, cy) = (i % gw, i / gw);
                min_x = min_x.min(cx);
                min_y = min_y.min(cy);
                max_x = max_x.max(cx);
                max_y = max_y.max(cy);
                confidence = confidence.max(self.scores[i]);

                let mut visit = |n: usize| {
                    if !seen[n] && active(n) {
                        seen[n] = true;
                        stack.push(n);
                    }
                };
                if cx > 0 { visit(i - 1); }
                if cx + 1 < gw { visit(i + 1); }
                if cy > 0 { visit(i - gw); }
                if cy + 1 < gh { visit(i + gw); }
            }

            out.push(Detection {
                class_id: 0,
                confidence,
                left: (min_x * frame_w / gw) as f32,
                top: (min_y * frame_h / gh) as f32,
                right: ((max_x + 1) * frame_w / gw) as f32,
                bottom: ((max_y + 1) * frame_h / gh) as f32,
            });
        }
        out
    }
}

impl DetectionNet for MotionDetectNet {
    fn detect(&mut self, frame: &mut FrameBuffer) -> Result<Vec<Detection>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(Error::InvalidState("detect: empty frame".into()));
        }
        let start = Instant::now();

        cell_mean_luma(frame, self.grid_w, self.grid_h, &mut self.means);
        if self.prev.len() != self.means.len() {
            // first frame: nothing to compare against yet
            std::mem::swap(&mut self.prev, &mut self.means);
            self.fps.record(start.elapsed());
            return Ok(Vec::new());
        }

        self.scores.clear();
        self.scores.extend(
            self.means
                .iter()
                .zip(&self.prev)
                .map(|(now, before)| ((now - before).abs() / FULL_SCALE).min(1.0)),
        );
        let detections = self.components(frame.width, frame.height);
        std::mem::swap(&mut self.prev, &mut self.means);
        self.fps.record(start.elapsed());

        for d in &detections {
            draw_rect(
                frame,
                d.left as i32,
                d.top as i32,
                d.right as i32 - 1,
                d.bottom as i32 - 1,
                BOX_THICKNESS,
                BOX_COLOUR,
            );
        }
        Ok(detections)
    }

    fn class_name(&self, class_id: usize) -> &str {
        CLASSES.get(class_id).copied().unwrap_or("unknown")
    }

    fn network_fps(&self) -> f32 {
        self.fps.fps()
    }
}
