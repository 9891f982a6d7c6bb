// Window + software drawing utilities.
// 1) A window sink that shows whatever frame the pipeline renders.
// 2) Lines and rectangles, used to outline detections on the frame.

use log::debug;
use minifb::{Key, Window, WindowOptions};

use crate::error::{Error, Result};
use crate::types::{FrameBuffer, PixelFormat};
use crate::video::VideoSink;

/// On-screen display. The window opens on the first rendered frame, sized to it,
/// since the composite is wider than the camera image.
pub struct Drawer {
    title: String,
    window: Option<Window>,
    scratch: Vec<u32>, // gray frames expanded to 0x00RRGGBB
}

impl Drawer {
    pub fn new(title: &str) -> Self {
        Self { title: title.to_string(), window: None, scratch: Vec::new() }
    }
}

/// Open the window on first use, sized to the first frame.
fn open_window<'a>(slot: &'a mut Option<Window>, title: &str, width: usize, height: usize) -> Result<&'a mut Window> {
    if slot.is_none() {
        let opts = WindowOptions { resize: true, ..WindowOptions::default() };
        let window = Window::new(title, width, height, opts)
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        debug!("opened window '{title}' at {width}x{height}");
        *slot = Some(window);
    }
    slot.as_mut()
        .ok_or_else(|| Error::WindowInit("window missing after open".into()))
}

impl VideoSink for Drawer {
    /// False once the user closes the window or holds ESC.
    fn is_streaming(&self) -> bool {
        match &self.window {
            Some(w) => w.is_open() && !w.is_key_down(Key::Escape),
            None => true,
        }
    }

    fn render(&mut self, frame: &FrameBuffer) -> Result<()> {
        let buf: &[u32] = if frame.format == PixelFormat::Gray8 {
            self.scratch.clear();
            self.scratch.extend(frame.pixels.iter().map(|&v| {
                let g = v & 0xFF;
                (g << 16) | (g << 8) | g
            }));
            &self.scratch
        } else {
            &frame.pixels
        };

        let window = open_window(&mut self.window, &self.title, frame.width, frame.height)?;
        window
            .update_with_buffer(buf, frame.width, frame.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))
    }

    fn set_status(&mut self, text: &str) {
        if let Some(w) = self.window.as_mut() {
            w.set_title(text);
        }
    }
}

/* ---------- Software drawing: pixels, lines, rectangles ---------- */

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Draw a thin line between (x0,y0) and (x1,y1) using Bresenham.
pub fn draw_line(fb: &mut FrameBuffer, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    let (mut x0, mut y0, x1, y1) = (x0, y0, x1, y1);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(fb, x0, y0, color);
        if x0 == x1 && y0 == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x0 += sx; }
        if e2 <= dx { err += dx; y0 += sy; }
    }
}

/// Outline the inclusive box (left,top)-(right,bottom); extra thickness grows inward.
pub fn draw_rect(
    fb: &mut FrameBuffer,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: u32,
) {
    for t in 0..thickness.max(1) {
        let (l, tp, r, b) = (left + t, top + t, right - t, bottom - t);
        if l > r || tp > b { break; }
        draw_line(fb, l, tp, r, tp, color);
        draw_line(fb, l, b, r, b, color);
        draw_line(fb, l, tp, l, b, color);
        draw_line(fb, r, tp, r, b, color);
    }
}
