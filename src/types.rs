// Core image types shared by the buffers, the networks and the video I/O.

use std::fmt;

/// Pixel layout of a frame. Colour formats are packed into one `u32` per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 0x00RRGGBB (what minifb displays)
    Rgb8,
    /// 0xAARRGGBB
    Rgba8,
    /// one value in the low byte, e.g. a class id
    Gray8,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Gray8 => "gray8",
        };
        f.write_str(name)
    }
}

/// Size and format of a frame; buffers are reallocated whenever this changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self { width, height, format }
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub width: usize,      // pixels per row
    pub height: usize,     // rows
    pub format: PixelFormat,
    pub pixels: Vec<u32>,  // row-major, length = width * height
}

impl FrameBuffer {
    /// A zeroed (black) frame.
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self { width, height, format, pixels: vec![0u32; width * height] }
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height, self.format)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, px: u32) {
        self.pixels[y * self.width + x] = px;
    }

    pub fn fill(&mut self, px: u32) {
        for p in &mut self.pixels { *p = px; }
    }
}

/// Pack 8-bit channels as 0x00RRGGBB.
#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Split 0x00RRGGBB into (r, g, b).
#[inline]
pub fn unpack_rgb(px: u32) -> (u8, u8, u8) {
    (((px >> 16) & 0xFF) as u8, ((px >> 8) & 0xFF) as u8, (px & 0xFF) as u8)
}

/// Rec. 601 luma of a packed pixel, 0..=255.
#[inline]
pub fn luma(px: u32) -> u8 {
    let (r, g, b) = unpack_rgb(px);
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}
