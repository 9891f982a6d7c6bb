// Image compositing primitives used to assemble the displayed frame.
use crate::error::{Error, Result};
use crate::gamma::GammaLut;
use crate::types::{pack_rgb, unpack_rgb, FrameBuffer};

/// Copy `src` into `dst` with its top-left corner at (`x`, `y`).
/// Rows and columns that fall outside `dst` are clipped.
pub fn overlay_image_onto(src: &FrameBuffer, dst: &mut FrameBuffer, x: usize, y: usize) -> Result<()> {
    if src.format != dst.format {
        return Err(Error::InvalidState(format!(
            "overlay: format mismatch src {} vs dst {}",
            src.format, dst.format
        )));
    }
    if x >= dst.width || y >= dst.height {
        return Ok(()); // nothing visible
    }

    let cols = src.width.min(dst.width - x);
    let rows = src.height.min(dst.height - y);
    for row in 0..rows {
        let s = row * src.width;
        let d = (y + row) * dst.width + x;
        dst.pixels[d..d + cols].copy_from_slice(&src.pixels[s..s + cols]);
    }
    Ok(())
}

/// Mix two packed pixels in linear light: `a` = 0 keeps `base`, `a` = 1 gives `top`.
#[inline]
pub fn blend_linear(base: u32, top: u32, a: f32, lut: &GammaLut) -> u32 {
    if a <= 0.0 { return base; }
    if a >= 1.0 { return top & 0x00FF_FFFF; }

    let (rb, gb, bb) = unpack_rgb(base);
    let (rt, gt, bt) = unpack_rgb(top);
    let inv = 1.0 - a;
    let mix = |b: u8, t: u8| {
        lut.linear_to_srgb_u8(a * lut.srgb_u8_to_linear(t) + inv * lut.srgb_u8_to_linear(b))
    };
    pack_rgb(mix(rb, rt), mix(gb, gt), mix(bb, bt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    fn solid(w: usize, h: usize, px: u32) -> FrameBuffer {
        let mut fb = FrameBuffer::new(w, h, PixelFormat::Rgb8);
        fb.fill(px);
        fb
    }

    #[test]
    fn places_source_at_offset() {
        let src = solid(2, 2, 0x00AA_AAAA);
        let mut dst = solid(5, 3, 0);
        overlay_image_onto(&src, &mut dst, 3, 1).unwrap();

        assert_eq!(dst.get(2, 1), 0);
        assert_eq!(dst.get(3, 1), 0x00AA_AAAA);
        assert_eq!(dst.get(4, 2), 0x00AA_AAAA);
        assert_eq!(dst.get(3, 0), 0);
    }

    #[test]
    fn clips_at_the_edges() {
        let src = solid(4, 4, 0x0000_00FF);
        let mut dst = solid(3, 3, 0);
        overlay_image_onto(&src, &mut dst, 1, 1).unwrap();
        assert_eq!(dst.pixels.iter().filter(|&&p| p == 0x0000_00FF).count(), 4);

        // fully outside is a no-op
        let mut dst = solid(3, 3, 0);
        overlay_image_onto(&src, &mut dst, 3, 0).unwrap();
        assert!(dst.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn rejects_format_mismatch() {
        let src = FrameBuffer::new(1, 1, PixelFormat::Gray8);
        let mut dst = FrameBuffer::new(1, 1, PixelFormat::Rgb8);
        let err = overlay_image_onto(&src, &mut dst, 0, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn blend_extremes() {
        let lut = GammaLut::new();
        assert_eq!(blend_linear(0x0010_2030, 0x00FF_0000, 0.0, &lut), 0x0010_2030);
        assert_eq!(blend_linear(0x0010_2030, 0x00FF_0000, 1.0, &lut), 0x00FF_0000);
        let (r, g, b) = unpack_rgb(blend_linear(0, 0x00FF_FFFF, 0.5, &lut));
        assert!(r > 128 && r == g && g == b);
    }
}
