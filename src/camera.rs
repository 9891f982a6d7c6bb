// Opens a camera and converts its frames into packed RGB frame buffers.

use log::info;

use crate::error::{Error, Result};
use crate::types::FrameBuffer;
use crate::video::{rgb_bytes_to_frame, VideoSource};

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};

// A small wrapper around nokhwa::Camera so the pipeline only sees `VideoSource`.
pub struct CameraCapture {
    cam: Camera,
}

impl CameraCapture {
    /// Open camera `index` near the requested resolution (the driver may pick another).
    pub fn new(index: u32, width: u32, height: u32) -> Result<Self> {
        let idx = CameraIndex::Index(index);

        let fmt = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            30,                // target FPS
        );

        // Ask for RGB frames, taking the closest format the device offers.
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        let mut cam = Camera::new(idx, req)
            .map_err(|e| Error::CameraInit(format!("Create camera {index}: {e}")))?;

        cam.open_stream()
            .map_err(|e| Error::CameraInit(format!("Open stream: {e}")))?;

        // The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();
        info!(
            "camera {index} streaming at {}x{} (requested {width}x{height})",
            actual.width(),
            actual.height()
        );

        Ok(Self { cam })
    }
}

impl VideoSource for CameraCapture {
    /// Blocks until the next frame is ready. A live camera never runs out.
    fn capture(&mut self) -> Result<Option<FrameBuffer>> {
        let frame = self
            .cam
            .frame()
            .map_err(|e| Error::CameraFrame(format!("Fetch frame: {e}")))?;

        // Decode to an ImageBuffer<Rgb<u8>, Vec<u8>> (handles the raw formats safely).
        let rgb_img = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::CameraFrame(format!("Decode RGB: {e}")))?;

        let (w, h) = rgb_img.dimensions();
        Ok(Some(rgb_bytes_to_frame(w as usize, h as usize, rgb_img.as_raw())?))
    }
}
