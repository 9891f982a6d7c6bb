// Video source / sink abstraction and the URI-based factories.
//
// Sources: a live camera (`/dev/video0`, `v4l2:///dev/video0`, `cam://0`) or a
// still image / directory of images. Sinks: a window (`display://0`) or a
// directory that receives numbered PNG files.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info};

use crate::camera::CameraCapture;
use crate::draw::Drawer;
use crate::error::{Error, Result};
use crate::types::{pack_rgb, unpack_rgb, FrameBuffer, PixelFormat};

pub trait VideoSource {
    /// Next frame, blocking until one is available. `Ok(None)` once the source is exhausted.
    fn capture(&mut self) -> Result<Option<FrameBuffer>>;
}

pub trait VideoSink {
    /// False signals the driving loop to stop.
    fn is_streaming(&self) -> bool;

    fn render(&mut self, frame: &FrameBuffer) -> Result<()>;

    /// Best effort (e.g. a window title); never fails the run.
    fn set_status(&mut self, text: &str);
}

/* ------------------------------ conversions ------------------------------ */

/// Tightly packed RGB bytes to a `Rgb8` frame.
pub fn rgb_bytes_to_frame(width: usize, height: usize, bytes: &[u8]) -> Result<FrameBuffer> {
    if bytes.len() != width * height * 3 {
        return Err(Error::CameraFrame(format!(
            "expected {} RGB bytes for {width}x{height}, got {}",
            width * height * 3,
            bytes.len()
        )));
    }
    let pixels = bytes.chunks_exact(3).map(|p| pack_rgb(p[0], p[1], p[2])).collect();
    Ok(FrameBuffer { width, height, format: PixelFormat::Rgb8, pixels })
}

/// Frame to an `image` RGB buffer; gray frames are replicated across channels.
pub fn frame_to_rgb_image(frame: &FrameBuffer) -> RgbImage {
    RgbImage::from_fn(frame.width as u32, frame.height as u32, |x, y| {
        let px = frame.get(x as usize, y as usize);
        let (r, g, b) = match frame.format {
            PixelFormat::Gray8 => {
                let v = (px & 0xFF) as u8;
                (v, v, v)
            }
            _ => unpack_rgb(px),
        };
        image::Rgb([r, g, b])
    })
}

/* ------------------------------ still images ------------------------------ */

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "ppm"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Plays an image file, or every image of a directory in name order, once.
pub struct ImageSource {
    queue: VecDeque<PathBuf>,
}

impl ImageSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let p = entry?.path();
                if p.is_file() && is_image(&p) {
                    files.push(p);
                }
            }
            files.sort();
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            return Err(Error::Config(format!("input '{}' does not exist", path.display())));
        }

        if files.is_empty() {
            return Err(Error::Config(format!("no images found in '{}'", path.display())));
        }
        info!("image source: {} file(s) from {}", files.len(), path.display());
        Ok(Self { queue: files.into() })
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl VideoSource for ImageSource {
    fn capture(&mut self) -> Result<Option<FrameBuffer>> {
        let Some(path) = self.queue.pop_front() else {
            return Ok(None);
        };
        debug!("loading {}", path.display());
        let img = image::open(&path)?.to_rgb8();
        let (w, h) = img.dimensions();
        rgb_bytes_to_frame(w as usize, h as usize, img.as_raw()).map(Some)
    }
}

/// Writes every rendered frame as `frame_000000.png`, `frame_000001.png`, ...
pub struct ImageSink {
    dir: PathBuf,
    next_index: u64,
    status: String,
}

impl ImageSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("writing frames to {}", dir.display());
        Ok(Self { dir, next_index: 0, status: String::new() })
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

impl VideoSink for ImageSink {
    fn is_streaming(&self) -> bool {
        true
    }

    fn render(&mut self, frame: &FrameBuffer) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.next_index));
        frame_to_rgb_image(frame).save(&path)?;
        self.next_index += 1;
        Ok(())
    }

    fn set_status(&mut self, text: &str) {
        if self.status != text {
            debug!("status: {text}");
            self.status = text.to_string();
        }
    }
}

/* ------------------------------ URIs ------------------------------ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Camera(u32),
    Images(PathBuf),
}

impl SourceUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let device = uri.strip_prefix("v4l2://").unwrap_or(uri);
        if let Some(n) = device.strip_prefix("/dev/video") {
            return camera_index(uri, n).map(SourceUri::Camera);
        }
        if let Some(n) = uri.strip_prefix("cam://") {
            return camera_index(uri, n).map(SourceUri::Camera);
        }
        if uri.is_empty() {
            return Err(Error::Config("empty input URI".into()));
        }
        Ok(SourceUri::Images(PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))))
    }
}

fn camera_index(uri: &str, n: &str) -> Result<u32> {
    n.parse()
        .map_err(|_| Error::Config(format!("invalid camera in input URI '{uri}'")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkUri {
    Display(u32),
    Images(PathBuf),
}

impl SinkUri {
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(n) = uri.strip_prefix("display://") {
            let idx = n
                .parse()
                .map_err(|_| Error::Config(format!("invalid display in output URI '{uri}'")))?;
            return Ok(SinkUri::Display(idx));
        }
        if uri.is_empty() {
            return Err(Error::Config("empty output URI".into()));
        }
        Ok(SinkUri::Images(PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))))
    }
}

/// Open the source named by `uri`; `width`/`height` is the requested camera mode.
pub fn open_source(uri: &str, width: u32, height: u32) -> Result<Box<dyn VideoSource>> {
    match SourceUri::parse(uri)? {
        SourceUri::Camera(index) => Ok(Box::new(CameraCapture::new(index, width, height)?)),
        SourceUri::Images(path) => Ok(Box::new(ImageSource::open(path)?)),
    }
}

/// Open the sink named by `uri`; `title` is the initial window title.
pub fn open_sink(uri: &str, title: &str) -> Result<Box<dyn VideoSink>> {
    match SinkUri::parse(uri)? {
        SinkUri::Display(index) => {
            if index != 0 {
                debug!("display://{index}: windows always open on the primary display");
            }
            Ok(Box::new(Drawer::new(title)))
        }
        SinkUri::Images(dir) => Ok(Box::new(ImageSink::create(dir)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_uris() {
        assert_eq!(SourceUri::parse("/dev/video0").unwrap(), SourceUri::Camera(0));
        assert_eq!(SourceUri::parse("v4l2:///dev/video2").unwrap(), SourceUri::Camera(2));
        assert_eq!(SourceUri::parse("cam://1").unwrap(), SourceUri::Camera(1));
        assert_eq!(
            SourceUri::parse("file://frames").unwrap(),
            SourceUri::Images(PathBuf::from("frames"))
        );
        assert!(matches!(SourceUri::parse("/dev/videoX"), Err(Error::Config(_))));
        assert!(SourceUri::parse("").is_err());
    }

    #[test]
    fn sink_uris() {
        assert_eq!(SinkUri::parse("display://0").unwrap(), SinkUri::Display(0));
        assert_eq!(SinkUri::parse("out").unwrap(), SinkUri::Images(PathBuf::from("out")));
        assert!(SinkUri::parse("display://main").is_err());
    }

    #[test]
    fn rgb_bytes_pack_and_validate() {
        let f = rgb_bytes_to_frame(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(f.pixels, vec![0x0001_0203, 0x0004_0506]);
        assert!(rgb_bytes_to_frame(2, 2, &[0; 6]).is_err());
    }

    #[test]
    fn gray_frames_expand_to_rgb() {
        let mut f = FrameBuffer::new(1, 1, PixelFormat::Gray8);
        f.set(0, 0, 3);
        let img = frame_to_rgb_image(&f);
        assert_eq!(img.get_pixel(0, 0).0, [3, 3, 3]);
    }
}
