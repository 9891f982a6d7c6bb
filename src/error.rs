// One error type for the whole crate.
// Every variant states *where* things went wrong; all of them are fatal for the run.
use crate::types::PixelFormat;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Device memory for a buffer could not be obtained (or the geometry is unusable).
    #[error("allocation error: {width}x{height} {format}: {reason}")]
    Allocation {
        width: usize,
        height: usize,
        format: PixelFormat,
        reason: String,
    },
    /// A buffer the caller relies on is missing or disabled. Programming defect.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Bad command-line value or unknown model identifier.
    #[error("config error: {0}")]
    Config(String),
    #[error("camera init error: {0}")]
    CameraInit(String),
    #[error("camera frame error: {0}")]
    CameraFrame(String),
    #[error("window init error: {0}")]
    WindowInit(String),
    #[error("window update error: {0}")]
    WindowUpdate(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
