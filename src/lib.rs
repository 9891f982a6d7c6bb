// camseg: live object detection or semantic segmentation on a camera feed.
//
// Frames flow capture → network → buffers → display, one at a time:
//
// - `video`: sources (camera, still images) and sinks (window, PNG files)
// - `net`: the network traits plus two small built-in models
// - `buffers`: lazily allocated overlay / mask / composite buffers for
//   segmentation output, reallocated only when the frame geometry changes
// - `pipeline`: the session that owns everything and runs the loop

pub mod buffers;
pub mod camera;
pub mod compose;
pub mod config;
pub mod draw;
pub mod error;
pub mod gamma;
pub mod net;
pub mod pipeline;
pub mod types;
pub mod video;

pub use error::{Error, Result};
