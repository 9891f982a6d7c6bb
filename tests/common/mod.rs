#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use camseg::buffers::{BufferId, DeviceAllocator, DeviceImage};
use camseg::types::{FrameBuffer, PixelFormat};
use camseg::video::{VideoSink, VideoSource};
use camseg::{Error, Result};

/// Shared record of every alloc/release, visible after the allocator is moved away.
#[derive(Debug, Default)]
pub struct AllocLog {
    pub calls: usize,
    pub allocated: Vec<(BufferId, usize, usize, PixelFormat)>,
    pub released: Vec<BufferId>,
    /// 1-based allocation call that fails.
    pub fail_on: Option<usize>,
}

impl AllocLog {
    pub fn live(&self) -> Vec<BufferId> {
        let gone: HashSet<_> = self.released.iter().copied().collect();
        self.allocated.iter().map(|a| a.0).filter(|id| !gone.contains(id)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackingAllocator {
    pub log: Rc<RefCell<AllocLog>>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        let a = Self::default();
        a.log.borrow_mut().fail_on = Some(call);
        a
    }
}

impl DeviceAllocator for TrackingAllocator {
    fn alloc(&mut self, width: usize, height: usize, format: PixelFormat) -> Result<DeviceImage> {
        let mut log = self.log.borrow_mut();
        log.calls += 1;
        if log.fail_on == Some(log.calls) {
            return Err(Error::Allocation { width, height, format, reason: "injected failure".into() });
        }
        let id = BufferId(log.calls as u64);
        log.allocated.push((id, width, height, format));
        Ok(DeviceImage::new(id, FrameBuffer::new(width, height, format)))
    }

    fn release(&mut self, image: DeviceImage) {
        self.log.borrow_mut().released.push(image.id());
    }
}

pub fn solid(width: usize, height: usize, px: u32) -> FrameBuffer {
    let mut f = FrameBuffer::new(width, height, PixelFormat::Rgb8);
    f.fill(px);
    f
}

/// Plays a fixed list of frames, then reports exhaustion.
pub struct ScriptedSource {
    pub frames: VecDeque<FrameBuffer>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<FrameBuffer>) -> Self {
        Self { frames: frames.into() }
    }
}

impl VideoSource for ScriptedSource {
    fn capture(&mut self) -> Result<Option<FrameBuffer>> {
        Ok(self.frames.pop_front())
    }
}

/// Keeps every rendered frame; optionally stops streaming after `limit` frames.
#[derive(Default)]
pub struct RecordingSink {
    pub rendered: Vec<FrameBuffer>,
    pub statuses: Vec<String>,
    pub limit: Option<usize>,
}

impl VideoSink for RecordingSink {
    fn is_streaming(&self) -> bool {
        self.limit.map_or(true, |n| self.rendered.len() < n)
    }

    fn render(&mut self, frame: &FrameBuffer) -> Result<()> {
        self.rendered.push(frame.clone());
        Ok(())
    }

    fn set_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }
}
