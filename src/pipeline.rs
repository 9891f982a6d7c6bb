// The driving loop: capture → infer → composite → render → status.
//
// `Session` owns the network and (for segmentation) the buffer manager for
// the whole run. Each iteration runs strictly in sequence and any error ends
// the run before the current frame is rendered.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::buffers::{BufferOptions, DeviceAllocator, HostAllocator, SegmentationBuffers};
use crate::config::{Config, ModeConfig, SegmentConfig};
use crate::error::Result;
use crate::net::{self, DetectionNet, FilterMode, SegmentationNet};
use crate::types::FrameBuffer;
use crate::video::{VideoSink, VideoSource};

enum Mode {
    Detect {
        net: Box<dyn DetectionNet>,
    },
    Segment {
        net: Box<dyn SegmentationNet>,
        buffers: SegmentationBuffers<Box<dyn DeviceAllocator>>,
        filter_mode: FilterMode,
        ignore_class: String,
    },
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub frames: u64,
    /// Times the segmentation buffers were (re)allocated.
    pub allocations: usize,
}

pub struct Session {
    network: String,
    mode: Mode,
    status_interval: Duration,
}

impl Session {
    /// Load the configured network; segmentation buffers live in host memory.
    pub fn new(config: &Config) -> Result<Self> {
        let session = match &config.mode {
            ModeConfig::Detect { network, threshold } => {
                Self::detect(network, net::load_detection(network, *threshold)?)
            }
            ModeConfig::Segment(seg) => Self::segment(
                seg,
                net::load_segmentation(&seg.network)?,
                Box::new(HostAllocator::new()),
            ),
        };
        Ok(session.with_status_interval(config.status_interval))
    }

    pub fn detect(network: &str, net: Box<dyn DetectionNet>) -> Self {
        info!("detection network: {network}");
        Self {
            network: network.to_string(),
            mode: Mode::Detect { net },
            status_interval: Duration::from_secs(30),
        }
    }

    pub fn segment(
        config: &SegmentConfig,
        mut net: Box<dyn SegmentationNet>,
        allocator: Box<dyn DeviceAllocator>,
    ) -> Self {
        net.set_overlay_alpha(config.alpha);
        let mut options = BufferOptions::new(config.visualize).mask_downsample(config.mask_downsample);
        if config.stats {
            let (gw, gh) = net.grid_size();
            options = options.stats(gw, gh);
        }
        info!(
            "segmentation network: {} (visualize={}, filter={}, ignore={})",
            config.network, config.visualize, config.filter_mode, config.ignore_class
        );
        Self {
            network: config.network.clone(),
            mode: Mode::Segment {
                net,
                buffers: SegmentationBuffers::new(allocator, options),
                filter_mode: config.filter_mode,
                ignore_class: config.ignore_class.clone(),
            },
            status_interval: Duration::from_secs(30),
        }
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn network_fps(&self) -> f32 {
        match &self.mode {
            Mode::Detect { net } => net.network_fps(),
            Mode::Segment { net, .. } => net.network_fps(),
        }
    }

    /// Run inference on `frame` and return the frame to display.
    pub fn process_frame<'a>(&'a mut self, frame: &'a mut FrameBuffer) -> Result<&'a FrameBuffer> {
        match &mut self.mode {
            Mode::Detect { net } => {
                let detections = net.detect(frame)?;
                for d in &detections {
                    debug!(
                        "{} {:.2} at ({:.0},{:.0})-({:.0},{:.0})",
                        net.class_name(d.class_id),
                        d.confidence,
                        d.left,
                        d.top,
                        d.right,
                        d.bottom
                    );
                }
                Ok(frame)
            }
            Mode::Segment { net, buffers, filter_mode, ignore_class } => {
                buffers.alloc(frame.geometry())?;
                net.process(frame, ignore_class)?;

                let outputs = buffers.outputs();
                if outputs.overlay() {
                    net.overlay(buffers.overlay_mut()?, *filter_mode)?;
                }
                if outputs.mask() {
                    net.mask(buffers.mask_mut()?, *filter_mode)?;
                }
                buffers.composite()?;
                buffers.output(frame)
            }
        }
    }

    fn log_stats(&mut self) -> Result<()> {
        if let Mode::Segment { net, buffers, .. } = &mut self.mode {
            if let Some(stats) = buffers.compute_stats(&**net)? {
                for line in stats.to_string().lines() {
                    info!("{line}");
                }
            }
        }
        Ok(())
    }

    fn allocations(&self) -> usize {
        match &self.mode {
            Mode::Segment { buffers, .. } => buffers.allocations(),
            Mode::Detect { .. } => 0,
        }
    }

    /// Loop until the sink stops streaming or the source runs dry.
    pub fn run(&mut self, source: &mut dyn VideoSource, sink: &mut dyn VideoSink) -> Result<RunSummary> {
        let mut uptime = UptimeReporter::new(Instant::now(), self.status_interval);
        let mut frames = 0u64;

        while sink.is_streaming() {
            let Some(mut frame) = source.capture()? else {
                info!("video source exhausted");
                break;
            };

            let out = self.process_frame(&mut frame)?;
            sink.render(out)?;
            self.log_stats()?;

            let fps = self.network_fps();
            sink.set_status(&format!("{} | {:.0} FPS", self.network, fps));
            if let Some(msg) = uptime.tick(Instant::now(), fps) {
                info!("{msg}");
            }
            frames += 1;
        }

        Ok(RunSummary { frames, allocations: self.allocations() })
    }
}

/// Periodic "still alive" line. Checked every `every` frames; fires when more
/// than `interval` has passed since the last report.
#[derive(Debug, Clone)]
pub struct UptimeReporter {
    start: Instant,
    checkpoint: Instant,
    interval: Duration,
    every: u64,
    counter: u64,
}

impl UptimeReporter {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self { start: now, checkpoint: now, interval, every: 100, counter: 0 }
    }

    pub fn every(mut self, frames: u64) -> Self {
        self.every = frames.max(1);
        self
    }

    pub fn tick(&mut self, now: Instant, fps: f32) -> Option<String> {
        let check = self.counter % self.every == 0;
        self.counter += 1;
        if !check || now.duration_since(self.checkpoint) <= self.interval {
            return None;
        }
        self.checkpoint = now;
        self.counter = 1;
        Some(format!(
            "- running for: {}, Current FPS: {}",
            format_uptime(now.duration_since(self.start)),
            fps as i64
        ))
    }
}

/// `H hours M minutes`, `M minutes` or `S seconds`.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h} hours {m} minutes")
    } else if m > 0 {
        format!("{m} minutes")
    } else {
        format!("{s} seconds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(Duration::from_secs(42)), "42 seconds");
        assert_eq!(format_uptime(Duration::from_secs(125)), "2 minutes");
        assert_eq!(format_uptime(Duration::from_secs(3 * 3600 + 61)), "3 hours 1 minutes");
    }

    #[test]
    fn reporter_waits_for_interval_and_frame_cadence() {
        let t0 = Instant::now();
        let mut r = UptimeReporter::new(t0, Duration::from_secs(30)).every(10);

        // frame 0 is a check frame but the interval has not passed
        assert_eq!(r.tick(t0 + Duration::from_secs(1), 20.0), None);
        // frames 1..9 are never checked, even after the interval
        for _ in 1..10 {
            assert_eq!(r.tick(t0 + Duration::from_secs(40), 20.0), None);
        }
        // frame 10 is checked
        let msg = r.tick(t0 + Duration::from_secs(40), 20.7).unwrap();
        assert_eq!(msg, "- running for: 40 seconds, Current FPS: 20");

        // the checkpoint moved: nothing until another interval has passed
        for _ in 0..20 {
            assert_eq!(r.tick(t0 + Duration::from_secs(60), 20.0), None);
        }
    }

    #[test]
    fn reporter_counts_from_run_start() {
        let t0 = Instant::now();
        let mut r = UptimeReporter::new(t0, Duration::from_secs(30)).every(1);
        assert!(r.tick(t0 + Duration::from_secs(31), 1.0).is_some());
        let msg = r.tick(t0 + Duration::from_secs(62 + 60), 1.0).unwrap();
        assert!(msg.contains("2 minutes"), "{msg}");
    }
}
