// Command-line flags and the validated run configuration.

use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::buffers::EnabledOutputs;
use crate::error::{Error, Result};
use crate::net::FilterMode;

/// Live object detection / semantic segmentation on a camera feed.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Detection network used when --segment is not given.
    #[arg(long, default_value = "motion")]
    pub network: String,
    /// Minimum detection confidence, 0..=1.
    #[arg(long, default_value_t = 0.6)]
    pub threshold: f32,
    /// Run semantic segmentation instead of detection.
    #[arg(long, action = ArgAction::SetTrue)]
    pub segment: bool,
    /// Segmentation network.
    #[arg(long, default_value = "luma-bands")]
    pub segment_network: String,
    /// Filtering used during visualization: 'point' or 'linear'.
    #[arg(long, default_value = "linear")]
    pub segment_filter_mode: String,
    /// Visualizations to show: 'overlay', 'mask' or 'overlay,mask'.
    #[arg(long, default_value = "overlay,mask")]
    pub segment_visualize: String,
    /// Class left out of the visualizations.
    #[arg(long, default_value = "void")]
    pub segment_ignore_class: String,
    /// Overlay alpha blending value, 0..=255.
    #[arg(long, default_value_t = 100.0)]
    pub segment_alpha: f32,
    /// Log per-class statistics of the segmentation grid every frame.
    #[arg(long, action = ArgAction::SetTrue)]
    pub segment_stats: bool,
    /// Shrink the mask by this factor when it is shown next to the overlay.
    #[arg(long, default_value_t = 1)]
    pub segment_mask_downsample: usize,
    /// Video source: /dev/videoN, cam://N, an image file or a directory of images.
    #[arg(long, default_value = "/dev/video0")]
    pub input: String,
    /// Video sink: display://0 or a directory to write PNG frames to.
    #[arg(long, default_value = "display://0")]
    pub output: String,
    /// Requested camera width.
    #[arg(long, default_value_t = 640)]
    pub width: u32,
    /// Requested camera height.
    #[arg(long, default_value_t = 480)]
    pub height: u32,
    /// Minimum seconds between uptime reports.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    pub network: String,
    pub filter_mode: FilterMode,
    pub visualize: EnabledOutputs,
    pub ignore_class: String,
    pub alpha: f32,
    pub stats: bool,
    pub mask_downsample: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            network: "luma-bands".into(),
            filter_mode: FilterMode::Linear,
            visualize: EnabledOutputs::BOTH,
            ignore_class: "void".into(),
            alpha: 100.0,
            stats: false,
            mask_downsample: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModeConfig {
    Detect { network: String, threshold: f32 },
    Segment(SegmentConfig),
}

impl ModeConfig {
    pub fn network(&self) -> &str {
        match self {
            ModeConfig::Detect { network, .. } => network,
            ModeConfig::Segment(s) => &s.network,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mode: ModeConfig,
    pub input: String,
    pub output: String,
    pub width: u32,
    pub height: u32,
    pub status_interval: Duration,
}

impl Args {
    /// Validate the raw flags.
    pub fn into_config(self) -> Result<Config> {
        let mode = if self.segment {
            if !(0.0..=255.0).contains(&self.segment_alpha) {
                return Err(Error::Config(format!(
                    "--segment-alpha must be within 0..=255, got {}",
                    self.segment_alpha
                )));
            }
            if self.segment_mask_downsample == 0 {
                return Err(Error::Config("--segment-mask-downsample must be at least 1".into()));
            }
            ModeConfig::Segment(SegmentConfig {
                network: self.segment_network,
                filter_mode: self.segment_filter_mode.parse()?,
                visualize: self.segment_visualize.parse()?,
                ignore_class: self.segment_ignore_class,
                alpha: self.segment_alpha,
                stats: self.segment_stats,
                mask_downsample: self.segment_mask_downsample,
            })
        } else {
            if !(0.0..=1.0).contains(&self.threshold) {
                return Err(Error::Config(format!(
                    "--threshold must be within 0..=1, got {}",
                    self.threshold
                )));
            }
            ModeConfig::Detect { network: self.network, threshold: self.threshold }
        };

        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "camera resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        Ok(Config {
            mode,
            input: self.input,
            output: self.output,
            width: self.width,
            height: self.height,
            status_interval: Duration::from_secs(self.status_interval_secs),
        })
    }
}
