// Device-resident buffers for segmentation visualization.
//
// `SegmentationBuffers` owns the `overlay`, `mask`, `composite` and (optional)
// `class_mask` images the segmentation network renders into. Buffers are
// allocated lazily on the first frame and reallocated only when the frame
// geometry changes, so the steady-state path never allocates.
//
// Which visualizations exist is decided once, at construction, by
// `EnabledOutputs`; every accessor checks membership in that set rather
// than whether a handle happens to be allocated.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use log::{debug, info, trace};

use crate::compose::overlay_image_onto;
use crate::error::{Error, Result};
use crate::net::SegmentationNet;
use crate::types::{FrameBuffer, FrameGeometry, PixelFormat};

/* ------------------------------ enabled outputs ------------------------------ */

/// Subset of {overlay, mask} chosen from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnabledOutputs {
    overlay: bool,
    mask: bool,
}

impl EnabledOutputs {
    pub const NONE: Self = Self { overlay: false, mask: false };
    pub const OVERLAY: Self = Self { overlay: true, mask: false };
    pub const MASK: Self = Self { overlay: false, mask: true };
    pub const BOTH: Self = Self { overlay: true, mask: true };

    pub fn overlay(&self) -> bool {
        self.overlay
    }

    pub fn mask(&self) -> bool {
        self.mask
    }

    /// Both outputs are shown side by side in a composite.
    pub fn composite(&self) -> bool {
        self.overlay && self.mask
    }
}

impl FromStr for EnabledOutputs {
    type Err = Error;

    /// Parses `"overlay"`, `"mask"`, `"overlay,mask"`; `""` or `"none"` is the empty set.
    fn from_str(s: &str) -> Result<Self> {
        let mut out = Self::NONE;
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "overlay" => out.overlay = true,
                "mask" => out.mask = true,
                "none" => {}
                other => {
                    return Err(Error::Config(format!(
                        "invalid visualize flag '{other}' (valid: 'overlay' 'mask' 'overlay,mask')"
                    )));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for EnabledOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.overlay, self.mask) {
            (true, true) => f.write_str("overlay,mask"),
            (true, false) => f.write_str("overlay"),
            (false, true) => f.write_str("mask"),
            (false, false) => f.write_str("none"),
        }
    }
}

/* ------------------------------ device memory ------------------------------ */

/// Identity of one allocation; never reused by an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// An image living in allocator-owned (device or mapped) memory.
#[derive(Debug)]
pub struct DeviceImage {
    id: BufferId,
    image: FrameBuffer,
}

impl DeviceImage {
    pub fn new(id: BufferId, image: FrameBuffer) -> Self {
        Self { id, image }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn image(&self) -> &FrameBuffer {
        &self.image
    }
}

impl Deref for DeviceImage {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.image
    }
}

impl DerefMut for DeviceImage {
    fn deref_mut(&mut self) -> &mut FrameBuffer {
        &mut self.image
    }
}

/// Source of device-resident image memory.
pub trait DeviceAllocator {
    /// Obtain a zeroed image. Fails with [`Error::Allocation`] when memory is unavailable.
    fn alloc(&mut self, width: usize, height: usize, format: PixelFormat) -> Result<DeviceImage>;

    /// Give an image back.
    fn release(&mut self, image: DeviceImage);
}

impl<T: DeviceAllocator + ?Sized> DeviceAllocator for Box<T> {
    fn alloc(&mut self, width: usize, height: usize, format: PixelFormat) -> Result<DeviceImage> {
        (**self).alloc(width, height, format)
    }

    fn release(&mut self, image: DeviceImage) {
        (**self).release(image)
    }
}

/// Host memory shared with the display path (the "mapped" allocation of a
/// unified-memory board). An optional byte budget stands in for device capacity.
#[derive(Debug, Default)]
pub struct HostAllocator {
    next_id: u64,
    live_bytes: usize,
    budget: Option<usize>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse allocations that would push live memory past `bytes`.
    pub fn with_budget(bytes: usize) -> Self {
        Self { budget: Some(bytes), ..Self::default() }
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }
}

fn image_bytes(width: usize, height: usize) -> Option<usize> {
    width.checked_mul(height)?.checked_mul(std::mem::size_of::<u32>())
}

impl DeviceAllocator for HostAllocator {
    fn alloc(&mut self, width: usize, height: usize, format: PixelFormat) -> Result<DeviceImage> {
        let fail = |reason: String| Error::Allocation { width, height, format, reason };

        if width == 0 || height == 0 {
            return Err(fail("zero-sized image".into()));
        }
        let bytes = image_bytes(width, height).ok_or_else(|| fail("size overflows".into()))?;
        if let Some(budget) = self.budget {
            if self.live_bytes + bytes > budget {
                return Err(fail(format!(
                    "out of memory: need {bytes} bytes, {} of {budget} in use",
                    self.live_bytes
                )));
            }
        }

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(width * height)
            .map_err(|e| fail(e.to_string()))?;
        pixels.resize(width * height, 0u32);

        self.next_id += 1;
        self.live_bytes += bytes;
        Ok(DeviceImage::new(
            BufferId(self.next_id),
            FrameBuffer { width, height, format, pixels },
        ))
    }

    fn release(&mut self, image: DeviceImage) {
        let bytes = image_bytes(image.width, image.height).unwrap_or(0);
        self.live_bytes = self.live_bytes.saturating_sub(bytes);
    }
}

/* ------------------------------ buffer manager ------------------------------ */

/// Construction parameters for [`SegmentationBuffers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    pub outputs: EnabledOutputs,
    /// Divides the mask's size when it shares the composite with the overlay.
    pub mask_downsample: usize,
    /// Allocate a class-id grid for per-class statistics.
    pub stats: bool,
    /// Class grid of the network (used only with `stats`).
    pub grid: (usize, usize),
}

impl BufferOptions {
    pub fn new(outputs: EnabledOutputs) -> Self {
        Self { outputs, mask_downsample: 1, stats: false, grid: (0, 0) }
    }

    pub fn mask_downsample(mut self, factor: usize) -> Self {
        self.mask_downsample = factor;
        self
    }

    pub fn stats(mut self, grid_width: usize, grid_height: usize) -> Self {
        self.stats = true;
        self.grid = (grid_width, grid_height);
        self
    }
}

#[derive(Debug, Default)]
struct BufferSet {
    overlay: Option<DeviceImage>,
    mask: Option<DeviceImage>,
    composite: Option<DeviceImage>,
    class_mask: Option<DeviceImage>,
}

impl BufferSet {
    fn is_empty(&self) -> bool {
        self.overlay.is_none() && self.mask.is_none() && self.composite.is_none() && self.class_mask.is_none()
    }

    fn release_into<A: DeviceAllocator + ?Sized>(&mut self, allocator: &mut A) {
        let held = [
            self.overlay.take(),
            self.mask.take(),
            self.composite.take(),
            self.class_mask.take(),
        ];
        for image in held.into_iter().flatten() {
            trace!("releasing buffer {:?} ({}x{})", image.id(), image.width, image.height);
            allocator.release(image);
        }
    }
}

/// Allocate every buffer implied by `options` into `set`. On error the
/// images already placed in `set` are left there for the caller to release.
fn allocate_set<A: DeviceAllocator + ?Sized>(
    allocator: &mut A,
    options: &BufferOptions,
    geometry: FrameGeometry,
    set: &mut BufferSet,
) -> Result<()> {
    let FrameGeometry { width, height, format } = geometry;
    let outputs = options.outputs;

    if outputs.overlay() {
        set.overlay = Some(allocator.alloc(width, height, format)?);
    }

    if outputs.mask() {
        // the mask only shrinks when it sits next to the overlay
        let ds = if outputs.composite() { options.mask_downsample } else { 1 };
        let (mw, mh) = if ds == 0 { (0, 0) } else { (width / ds, height / ds) };
        if mw == 0 || mh == 0 {
            return Err(Error::Allocation {
                width: mw,
                height: mh,
                format,
                reason: format!("mask downsample {ds} leaves no pixels of {width}x{height}"),
            });
        }
        set.mask = Some(allocator.alloc(mw, mh, format)?);
    }

    if let (Some(overlay), Some(mask)) = (&set.overlay, &set.mask) {
        let cw = overlay.width + mask.width;
        let ch = overlay.height.max(mask.height);
        set.composite = Some(allocator.alloc(cw, ch, format)?);
    }

    if options.stats {
        let (gw, gh) = options.grid;
        set.class_mask = Some(allocator.alloc(gw, gh, PixelFormat::Gray8)?);
    }
    Ok(())
}

/// Buffer lifecycle and compositing policy for segmentation output.
pub struct SegmentationBuffers<A: DeviceAllocator> {
    allocator: A,
    options: BufferOptions,
    geometry: Option<FrameGeometry>,
    set: BufferSet,
    allocations: usize,
}

impl<A: DeviceAllocator> SegmentationBuffers<A> {
    /// Nothing is allocated until the first [`alloc`](Self::alloc).
    pub fn new(allocator: A, options: BufferOptions) -> Self {
        debug!(
            "segmentation buffers: visualize={} mask_downsample={} stats={}",
            options.outputs, options.mask_downsample, options.stats
        );
        Self { allocator, options, geometry: None, set: BufferSet::default(), allocations: 0 }
    }

    pub fn outputs(&self) -> EnabledOutputs {
        self.options.outputs
    }

    /// Geometry of the current allocation, if any.
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    /// How many times [`alloc`](Self::alloc) actually allocated.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Make sure every enabled buffer matches `geometry`.
    ///
    /// Returns `Ok(true)` when buffers were (re)allocated and `Ok(false)` when the
    /// existing ones were kept or the configuration needs none. A zero-sized
    /// geometry is an allocation error. On failure nothing stays allocated: buffers from
    /// the previous geometry are already gone and any obtained during this call
    /// are released before the error is returned.
    pub fn alloc(&mut self, geometry: FrameGeometry) -> Result<bool> {
        let FrameGeometry { width, height, format } = geometry;
        if width == 0 || height == 0 {
            return Err(Error::Allocation { width, height, format, reason: "zero-sized frame".into() });
        }
        if self.geometry == Some(geometry) {
            trace!("reusing buffers for {geometry}");
            return Ok(false);
        }

        self.set.release_into(&mut self.allocator);
        self.geometry = None;

        let mut fresh = BufferSet::default();
        if let Err(e) = allocate_set(&mut self.allocator, &self.options, geometry, &mut fresh) {
            fresh.release_into(&mut self.allocator);
            return Err(e);
        }

        self.set = fresh;
        self.geometry = Some(geometry);
        if self.set.is_empty() {
            trace!("no segmentation buffers needed for {geometry}");
            return Ok(false);
        }
        self.allocations += 1;
        info!(
            "allocated segmentation buffers for {geometry} (visualize={}, composite={})",
            self.options.outputs,
            self.set
                .composite
                .as_ref()
                .map(|c| format!("{}x{}", c.width, c.height))
                .unwrap_or_else(|| "none".into()),
        );
        Ok(true)
    }

    pub fn overlay(&self) -> Option<&DeviceImage> {
        self.set.overlay.as_ref()
    }

    pub fn mask(&self) -> Option<&DeviceImage> {
        self.set.mask.as_ref()
    }

    pub fn composite_buffer(&self) -> Option<&DeviceImage> {
        self.set.composite.as_ref()
    }

    pub fn class_mask(&self) -> Option<&DeviceImage> {
        self.set.class_mask.as_ref()
    }

    /// Overlay target for the network. Disabled or unallocated is a contract violation.
    pub fn overlay_mut(&mut self) -> Result<&mut DeviceImage> {
        if !self.options.outputs.overlay() {
            return Err(Error::InvalidState("overlay output is not enabled".into()));
        }
        self.set
            .overlay
            .as_mut()
            .ok_or_else(|| Error::InvalidState("overlay buffer is not allocated".into()))
    }

    /// Mask target for the network. Disabled or unallocated is a contract violation.
    pub fn mask_mut(&mut self) -> Result<&mut DeviceImage> {
        if !self.options.outputs.mask() {
            return Err(Error::InvalidState("mask output is not enabled".into()));
        }
        self.set
            .mask
            .as_mut()
            .ok_or_else(|| Error::InvalidState("mask buffer is not allocated".into()))
    }

    pub fn class_mask_mut(&mut self) -> Result<&mut DeviceImage> {
        if !self.options.stats {
            return Err(Error::InvalidState("class statistics are not enabled".into()));
        }
        self.set
            .class_mask
            .as_mut()
            .ok_or_else(|| Error::InvalidState("class mask buffer is not allocated".into()))
    }

    /// Place overlay at (0,0) and mask at (overlay.width, 0) of the composite.
    /// No-op unless both outputs are enabled.
    pub fn composite(&mut self) -> Result<()> {
        if !self.options.outputs.composite() {
            return Ok(());
        }

        let BufferSet { overlay, mask, composite, .. } = &mut self.set;
        match (overlay.as_ref(), mask.as_ref(), composite.as_mut()) {
            (Some(overlay), Some(mask), Some(composite)) => {
                overlay_image_onto(overlay, composite, 0, 0)?;
                overlay_image_onto(mask, composite, overlay.width, 0)?;
                Ok(())
            }
            (o, m, c) => Err(Error::InvalidState(format!(
                "composite needs overlay, mask and composite buffers (overlay: {}, mask: {}, composite: {})",
                o.is_some(),
                m.is_some(),
                c.is_some()
            ))),
        }
    }

    /// The frame to display: composite, else the single enabled buffer, else `input`.
    pub fn output<'a>(&'a self, input: &'a FrameBuffer) -> Result<&'a FrameBuffer> {
        let outputs = self.options.outputs;
        let (name, slot) = if outputs.composite() {
            ("composite", &self.set.composite)
        } else if outputs.overlay() {
            ("overlay", &self.set.overlay)
        } else if outputs.mask() {
            ("mask", &self.set.mask)
        } else {
            return Ok(input);
        };
        slot.as_ref()
            .map(DeviceImage::image)
            .ok_or_else(|| Error::InvalidState(format!("{name} output is not allocated")))
    }

    /// Fill the class mask from `net` and count cells per class.
    /// `Ok(None)` when statistics are disabled.
    pub fn compute_stats<N: SegmentationNet + ?Sized>(&mut self, net: &N) -> Result<Option<ClassStats>> {
        if !self.options.stats {
            return Ok(None);
        }
        let class_mask = self.class_mask_mut()?;
        net.class_mask(class_mask)?;
        Ok(Some(ClassStats::from_class_mask(class_mask, net)))
    }
}

impl<A: DeviceAllocator> Drop for SegmentationBuffers<A> {
    fn drop(&mut self) {
        self.set.release_into(&mut self.allocator);
    }
}

/* ------------------------------ statistics ------------------------------ */

#[derive(Debug, Clone, PartialEq)]
pub struct ClassCount {
    pub class_id: usize,
    pub name: String,
    pub count: usize,
    /// Fraction of the grid, 0..=1.
    pub fraction: f32,
}

/// Histogram of the class grid for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    pub grid_width: usize,
    pub grid_height: usize,
    pub classes: Vec<ClassCount>,
}

impl ClassStats {
    fn from_class_mask<N: SegmentationNet + ?Sized>(mask: &FrameBuffer, net: &N) -> Self {
        let n = net.num_classes();
        let mut counts = vec![0usize; n];
        for &v in &mask.pixels {
            if let Some(c) = counts.get_mut((v & 0xFF) as usize) {
                *c += 1;
            }
        }
        let total = mask.pixels.len().max(1) as f32;
        let classes = counts
            .into_iter()
            .enumerate()
            .map(|(class_id, count)| ClassCount {
                class_id,
                name: net.class_name(class_id).to_string(),
                count,
                fraction: count as f32 / total,
            })
            .collect();
        Self { grid_width: mask.width, grid_height: mask.height, classes }
    }
}

impl fmt::Display for ClassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "grid size:   {}x{}", self.grid_width, self.grid_height)?;
        writeln!(f, "num classes: {}", self.classes.len())?;
        writeln!(f, "-----------------------------------------")?;
        writeln!(f, " ID  class name        count     %")?;
        writeln!(f, "-----------------------------------------")?;
        for c in &self.classes {
            writeln!(f, " {:>2}  {:<18}{:>5}   {:.6}", c.class_id, c.name, c.count, c.fraction)?;
        }
        Ok(())
    }
}
