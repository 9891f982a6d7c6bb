mod common;

use std::time::Duration;

use camseg::Error;
use camseg::buffers::EnabledOutputs;
use camseg::config::{Config, ModeConfig, SegmentConfig};
use camseg::net::{self, FilterMode, LumaSegNet, MotionDetectNet};
use camseg::pipeline::Session;
use camseg::types::FrameBuffer;

use common::{solid, RecordingSink, ScriptedSource, TrackingAllocator};

fn seg_config(visualize: EnabledOutputs) -> SegmentConfig {
    SegmentConfig { visualize, ..SegmentConfig::default() }
}

fn seg_session(visualize: EnabledOutputs, alloc: TrackingAllocator) -> Session {
    Session::segment(&seg_config(visualize), Box::new(LumaSegNet::new(8, 6)), Box::new(alloc))
}

fn gradient(w: usize, h: usize) -> FrameBuffer {
    let mut f = FrameBuffer::new(w, h, camseg::types::PixelFormat::Rgb8);
    for y in 0..h {
        for x in 0..w {
            let v = (x * 255 / w.max(1)) as u32;
            f.set(x, y, (v << 16) | (v << 8) | v);
        }
    }
    f
}

#[test]
fn segmentation_run_renders_the_composite() {
    let alloc = TrackingAllocator::new();
    let mut session = seg_session(EnabledOutputs::BOTH, alloc.clone());
    let mut source = ScriptedSource::new(vec![gradient(64, 48); 3]);
    let mut sink = RecordingSink::default();

    let summary = session.run(&mut source, &mut sink).unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.allocations, 1);
    assert_eq!(alloc.log.borrow().calls, 3);
    assert_eq!(sink.rendered.len(), 3);
    for f in &sink.rendered {
        assert_eq!((f.width, f.height), (128, 48));
    }
    // the left half differs from the right half (overlay vs class colours)
    let f = &sink.rendered[0];
    assert_ne!(f.get(63, 10), f.get(127, 10));
    assert!(sink.statuses.iter().all(|s| s.starts_with("luma-bands | ") && s.ends_with(" FPS")));
}

#[test]
fn geometry_change_mid_run_reallocates_once() {
    let alloc = TrackingAllocator::new();
    let mut session = seg_session(EnabledOutputs::BOTH, alloc.clone());
    let frames = vec![gradient(64, 48), gradient(64, 48), gradient(64, 48), gradient(32, 24)];
    let mut sink = RecordingSink::default();

    let summary = session.run(&mut ScriptedSource::new(frames), &mut sink).unwrap();

    assert_eq!(summary.allocations, 2);
    assert_eq!(alloc.log.borrow().released.len(), 3);
    assert_eq!((sink.rendered[3].width, sink.rendered[3].height), (64, 24));
}

#[test]
fn single_output_renders_at_frame_size() {
    let mut session = seg_session(EnabledOutputs::MASK, TrackingAllocator::new());
    let mut sink = RecordingSink::default();
    session
        .run(&mut ScriptedSource::new(vec![gradient(40, 30)]), &mut sink)
        .unwrap();
    assert_eq!((sink.rendered[0].width, sink.rendered[0].height), (40, 30));
}

#[test]
fn no_visualization_passes_the_frame_through() {
    let alloc = TrackingAllocator::new();
    let mut session = seg_session(EnabledOutputs::NONE, alloc.clone());
    let input = gradient(16, 12);
    let mut sink = RecordingSink::default();
    let summary = session
        .run(&mut ScriptedSource::new(vec![input.clone(), input.clone()]), &mut sink)
        .unwrap();
    assert_eq!(sink.rendered, vec![input.clone(), input]);
    assert_eq!(alloc.log.borrow().calls, 0);
    assert_eq!(summary.allocations, 0);
}

#[test]
fn process_frame_returns_the_composite() {
    let mut session = seg_session(EnabledOutputs::BOTH, TrackingAllocator::new());
    let mut frame = gradient(20, 10);
    let out = session.process_frame(&mut frame).unwrap();
    assert_eq!((out.width, out.height), (40, 10));
}

#[test]
fn allocation_failure_is_fatal_and_nothing_is_rendered() {
    let mut session = seg_session(EnabledOutputs::BOTH, TrackingAllocator::failing_on(3));
    let mut sink = RecordingSink::default();
    let err = session
        .run(&mut ScriptedSource::new(vec![gradient(64, 48); 2]), &mut sink)
        .unwrap_err();
    assert!(matches!(err, Error::Allocation { .. }));
    assert!(sink.rendered.is_empty());
}

#[test]
fn stats_run_allocates_the_class_mask() {
    let alloc = TrackingAllocator::new();
    let cfg = SegmentConfig { stats: true, filter_mode: FilterMode::Point, ..SegmentConfig::default() };
    let mut session = Session::segment(&cfg, Box::new(LumaSegNet::new(8, 6)), Box::new(alloc.clone()));
    let mut sink = RecordingSink::default();
    session
        .run(&mut ScriptedSource::new(vec![gradient(64, 48)]), &mut sink)
        .unwrap();

    let log = alloc.log.borrow();
    assert_eq!(log.allocated.len(), 4);
    let class_mask = log.allocated[3];
    assert_eq!((class_mask.1, class_mask.2), (8, 6));
    assert_eq!(class_mask.3, camseg::types::PixelFormat::Gray8);
}

#[test]
fn sink_stopping_ends_the_loop() {
    let mut session = seg_session(EnabledOutputs::OVERLAY, TrackingAllocator::new());
    let mut sink = RecordingSink { limit: Some(2), ..RecordingSink::default() };
    let summary = session
        .run(&mut ScriptedSource::new(vec![gradient(16, 16); 5]), &mut sink)
        .unwrap();
    assert_eq!(summary.frames, 2);
    assert_eq!(sink.rendered.len(), 2);
}

#[test]
fn detection_run_draws_boxes_on_the_frame() {
    let mut session = Session::detect("motion", Box::new(MotionDetectNet::new(8, 6, 0.5)));
    let mut moved = solid(64, 48, 0);
    for y in 16..32 {
        for x in 16..32 {
            moved.set(x, y, 0x00FF_FFFF);
        }
    }
    let frames = vec![solid(64, 48, 0), moved.clone()];
    let mut sink = RecordingSink::default();

    let summary = session.run(&mut ScriptedSource::new(frames), &mut sink).unwrap();

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.allocations, 0);
    assert_eq!(sink.rendered[0], solid(64, 48, 0));
    assert_ne!(sink.rendered[1], moved);
    assert_eq!((sink.rendered[1].width, sink.rendered[1].height), (64, 48));
    assert!(sink.statuses[1].starts_with("motion | "));
}

#[test]
fn session_from_config_rejects_unknown_models() {
    let config = Config {
        mode: ModeConfig::Segment(SegmentConfig { network: "fcn-resnet18".into(), ..SegmentConfig::default() }),
        input: "frames".into(),
        output: "out".into(),
        width: 640,
        height: 480,
        status_interval: Duration::from_secs(30),
    };
    assert!(matches!(Session::new(&config), Err(Error::Config(_))));

    let config = Config { mode: ModeConfig::Detect { network: "motion".into(), threshold: 0.4 }, ..config };
    let session = Session::new(&config).unwrap();
    assert_eq!(session.network(), "motion");
}

#[test]
fn builtin_loader_feeds_a_session() {
    let net = net::load_segmentation("luma-bands").unwrap();
    let mut session = Session::segment(&SegmentConfig::default(), net, Box::new(TrackingAllocator::new()));
    let mut frame = gradient(128, 72);
    let out = session.process_frame(&mut frame).unwrap();
    assert_eq!((out.width, out.height), (256, 72));
    assert!(session.network_fps().is_finite());
}
