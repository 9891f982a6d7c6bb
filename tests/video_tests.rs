mod common;

use std::path::PathBuf;

use camseg::buffers::EnabledOutputs;
use camseg::config::SegmentConfig;
use camseg::net::LumaSegNet;
use camseg::pipeline::Session;
use camseg::video::{self, ImageSink, ImageSource, VideoSink, VideoSource};

use common::{solid, TrackingAllocator};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("camseg-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn image_sink_writes_numbered_pngs_that_read_back_in_order() {
    let dir = scratch_dir("roundtrip");
    let mut sink = ImageSink::create(&dir).unwrap();
    let frames = [solid(6, 4, 0x0010_2030), solid(6, 4, 0x00C0_8040), solid(3, 2, 0x00FF_FFFF)];
    for f in &frames {
        sink.render(f).unwrap();
    }
    sink.set_status("luma-bands | 30 FPS");
    assert_eq!(sink.frames_written(), 3);
    assert_eq!(sink.status(), "luma-bands | 30 FPS");
    assert!(dir.join("frame_000000.png").is_file());
    assert!(dir.join("frame_000002.png").is_file());

    let mut source = ImageSource::open(&dir).unwrap();
    assert_eq!(source.remaining(), 3);
    for expected in &frames {
        assert_eq!(&source.capture().unwrap().unwrap(), expected);
    }
    assert!(source.capture().unwrap().is_none());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_input_is_a_config_error() {
    let dir = scratch_dir("missing");
    assert!(matches!(ImageSource::open(&dir), Err(camseg::Error::Config(_))));

    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    assert!(matches!(ImageSource::open(&dir), Err(camseg::Error::Config(_))));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn directory_to_directory_segmentation_run() {
    let input = scratch_dir("in");
    let output = scratch_dir("out");
    {
        let mut sink = ImageSink::create(&input).unwrap();
        for _ in 0..2 {
            sink.render(&solid(32, 24, 0x0080_8080)).unwrap();
        }
    }

    let mut source = video::open_source(input.to_str().unwrap(), 640, 480).unwrap();
    let mut sink = video::open_sink(&format!("file://{}", output.display()), "luma-bands").unwrap();
    let config = SegmentConfig { visualize: EnabledOutputs::BOTH, ..SegmentConfig::default() };
    let mut session = Session::segment(&config, Box::new(LumaSegNet::new(4, 3)), Box::new(TrackingAllocator::new()));

    let summary = session.run(source.as_mut(), sink.as_mut()).unwrap();
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.allocations, 1);

    let written = image::open(output.join("frame_000001.png")).unwrap().to_rgb8();
    assert_eq!(written.dimensions(), (64, 24));

    std::fs::remove_dir_all(&input).unwrap();
    std::fs::remove_dir_all(&output).unwrap();
}
