// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests of the capture, processing and staging path

use edgecam::backends::camera::{SourceState, SyntheticProvider};
use edgecam::constants::detection;
use edgecam::pipeline::{CannyTransform, EdgePipeline, PipelineOptions, StagedFrame, TextureStaging};
use edgecam::{CameraError, ProcessError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn pipeline(provider: &Arc<SyntheticProvider>, detection_enabled: bool) -> EdgePipeline {
    let options = PipelineOptions {
        detection_enabled,
        ..PipelineOptions::default()
    };
    EdgePipeline::new(
        provider.clone(),
        Box::new(CannyTransform::default()),
        options,
    )
}

fn is_edge_image(frame: &StagedFrame) -> bool {
    let [r, g, b] = detection::EDGE_COLOR;
    let [br, bg, bb] = detection::BACKGROUND_COLOR;
    frame
        .pixels
        .chunks_exact(4)
        .all(|px| px == [r, g, b, 255] || px == [br, bg, bb, 255])
}

#[test]
fn test_stream_stages_frames_and_estimates_fps() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = pipeline(&provider, false);

    assert_eq!(pipeline.start().unwrap(), "1");
    assert!(pipeline.is_streaming());

    let staging = pipeline.staging();
    assert!(wait_until(|| staging.published() >= 3));
    assert!(pipeline.fps_estimate() > 0.0);
    assert!(pipeline.stats().staged >= 3);
    assert_eq!(pipeline.stats().failed, 0);

    pipeline.stop().unwrap();
    assert_eq!(pipeline.source_state(), SourceState::Idle);
    assert_eq!(provider.open_devices(), 0);
}

#[test]
fn test_planar_chroma_source_streams() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 1));
    let pipeline = pipeline(&provider, false);

    pipeline.start().unwrap();
    let staging = pipeline.staging();
    assert!(wait_until(|| staging.published() >= 2));
    assert_eq!(pipeline.stats().failed, 0);
}

#[test]
fn test_detection_mode_stages_edge_images() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = pipeline(&provider, true);
    assert!(pipeline.transform_error().is_none());

    pipeline.start().unwrap();
    let staging = pipeline.staging();
    assert!(wait_until(|| staging.published() >= 1));

    let (binary, has_edges) = staging
        .read_latest(|frame| {
            let [r, g, b] = detection::EDGE_COLOR;
            let has_edges = frame.pixels.chunks_exact(4).any(|px| px == [r, g, b, 255]);
            (is_edge_image(frame), has_edges)
        })
        .unwrap();
    assert!(binary, "Edge output must only contain edge and background colors");
    assert!(has_edges, "The moving square should produce edges");
}

#[test]
fn test_toggle_while_streaming() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = pipeline(&provider, false);
    pipeline.start().unwrap();

    let staging = pipeline.staging();
    assert!(wait_until(|| staging.published() >= 1));

    assert!(pipeline.toggle_detection());
    let generation = pipeline.mode().generation;
    assert!(wait_until(|| {
        staging
            .read_latest(|frame| frame.mode_generation >= generation && is_edge_image(frame))
            .unwrap_or(false)
    }));

    assert!(!pipeline.toggle_detection());
    let generation = pipeline.mode().generation;
    assert!(wait_until(|| {
        staging
            .read_latest(|frame| frame.mode_generation >= generation && !is_edge_image(frame))
            .unwrap_or(false)
    }));
}

#[test]
fn test_parameter_change_applies_to_later_frames() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = pipeline(&provider, true);
    pipeline.start().unwrap();

    // Nothing in the pattern clears a threshold this high
    pipeline.set_parameters(4000, 3);
    let generation = pipeline.mode().generation;
    let staging = pipeline.staging();
    assert!(wait_until(|| {
        staging
            .read_latest(|frame| {
                let [br, bg, bb] = detection::BACKGROUND_COLOR;
                frame.mode_generation >= generation
                    && frame.pixels.chunks_exact(4).all(|px| px == [br, bg, bb, 255])
            })
            .unwrap_or(false)
    }));
}

#[test]
fn test_start_stop_cycles_hold_one_device() {
    let provider = Arc::new(SyntheticProvider::default_rig(120, 2));
    let pipeline = pipeline(&provider, false);

    for _ in 0..5 {
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(CameraError::AlreadyRunning)));
        pipeline.stop().unwrap();
    }

    assert_eq!(provider.total_opens(), 5);
    assert_eq!(provider.peak_open_devices(), 1);
    assert_eq!(provider.open_devices(), 0);
}

#[test]
fn test_concurrent_start_opens_once() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = Arc::new(pipeline(&provider, false));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || pipeline.start())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == CameraError::AlreadyRunning)
    );
    assert_eq!(provider.peak_open_devices(), 1);
}

#[test]
fn test_disconnect_fails_then_restarts() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = pipeline(&provider, false);
    let id = pipeline.start().unwrap();

    assert!(provider.disconnect(&id));
    assert!(wait_until(|| {
        pipeline.source_state() == SourceState::Failed(CameraError::Disconnected)
    }));
    assert!(!pipeline.is_streaming());

    // The failed session still owns the device until the next start or stop
    pipeline.start().unwrap();
    assert!(pipeline.is_streaming());
    assert_eq!(provider.peak_open_devices(), 1);
    assert_eq!(provider.total_opens(), 2);
}

#[test]
fn test_device_error_code_reported() {
    let provider = Arc::new(SyntheticProvider::default_rig(60, 2));
    let pipeline = pipeline(&provider, false);
    let id = pipeline.start().unwrap();

    assert!(provider.report_error(&id, 4));
    assert!(wait_until(|| {
        pipeline.source_state() == SourceState::Failed(CameraError::DeviceError(4))
    }));
}

#[test]
fn test_no_cameras() {
    let provider = Arc::new(SyntheticProvider::new(Vec::new()));
    let pipeline = pipeline(&provider, false);

    assert_eq!(pipeline.start(), Err(CameraError::DeviceUnavailable));
    assert_eq!(
        pipeline.source_state(),
        SourceState::Failed(CameraError::DeviceUnavailable)
    );
}

#[test]
fn test_staging_race_never_tears() {
    let staging = Arc::new(TextureStaging::new(64, 64));

    let writer = {
        let staging = Arc::clone(&staging);
        thread::spawn(move || {
            let mut written = 0u64;
            for i in 0..2000u32 {
                let value = (i % 251) as u8;
                match staging.write_next(0, |px| {
                    px.fill(value);
                    Ok(())
                }) {
                    Ok(_) => written += 1,
                    Err(ProcessError::NoFreeSlot) => {}
                    Err(e) => panic!("unexpected staging error: {}", e),
                }
            }
            written
        })
    };

    let reader = {
        let staging = Arc::clone(&staging);
        thread::spawn(move || {
            let mut last_sequence = 0;
            for _ in 0..2000 {
                if let Some((sequence, uniform)) = staging.read_latest(|frame| {
                    let first = frame.pixels[0];
                    (frame.sequence, frame.pixels.iter().all(|&p| p == first))
                }) {
                    assert!(uniform, "Frame {} was torn", sequence);
                    assert!(sequence >= last_sequence, "Sequence went backwards");
                    last_sequence = sequence;
                }
            }
        })
    };

    let written = writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(staging.published(), written);
    assert!(written > 0);
}
