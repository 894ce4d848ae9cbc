// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use edgecam::constants::{capture, color, detection, timing};
use edgecam::pipeline::EdgeParams;

#[test]
fn test_default_edge_params_match_constants() {
    let params = EdgeParams::default();
    assert_eq!(params.threshold, detection::DEFAULT_THRESHOLD);
    assert_eq!(params.ratio, detection::DEFAULT_RATIO);
}

#[test]
fn test_default_thresholds() {
    // 50 * 3
    let thresholds = EdgeParams::default().thresholds();
    assert_eq!(thresholds.low, 50);
    assert_eq!(thresholds.high, 150);
}

#[test]
fn test_fps_smoothing_is_a_weight() {
    assert!(timing::FPS_SMOOTHING > 0.0 && timing::FPS_SMOOTHING < 1.0);
}

#[test]
fn test_neutral_chroma_is_midpoint() {
    assert_eq!(color::NEUTRAL_CHROMA, 128);
}

#[test]
fn test_edge_color_differs_from_background() {
    assert_ne!(
        detection::EDGE_COLOR,
        detection::BACKGROUND_COLOR,
        "Edges must be visible against the background"
    );
}

#[test]
fn test_frame_wait_shorter_than_open_timeout() {
    // The capture thread must notice a stop request well before an open gives up
    assert!(capture::FRAME_WAIT_TIMEOUT < capture::OPEN_LOCK_TIMEOUT);
}
