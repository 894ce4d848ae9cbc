// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use edgecam::constants::{capture, detection};
use edgecam::{Config, PipelineOptions};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(
        !config.detection_enabled,
        "Preview should start in raw mode by default"
    );
    assert_eq!(config.preview_width, capture::PREVIEW_WIDTH);
    assert_eq!(config.preview_height, capture::PREVIEW_HEIGHT);
    assert_eq!(config.edge_color, detection::EDGE_COLOR);
    assert!(config.log_filter.is_none());
}

#[test]
fn test_config_timeouts() {
    let config = Config::default();
    assert_eq!(config.open_timeout(), Duration::from_millis(2500));

    let zero = Config {
        render_interval_ms: 0,
        ..Config::default()
    };
    assert_eq!(zero.render_interval(), Duration::from_millis(1));
}

#[test]
fn test_pipeline_options_from_config() {
    let config = Config {
        detection_enabled: true,
        threshold: 70,
        ratio: 2,
        ..Config::default()
    };
    let options = PipelineOptions::from(&config);

    assert!(options.detection_enabled);
    assert_eq!(options.params.threshold, 70);
    assert_eq!(options.params.ratio, 2);
    assert_eq!(options.open_timeout, config.open_timeout());
    assert_eq!((options.width, options.height), (640, 480));
}

#[test]
fn test_config_json_roundtrip() {
    let json = serde_json::to_string(&Config::default()).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, Config::default());
}
