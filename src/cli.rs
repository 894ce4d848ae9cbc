// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running the preview pipeline with an offscreen renderer
//! - Listing available cameras
//! - Printing and saving the configuration

use crate::RunArgs;
use edgecam::backends::camera::{
    CameraProvider, Facing, SourceState, SyntheticCameraSpec, SyntheticProvider,
};
use edgecam::constants::timing;
use edgecam::media::run_self_test;
use edgecam::pipeline::{CannyTransform, EdgeParams, EdgePipeline, PipelineControl, PipelineOptions};
use edgecam::render::{DrawOutcome, Renderer, WgpuBackend};
use edgecam::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How often the waiting loops re-check the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let provider = SyntheticProvider::default_rig(30, 2);
    let ids = provider.device_ids()?;

    if ids.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for id in ids {
        let characteristics = provider.characteristics(&id)?;
        let facing = characteristics
            .facing
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("  [{}] facing {}", id, facing);

        match characteristics.stream_configs {
            Some(configs) if !configs.is_empty() => {
                let formats: Vec<String> = configs.iter().map(|c| c.to_string()).collect();
                println!("      Formats: {}", formats.join(", "));
            }
            _ => println!("      Formats: none"),
        }
        println!();
    }

    Ok(())
}

/// Print the effective configuration, optionally writing it back
pub fn show_config(
    config: &Config,
    path: Option<PathBuf>,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        let saved = match path {
            Some(path) => {
                config.save_to(&path)?;
                path
            }
            None => config.save()?,
        };
        println!("Saved to {}", saved.display());
    }
    Ok(())
}

/// Run the full preview pipeline until Ctrl-C or the time limit
pub fn run(mut config: Config, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.detect {
        config.detection_enabled = true;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(ratio) = args.ratio {
        config.ratio = ratio;
    }
    let options = PipelineOptions::from(&config);

    let self_test_edges = run_self_test();
    info!(edges = self_test_edges, "Edge detection self-test");

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    let provider = Arc::new(camera_rig(&args));
    let pipeline = EdgePipeline::new(
        provider,
        Box::new(CannyTransform::new(config.edge_color)),
        options,
    );
    if let Some(e) = pipeline.transform_error() {
        warn!(error = %e, "Edge detection unavailable, raw preview only");
    }

    let device = match pipeline.start() {
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "Camera start failed, retrying once");
            pipeline.start()?
        }
        result => result?,
    };
    println!(
        "Streaming {}x{} from camera {} (Ctrl-C to stop)",
        options.width, options.height, device
    );

    let renderer = if args.no_render {
        None
    } else {
        Some(spawn_render_thread(&pipeline, Arc::clone(&running), config.render_interval())?)
    };

    let control = spawn_control_thread(
        pipeline.control(),
        Arc::clone(&running),
        args.toggle_every.map(Duration::from_secs),
    )?;

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut outcome = Ok(());
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if let SourceState::Failed(e) = pipeline.source_state() {
            error!(error = %e, "Camera stream failed");
            outcome = Err(e);
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    running.store(false, Ordering::SeqCst);

    let _ = control.join();
    let presented = renderer.and_then(|handle| handle.join().ok()).flatten();
    pipeline.stop()?;

    let stats = pipeline.stats();
    println!(
        "Frames: {} delivered, {} staged, {} dropped, {} failed",
        stats.delivered, stats.staged, stats.dropped, stats.failed
    );
    if let Some(presented) = presented {
        println!("Presented: {}", presented);
    }

    outcome.map_err(Into::into)
}

/// Front and back test cameras shaped by the run arguments
fn camera_rig(args: &RunArgs) -> SyntheticProvider {
    let camera = |id: &str, facing: Facing| {
        SyntheticCameraSpec::new(id, Some(facing))
            .with_fps(args.fps)
            .with_chroma_pixel_stride(usize::from(args.pixel_stride))
            .with_luma_row_padding(args.luma_padding)
    };
    SyntheticProvider::new(vec![camera("0", Facing::Front), camera("1", Facing::Back)])
}

/// Drive an offscreen renderer from the staging buffer
///
/// Returns the number of presented frames, or `None` when no GPU was usable.
fn spawn_render_thread(
    pipeline: &EdgePipeline,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> std::io::Result<JoinHandle<Option<u64>>> {
    let staging = pipeline.staging();
    let (width, height) = staging.dimensions();

    thread::Builder::new()
        .name("render".into())
        .spawn(move || {
            let backend = match WgpuBackend::offscreen() {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(error = %e, "No GPU renderer, continuing without preview");
                    return None;
                }
            };
            info!(
                adapter = %backend.device_info().adapter_name,
                backend = ?backend.device_info().backend,
                "Renderer ready"
            );

            let mut renderer = Renderer::new(backend, staging);
            if let Err(e) = renderer.on_surface_created(width, height) {
                warn!(error = %e, "Renderer resources unavailable");
            }
            renderer.on_surface_changed(width, height);

            let mut last_drawn = None;
            while running.load(Ordering::SeqCst) {
                if let DrawOutcome::Drew { sequence } = renderer.on_draw_tick() {
                    last_drawn = Some(sequence);
                }
                thread::sleep(interval);
            }

            let presented = renderer.backend().frames_presented();
            info!(presented, last_sequence = ?last_drawn, "Render thread finished");
            renderer.destroy();
            Some(presented)
        })
}

/// Report FPS once per interval and optionally toggle the mode
fn spawn_control_thread(
    control: PipelineControl,
    running: Arc<AtomicBool>,
    toggle_every: Option<Duration>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            let mut last_report = Instant::now();
            let mut last_toggle = Instant::now();

            while running.load(Ordering::SeqCst) {
                thread::sleep(POLL_INTERVAL);

                if let Some(every) = toggle_every {
                    if last_toggle.elapsed() >= every {
                        control.toggle_detection();
                        last_toggle = Instant::now();
                    }
                }

                if last_report.elapsed() >= timing::FPS_REPORT_INTERVAL {
                    let mode = control.mode();
                    let stats = control.stats();
                    let EdgeParams { threshold, ratio } = mode.params;
                    println!(
                        "{:5.1} fps  {}  threshold {} ratio {}  processing {} us",
                        control.fps_estimate(),
                        if mode.detection_enabled { "edges" } else { "raw  " },
                        threshold,
                        ratio,
                        stats.last_processing_us
                    );
                    last_report = Instant::now();
                }
            }
        })
}
