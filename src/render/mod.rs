// SPDX-License-Identifier: GPL-3.0-only

//! Preview renderer lifecycle
//!
//! [`Renderer`] tracks surface and pause state and drives a
//! [`RenderBackend`] that owns the actual GPU objects:
//!
//! ```text
//! Created ──surface created──▶ SurfaceReady ──surface changed──▶ Rendering
//!                                   │  ▲                            │  ▲
//!                                 pause resume                    pause resume
//!                                   ▼  │                            ▼  │
//!                                   Paused ◀────────────────────────┘
//! any state ──destroy──▶ Destroyed
//! ```
//!
//! If resource creation fails the renderer stays in its lifecycle state but
//! draws nothing until the next successful surface creation.

pub mod wgpu_backend;

pub use wgpu_backend::WgpuBackend;

use crate::errors::{RenderError, RenderResult};
use crate::pipeline::TextureStaging;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Surface and frame geometry handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    /// Size of the frames that will be uploaded
    pub frame_width: u32,
    pub frame_height: u32,
}

/// One staged frame on its way to the GPU
#[derive(Debug, Clone, Copy)]
pub struct FrameUpload<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub sequence: u64,
}

/// GPU side of the renderer
pub trait RenderBackend {
    /// Compile shaders, build the pipeline and allocate the frame texture
    fn create_resources(&mut self, config: &SurfaceConfig) -> RenderResult<()>;

    /// The drawable surface changed size
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Copy a frame into the texture
    fn upload(&mut self, frame: FrameUpload<'_>) -> RenderResult<()>;

    /// Clear to black and, if `textured`, draw the quad; then present
    fn draw(&mut self, textured: bool) -> RenderResult<()>;

    /// Drop all GPU objects. Idempotent.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Created,
    SurfaceReady,
    Rendering,
    Paused,
    Destroyed,
}

/// What a draw tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Not rendering, or resources unavailable
    Skipped,
    /// Cleared; no frame has been uploaded yet
    Cleared,
    /// Drew the texture holding this staging sequence
    Drew { sequence: u64 },
}

pub struct Renderer<B: RenderBackend> {
    backend: B,
    staging: Arc<TextureStaging>,
    state: RendererState,
    resources_ready: bool,
    failure: Option<RenderError>,
    surface_size: Option<(u32, u32)>,
    uploaded: Option<u64>,
    ticks: u64,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B, staging: Arc<TextureStaging>) -> Self {
        Self {
            backend,
            staging,
            state: RendererState::Created,
            resources_ready: false,
            failure: None,
            surface_size: None,
            uploaded: None,
            ticks: 0,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Last resource creation error, if the renderer is inert
    pub fn failure(&self) -> Option<&RenderError> {
        self.failure.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// A (new) drawing surface exists; (re)create every GPU resource
    pub fn on_surface_created(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.state == RendererState::Destroyed {
            warn!("Surface created after destroy, ignoring");
            return Ok(());
        }

        if self.resources_ready {
            // Context loss: old objects are invalid
            self.backend.release();
            self.resources_ready = false;
        }
        self.uploaded = None;

        let (frame_width, frame_height) = self.staging.dimensions();
        let config = SurfaceConfig {
            width,
            height,
            frame_width,
            frame_height,
        };

        if self.state != RendererState::Paused {
            self.state = RendererState::SurfaceReady;
        }
        if width > 0 && height > 0 {
            self.surface_size = Some((width, height));
        }

        match self.backend.create_resources(&config) {
            Ok(()) => {
                self.resources_ready = true;
                self.failure = None;
                info!(width, height, frame_width, frame_height, "Render resources created");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to create render resources");
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    /// The surface was resized; zero-sized surfaces are ignored
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        if matches!(self.state, RendererState::Created | RendererState::Destroyed) {
            debug!(state = ?self.state, "Surface change without surface, ignoring");
            return;
        }
        if width == 0 || height == 0 {
            debug!(width, height, "Ignoring zero-sized surface");
            return;
        }

        self.surface_size = Some((width, height));
        if self.resources_ready {
            if let Err(e) = self.backend.resize(width, height) {
                warn!(error = %e, "Failed to resize surface");
            }
        }
        if self.state == RendererState::SurfaceReady {
            self.state = RendererState::Rendering;
        }
        debug!(width, height, "Viewport updated");
    }

    /// Upload the newest staged frame if it changed, then draw
    pub fn on_draw_tick(&mut self) -> DrawOutcome {
        if self.state != RendererState::Rendering || !self.resources_ready {
            return DrawOutcome::Skipped;
        }
        self.ticks += 1;

        let uploaded = self.uploaded;
        let backend = &mut self.backend;
        let upload = self.staging.read_latest(|frame| {
            if uploaded == Some(frame.sequence) {
                return Ok(None);
            }
            backend
                .upload(FrameUpload {
                    width: frame.width,
                    height: frame.height,
                    pixels: &frame.pixels,
                    sequence: frame.sequence,
                })
                .map(|()| Some(frame.sequence))
        });

        match upload {
            Some(Ok(Some(sequence))) => self.uploaded = Some(sequence),
            Some(Err(e)) => warn!(error = %e, "Frame upload failed, keeping previous texture"),
            Some(Ok(None)) | None => {}
        }

        if let Err(e) = self.backend.draw(self.uploaded.is_some()) {
            warn!(tick = self.ticks, error = %e, "Draw failed");
            return DrawOutcome::Skipped;
        }

        match self.uploaded {
            Some(sequence) => DrawOutcome::Drew { sequence },
            None => DrawOutcome::Cleared,
        }
    }

    pub fn pause(&mut self) {
        if matches!(
            self.state,
            RendererState::SurfaceReady | RendererState::Rendering
        ) {
            self.state = RendererState::Paused;
            debug!("Renderer paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == RendererState::Paused {
            self.state = if self.surface_size.is_some() {
                RendererState::Rendering
            } else {
                RendererState::SurfaceReady
            };
            debug!(state = ?self.state, "Renderer resumed");
        }
    }

    /// Release GPU resources. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.state == RendererState::Destroyed {
            return;
        }
        if self.resources_ready {
            self.backend.release();
            self.resources_ready = false;
        }
        self.state = RendererState::Destroyed;
        info!(ticks = self.ticks, "Renderer destroyed");
    }
}

impl<B: RenderBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
