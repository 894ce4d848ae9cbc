// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization utilities for the preview renderer.

use crate::errors::{RenderError, RenderResult};
use tracing::{debug, info};

pub use wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, GL, etc.)
    pub backend: wgpu::Backend,
}

/// Instance, adapter, device and queue for one renderer
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub info: GpuDeviceInfo,
}

/// Instance over every backend this platform supports
pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Create a wgpu device and queue for rendering.
///
/// When `compatible_surface` is given the adapter must be able to present
/// to it; it has to come from `instance`.
pub async fn create_render_device(
    label: &str,
    instance: wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> RenderResult<GpuContext> {
    info!(label = label, "Creating GPU device for rendering");

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| {
            debug!(error = %e, "Adapter request failed");
            RenderError::NoAdapter
        })?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for rendering"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                .using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok(GpuContext {
        instance,
        adapter,
        device,
        queue,
        info,
    })
}
