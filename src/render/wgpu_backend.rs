// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of [`RenderBackend`]
//!
//! Draws the staged RGBA frame as a full-screen quad, either to a window
//! surface or to an offscreen texture that can be read back.

use super::{FrameUpload, RenderBackend, SurfaceConfig};
use crate::errors::{RenderError, RenderResult};
use crate::gpu::{self, GpuContext, GpuDeviceInfo, wgpu};
use crate::media::yuv::rgba_len;
use std::sync::mpsc;
use tracing::{debug, info, warn};

const QUAD_SHADER: &str = include_str!("preview_quad.wgsl");

/// Format of the frame texture and of the offscreen target
const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

enum Target {
    Surface {
        surface: wgpu::Surface<'static>,
        config: Option<wgpu::SurfaceConfiguration>,
    },
    Offscreen {
        texture: Option<wgpu::Texture>,
        size: (u32, u32),
    },
}

struct FrameTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl FrameTexture {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
    ) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgecam frame texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edgecam frame bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            texture,
            bind_group,
            width,
            height,
        }
    }
}

struct QuadResources {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    frame: FrameTexture,
}

pub struct WgpuBackend {
    gpu: GpuContext,
    target: Target,
    target_format: wgpu::TextureFormat,
    resources: Option<QuadResources>,
    frames_presented: u64,
}

fn offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("edgecam offscreen target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FRAME_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

impl WgpuBackend {
    /// Render into an offscreen texture
    pub fn offscreen() -> RenderResult<Self> {
        let gpu = pollster::block_on(gpu::create_render_device(
            "edgecam offscreen",
            gpu::create_instance(),
            None,
        ))?;
        Ok(Self {
            gpu,
            target: Target::Offscreen {
                texture: None,
                size: (0, 0),
            },
            target_format: FRAME_FORMAT,
            resources: None,
            frames_presented: 0,
        })
    }

    /// Render into a window surface created from `instance`
    pub fn with_surface(
        instance: wgpu::Instance,
        surface: wgpu::Surface<'static>,
    ) -> RenderResult<Self> {
        let gpu = pollster::block_on(gpu::create_render_device(
            "edgecam surface",
            instance,
            Some(&surface),
        ))?;

        let caps = surface.get_capabilities(&gpu.adapter);
        let target_format = pick_surface_format(&caps.formats)
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;

        Ok(Self {
            gpu,
            target: Target::Surface {
                surface,
                config: None,
            },
            target_format,
            resources: None,
            frames_presented: 0,
        })
    }

    pub fn device_info(&self) -> &GpuDeviceInfo {
        &self.gpu.info
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn configure_target(&mut self, width: u32, height: u32) {
        let device = &self.gpu.device;
        match &mut self.target {
            Target::Surface { surface, config } => {
                if width == 0 || height == 0 {
                    return;
                }
                let surface_config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format: self.target_format,
                    width,
                    height,
                    present_mode: wgpu::PresentMode::AutoVsync,
                    desired_maximum_frame_latency: 2,
                    alpha_mode: wgpu::CompositeAlphaMode::Auto,
                    view_formats: vec![],
                };
                surface.configure(device, &surface_config);
                *config = Some(surface_config);
            }
            Target::Offscreen { texture, size } => {
                *size = (width.max(1), height.max(1));
                *texture = Some(offscreen_texture(device, size.0, size.1));
            }
        }
    }

    fn create_quad(&self, config: &SurfaceConfig) -> RenderResult<QuadResources> {
        let device = &self.gpu.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("edgecam quad shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompileFailure(e.to_string()));
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edgecam quad bind group layout"),
            entries: &[
                // Frame texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edgecam quad pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("edgecam quad pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::LinkFailure(e.to_string()));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("edgecam frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let frame = FrameTexture::new(
            device,
            &layout,
            &sampler,
            config.frame_width,
            config.frame_height,
        );

        Ok(QuadResources {
            pipeline,
            layout,
            sampler,
            frame,
        })
    }

    /// Copy the offscreen target back to the CPU as tightly packed RGBA
    pub fn read_target(&self) -> RenderResult<Vec<u8>> {
        let Target::Offscreen {
            texture: Some(texture),
            size: (width, height),
        } = &self.target
        else {
            return Err(RenderError::Upload("no offscreen target to read".into()));
        };
        let (width, height) = (*width, *height);
        let device = &self.gpu.device;

        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgecam readback buffer"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgecam readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::PollType::wait_indefinitely());

        receiver
            .recv()
            .map_err(|e| RenderError::Upload(format!("readback channel closed: {}", e)))?
            .map_err(|e| RenderError::Upload(format!("buffer map failed: {}", e)))?;

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity((unpadded * height) as usize);
        for row in mapped.chunks(padded as usize) {
            out.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(out)
    }
}

impl RenderBackend for WgpuBackend {
    fn create_resources(&mut self, config: &SurfaceConfig) -> RenderResult<()> {
        self.resources = None;
        self.configure_target(config.width, config.height);
        let resources = self.create_quad(config)?;
        self.resources = Some(resources);
        info!(
            adapter = %self.gpu.info.adapter_name,
            format = ?self.target_format,
            "Preview quad pipeline created"
        );
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.configure_target(width, height);
        debug!(width, height, "Render target resized");
        Ok(())
    }

    fn upload(&mut self, frame: FrameUpload<'_>) -> RenderResult<()> {
        let device = &self.gpu.device;
        let Some(resources) = self.resources.as_mut() else {
            return Err(RenderError::Upload("resources not created".into()));
        };

        let expected = rgba_len(frame.width, frame.height);
        if frame.width == 0 || frame.height == 0 || frame.pixels.len() < expected {
            return Err(RenderError::Upload(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.pixels.len()
            )));
        }

        if (resources.frame.width, resources.frame.height) != (frame.width, frame.height) {
            debug!(width = frame.width, height = frame.height, "Reallocating frame texture");
            resources.frame = FrameTexture::new(
                device,
                &resources.layout,
                &resources.sampler,
                frame.width,
                frame.height,
            );
        }

        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &resources.frame.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels[..expected],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn draw(&mut self, textured: bool) -> RenderResult<()> {
        let Some(resources) = &self.resources else {
            return Err(RenderError::Surface("resources not created".into()));
        };
        let device = &self.gpu.device;

        let (surface_texture, view) = match &mut self.target {
            Target::Surface { surface, config } => {
                let Some(config) = config.as_ref() else {
                    return Ok(());
                };
                match surface.get_current_texture() {
                    Ok(frame) => {
                        let view = frame
                            .texture
                            .create_view(&wgpu::TextureViewDescriptor::default());
                        (Some(frame), view)
                    }
                    Err(e) => match surface_recovery(&e) {
                        SurfaceRecovery::Reconfigure => {
                            debug!(error = %e, "Surface lost or outdated, reconfiguring");
                            surface.configure(device, config);
                            return Ok(());
                        }
                        SurfaceRecovery::SkipFrame => {
                            warn!(error = %e, "No surface texture this tick");
                            return Ok(());
                        }
                        SurfaceRecovery::Fail => return Err(RenderError::Surface(e.to_string())),
                    },
                }
            }
            Target::Offscreen {
                texture: Some(texture),
                ..
            } => (
                None,
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
            ),
            Target::Offscreen { texture: None, .. } => return Ok(()),
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgecam preview encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("edgecam preview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if textured {
                pass.set_pipeline(&resources.pipeline);
                pass.set_bind_group(0, &resources.frame.bind_group, &[]);
                pass.draw(0..4, 0..1);
            }
        }
        self.gpu.queue.submit(Some(encoder.finish()));

        if let Some(frame) = surface_texture {
            frame.present();
        }
        self.frames_presented += 1;
        Ok(())
    }

    fn release(&mut self) {
        if self.resources.take().is_some() {
            debug!("Preview quad resources released");
        }
        if let Target::Offscreen { texture, .. } = &mut self.target {
            *texture = None;
        }
    }
}

/// Frame bytes are already display-encoded; prefer a format that does not
/// sRGB-encode them a second time
fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first().copied())
}

/// How a draw reacts to a failed surface texture acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceRecovery {
    /// Configure the surface again and draw on the next tick
    Reconfigure,
    /// Drop this tick only
    SkipFrame,
    Fail,
}

fn surface_recovery(error: &wgpu::SurfaceError) -> SurfaceRecovery {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceRecovery::Reconfigure,
        wgpu::SurfaceError::Timeout => SurfaceRecovery::SkipFrame,
        _ => SurfaceRecovery::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_loss_reconfigures() {
        assert_eq!(
            surface_recovery(&wgpu::SurfaceError::Lost),
            SurfaceRecovery::Reconfigure
        );
        assert_eq!(
            surface_recovery(&wgpu::SurfaceError::Outdated),
            SurfaceRecovery::Reconfigure
        );
        assert_eq!(
            surface_recovery(&wgpu::SurfaceError::Timeout),
            SurfaceRecovery::SkipFrame
        );
        assert_eq!(
            surface_recovery(&wgpu::SurfaceError::OutOfMemory),
            SurfaceRecovery::Fail
        );
    }

    #[test]
    fn test_surface_format_avoids_srgb() {
        use wgpu::TextureFormat::{Bgra8Unorm, Bgra8UnormSrgb, Rgba8UnormSrgb};
        assert_eq!(pick_surface_format(&[Bgra8UnormSrgb, Bgra8Unorm]), Some(Bgra8Unorm));
        assert_eq!(pick_surface_format(&[Rgba8UnormSrgb]), Some(Rgba8UnormSrgb));
        assert_eq!(pick_surface_format(&[]), None);
    }

    #[test]
    fn test_quad_shader_validates() {
        let module = naga::front::wgsl::parse_str(QUAD_SHADER)
            .unwrap_or_else(|e| panic!("Shader 'preview_quad' parse failed: {:?}", e));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("Shader 'preview_quad' validation failed: {:?}", e));
    }

    #[test]
    fn test_quad_shader_entry_points() {
        let module = naga::front::wgsl::parse_str(QUAD_SHADER).unwrap();
        let names: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"vs_main"));
        assert!(names.contains(&"fs_main"));
    }
}
