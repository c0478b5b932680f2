//! wgpu Renderer module
//!
//! Draws the captured window onto the projection mesh once per eye into
//! offscreen eye targets, then shows both eye images side by side in the
//! companion window.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use image::RgbaImage;
use log::{debug, info, warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, Device, DeviceDescriptor, Instance, InstanceDescriptor,
    Queue, RenderPipeline, Surface, SurfaceConfiguration, SurfaceTargetUnsafe, TextureUsages,
};
use winit::window::Window;

use crate::cursor::{CursorOverlay, EyeSampling};
use crate::error::{PlayerError, Result};
use crate::mesh::{ProjectionMesh, SceneVertex};
use crate::pose::Eye;
use crate::resize::{FrameGeneration, SourceFrame};

const EYE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// Per-eye scene uniforms, layout matches `SceneUniforms` in scene.wgsl
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    view_proj: [[f32; 4]; 4],
    cursor_location: [f32; 2],
    arrow_size: [f32; 2],
    texture_offset_x: f32,
    texture_scale_x: f32,
    _padding: [f32; 2],
}

impl SceneUniforms {
    fn new(eye: &EyeFrame) -> Self {
        Self {
            view_proj: eye.view_projection.to_cols_array_2d(),
            cursor_location: eye.cursor.cursor_location.to_array(),
            arrow_size: eye.cursor.arrow_size.to_array(),
            texture_offset_x: eye.sampling.offset_x,
            texture_scale_x: eye.sampling.scale_x,
            _padding: [0.0; 2],
        }
    }
}

/// Everything needed to draw one eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeFrame {
    pub view_projection: Mat4,
    pub sampling: EyeSampling,
    pub cursor: CursorOverlay,
}

struct CaptureTexture {
    texture: wgpu::Texture,
    bind_group: BindGroup,
    width: u32,
    height: u32,
    generation: FrameGeneration,
}

struct EyeTarget {
    #[allow(dead_code)]
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    companion_bind_group: BindGroup,
}

struct SceneMesh {
    buffer: Buffer,
    vertex_count: u32,
}

pub struct Renderer {
    #[allow(dead_code)]
    window: Arc<Window>,
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    vsync: bool,

    // Scene
    scene_pipeline: RenderPipeline,
    eye_uniforms: [Buffer; 2],
    eye_uniform_bind_groups: [BindGroup; 2],
    texture_bind_group_layout: BindGroupLayout,
    texture_sampler: wgpu::Sampler,
    mesh: SceneMesh,
    capture: CaptureTexture,
    #[allow(dead_code)]
    arrow_texture: wgpu::Texture,
    arrow_bind_group: BindGroup,

    // Eye targets and companion window
    eye_targets: [EyeTarget; 2],
    companion_pipeline: RenderPipeline,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        eye_size: (u32, u32),
        vsync: bool,
        arrow: &RgbaImage,
        frame: SourceFrame,
        mesh: &ProjectionMesh,
    ) -> Result<Self> {
        let size = window.inner_size();

        let instance = Instance::new(&InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = {
            let window_handle = window
                .window_handle()
                .map_err(|e| PlayerError::Gpu(format!("no window handle: {e}")))?
                .as_raw();
            let display_handle = window
                .display_handle()
                .map_err(|e| PlayerError::Gpu(format!("no display handle: {e}")))?
                .as_raw();
            let target = SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle,
                raw_window_handle: window_handle,
            };
            // SAFETY: the window is kept alive in `self.window` for as long as the surface
            unsafe { instance.create_surface_unsafe(target) }
                .map_err(|e| PlayerError::Gpu(format!("failed to create surface: {e}")))?
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| PlayerError::Gpu("no suitable GPU adapter".into()))?;
        info!("Using GPU adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor::default(), None)
            .await
            .map_err(|e| PlayerError::Gpu(format!("failed to create device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| PlayerError::Gpu("surface has no supported formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::Fifo
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        // --- Scene uniforms, one buffer per eye ---
        let uniform_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let eye_uniforms = Eye::BOTH.map(|eye| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(match eye {
                    Eye::Left => "Left Eye Uniforms",
                    Eye::Right => "Right Eye Uniforms",
                }),
                size: std::mem::size_of::<SceneUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let eye_uniform_bind_groups = [&eye_uniforms[0], &eye_uniforms[1]].map(|buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Eye Uniform Bind Group"),
                layout: &uniform_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        });

        // --- Textures ---
        let texture_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let arrow_texture = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Arrow Texture"),
                size: wgpu::Extent3d {
                    width: arrow.width().max(1),
                    height: arrow.height().max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            arrow.as_raw(),
        );
        let arrow_bind_group = texture_bind_group(
            &device,
            &texture_bind_group_layout,
            &arrow_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            &texture_sampler,
            "Arrow Bind Group",
        );

        let capture = create_capture_texture(&device, &texture_bind_group_layout, &texture_sampler, frame);

        // --- Pipelines ---
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });

        let scene_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[
                &uniform_bind_group_layout,
                &texture_bind_group_layout,
                &texture_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let scene_vertex_attributes = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];
        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&scene_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SceneVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &scene_vertex_attributes,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: EYE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(PlayerError::Shader {
                label: "scene",
                message: error.to_string(),
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let companion_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Companion Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/companion.wgsl").into()),
        });

        let companion_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Companion Pipeline Layout"),
            bind_group_layouts: &[&texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let companion_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Companion Pipeline"),
            layout: Some(&companion_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &companion_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &companion_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(PlayerError::Shader {
                label: "companion",
                message: error.to_string(),
            });
        }

        let eye_size = (eye_size.0.max(1), eye_size.1.max(1));
        let eye_targets = Eye::BOTH.map(|_| {
            create_eye_target(&device, &texture_bind_group_layout, &texture_sampler, eye_size)
        });

        let mesh = create_scene_mesh(&device, mesh);

        info!(
            "Renderer ready: companion {}x{} {:?}, eyes {}x{}",
            config.width, config.height, surface_format, eye_size.0, eye_size.1
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            vsync,
            scene_pipeline,
            eye_uniforms,
            eye_uniform_bind_groups,
            texture_bind_group_layout,
            texture_sampler,
            mesh,
            capture,
            arrow_texture,
            arrow_bind_group,
            eye_targets,
            companion_pipeline,
        })
    }

    /// Companion window resized
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Replace the scene vertex buffer.
    pub fn set_mesh(&mut self, mesh: &ProjectionMesh) {
        self.mesh = create_scene_mesh(&self.device, mesh);
        debug!("scene mesh replaced, {} vertices", self.mesh.vertex_count);
    }

    /// Reallocate the capture texture for a new source frame.
    pub fn resize_capture(&mut self, frame: SourceFrame) {
        self.capture = create_capture_texture(
            &self.device,
            &self.texture_bind_group_layout,
            &self.texture_sampler,
            frame,
        );
    }

    /// Upload a captured frame taken for `generation`. Returns false when the
    /// frame was taken for a texture that has since been replaced.
    pub fn upload_capture(&mut self, image: &RgbaImage, generation: FrameGeneration) -> bool {
        let capture = &self.capture;
        if !accepts_upload(capture.generation, generation) {
            debug!(
                "dropping capture for generation {} (texture is {})",
                generation.value(),
                capture.generation.value()
            );
            return false;
        }

        let Some((width, height)) = copy_extent(image.dimensions(), (capture.width, capture.height)) else {
            return false;
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &capture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width() * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        true
    }

    /// Draw the scene into both eye targets.
    pub fn render_eyes(&mut self, eyes: &[EyeFrame; 2]) {
        for (buffer, eye) in self.eye_uniforms.iter().zip(eyes) {
            self.queue
                .write_buffer(buffer, 0, bytemuck::bytes_of(&SceneUniforms::new(eye)));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Eye Encoder"),
        });

        for eye in Eye::BOTH {
            self.render_eye(&mut encoder, eye);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn render_eye(&self, encoder: &mut wgpu::CommandEncoder, eye: Eye) {
        let target = &self.eye_targets[eye.index()];

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Eye Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&self.scene_pipeline);
        render_pass.set_bind_group(0, &self.eye_uniform_bind_groups[eye.index()], &[]);
        render_pass.set_bind_group(1, &self.capture.bind_group, &[]);
        render_pass.set_bind_group(2, &self.arrow_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.mesh.buffer.slice(..));
        render_pass.draw(0..self.mesh.vertex_count, 0..1);
    }

    /// Show both eye images side by side in the companion window.
    pub fn present_companion(&mut self) {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                warn!("companion surface unavailable ({e}), reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return;
            }
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Companion Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Companion Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
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
            render_pass.set_pipeline(&self.companion_pipeline);

            let viewports = eye_viewports(self.config.width, self.config.height);
            for (target, (x, y, width, height)) in self.eye_targets.iter().zip(viewports) {
                render_pass.set_viewport(x, y, width, height, 0.0, 1.0);
                render_pass.set_bind_group(0, &target.companion_bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        if self.vsync {
            // wait for the GPU so frames are paced to the display
            let status = self.device.poll(wgpu::Maintain::Wait);
            if !status.is_queue_empty() {
                debug!("GPU queue still busy after vsync wait");
            }
        }
    }
}

fn texture_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    })
}

fn create_capture_texture(
    device: &Device,
    layout: &BindGroupLayout,
    sampler: &wgpu::Sampler,
    frame: SourceFrame,
) -> CaptureTexture {
    let width = frame.width.max(1);
    let height = frame.height.max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Capture Texture"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = texture_bind_group(device, layout, &view, sampler, "Capture Bind Group");

    CaptureTexture {
        texture,
        bind_group,
        width,
        height,
        generation: frame.generation,
    }
}

fn create_eye_target(
    device: &Device,
    layout: &BindGroupLayout,
    sampler: &wgpu::Sampler,
    (width, height): (u32, u32),
) -> EyeTarget {
    let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Eye Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: EYE_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Eye Depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

    let companion_bind_group = texture_bind_group(device, layout, &color_view, sampler, "Eye Bind Group");

    EyeTarget {
        color,
        color_view,
        depth_view,
        companion_bind_group,
    }
}

fn create_scene_mesh(device: &Device, mesh: &ProjectionMesh) -> SceneMesh {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Scene Vertex Buffer"),
        contents: bytemuck::cast_slice(&mesh.vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    SceneMesh {
        buffer,
        vertex_count: mesh.vertex_count(),
    }
}

/// Frames captured for an older texture allocation are dropped.
fn accepts_upload(texture: FrameGeneration, frame: FrameGeneration) -> bool {
    frame == texture
}

/// Region of a captured image that fits the capture texture. Between a window
/// resize and the texture reallocation the two can differ.
fn copy_extent(image: (u32, u32), texture: (u32, u32)) -> Option<(u32, u32)> {
    let width = image.0.min(texture.0);
    let height = image.1.min(texture.1);
    (width > 0 && height > 0).then_some((width, height))
}

/// Left and right halves of the companion window as (x, y, width, height)
fn eye_viewports(width: u32, height: u32) -> [(f32, f32, f32, f32); 2] {
    let half = (width / 2).max(1) as f32;
    let height = height.max(1) as f32;
    [(0.0, 0.0, half, height), (half, 0.0, half, height)]
}
