use gpu::{DrawCommand, RenderCommand};

/// Group 0 block shared by every quad program.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Globals {
    pub view_proj: [[f32; 4]; 4],
    pub origin: [f32; 4],
    pub size: [f32; 4],
}

/// Globals for one quad draw; `None` for anything that is not a quad.
pub fn quad_globals(view_proj: [[f32; 4]; 4], draw: &DrawCommand) -> Option<Globals> {
    let RenderCommand::Quad { size, .. } = &draw.command else {
        return None;
    };
    let t = &draw.transform;
    Some(Globals {
        view_proj,
        origin: [t.position.x as f32, t.position.y as f32, t.position.z as f32, 0.0],
        size: [(size.x * t.scale.x) as f32, (size.y * t.scale.y) as f32, 0.0, 0.0],
    })
}

/// Packed params for a quad. Uniform buffers may not be empty, so a set with
/// only textures still gets one zeroed slot.
pub fn quad_params(draw: &DrawCommand) -> Vec<f32> {
    let mut packed = match &draw.command {
        RenderCommand::Quad { uniforms, .. } => uniforms.pack(),
        RenderCommand::Mesh { .. } => Vec::new(),
    };
    if packed.is_empty() {
        packed.resize(4, 0.0);
    }
    packed
}

#[cfg(target_arch = "wasm32")]
mod imp {
    use ::wgpu::util::DeviceExt;
    use std::borrow::Cow;
    use std::collections::BTreeMap;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;

    use effects::shaders;
    use gpu::{BackendError, DrawBackend, RenderCommand, RenderFrame, SurfaceSize, TextureData};
    use scene::components::ResourceId;

    use super::{quad_globals, quad_params};

    struct Program {
        pipeline: ::wgpu::RenderPipeline,
        params_layout: ::wgpu::BindGroupLayout,
        texture_count: usize,
    }

    pub struct WgpuBackend {
        _instance: &'static ::wgpu::Instance,
        surface: ::wgpu::Surface<'static>,
        device: ::wgpu::Device,
        queue: ::wgpu::Queue,
        config: ::wgpu::SurfaceConfiguration,
        _canvas: web_sys::HtmlCanvasElement,
        globals_layout: ::wgpu::BindGroupLayout,
        programs: BTreeMap<&'static str, Program>,
        sampler: ::wgpu::Sampler,
        placeholder: ::wgpu::TextureView,
        textures: BTreeMap<ResourceId, ::wgpu::TextureView>,
    }

    fn create_texture(
        device: &::wgpu::Device,
        queue: &::wgpu::Queue,
        label: &str,
        data: &TextureData,
    ) -> ::wgpu::TextureView {
        let tex = device.create_texture_with_data(
            queue,
            &::wgpu::TextureDescriptor {
                label: Some(label),
                size: ::wgpu::Extent3d {
                    width: data.width.max(1),
                    height: data.height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: ::wgpu::TextureDimension::D2,
                format: ::wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: ::wgpu::TextureUsages::TEXTURE_BINDING | ::wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            ::wgpu::util::TextureDataOrder::LayerMajor,
            &data.rgba,
        );
        tex.create_view(&::wgpu::TextureViewDescriptor::default())
    }

    fn params_layout(device: &::wgpu::Device, program: &str, textures: usize) -> ::wgpu::BindGroupLayout {
        let mut entries = vec![
            ::wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ::wgpu::ShaderStages::FRAGMENT,
                ty: ::wgpu::BindingType::Buffer {
                    ty: ::wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            ::wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: ::wgpu::ShaderStages::FRAGMENT,
                ty: ::wgpu::BindingType::Sampler(::wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for i in 0..textures {
            entries.push(::wgpu::BindGroupLayoutEntry {
                binding: 2 + i as u32,
                visibility: ::wgpu::ShaderStages::FRAGMENT,
                ty: ::wgpu::BindingType::Texture {
                    sample_type: ::wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: ::wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{program}-params-bgl")),
            entries: &entries,
        })
    }

    fn build_program(
        device: &::wgpu::Device,
        format: ::wgpu::TextureFormat,
        globals_layout: &::wgpu::BindGroupLayout,
        program: &'static str,
        source: &'static str,
    ) -> Program {
        let texture_count = shaders::texture_count(program);
        let params_layout = params_layout(device, program, texture_count);
        let module = device.create_shader_module(::wgpu::ShaderModuleDescriptor {
            label: Some(program),
            source: ::wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let layout = device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
            label: Some(program),
            bind_group_layouts: &[globals_layout, &params_layout],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&::wgpu::RenderPipelineDescriptor {
            label: Some(program),
            layout: Some(&layout),
            vertex: ::wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(::wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(::wgpu::ColorTargetState {
                    format,
                    blend: Some(::wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: ::wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: ::wgpu::PrimitiveState {
                topology: ::wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: ::wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: ::wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            // Quads are ordered by z-order on the CPU; no depth buffer.
            depth_stencil: None,
            multisample: ::wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        Program {
            pipeline,
            params_layout,
            texture_count,
        }
    }

    pub async fn init_backend(canvas_id: &str) -> Result<WgpuBackend, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("window missing"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document missing"))?;
        let canvas = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas missing"))?
            .dyn_into::<web_sys::HtmlCanvasElement>()?;

        // `wgpu::Surface` must not outlive its instance; the instance lives
        // for the rest of the page.
        let instance: &'static ::wgpu::Instance = Box::leak(Box::new(::wgpu::Instance::new(
            &::wgpu::InstanceDescriptor {
                backends: ::wgpu::Backends::BROWSER_WEBGPU | ::wgpu::Backends::GL,
                ..Default::default()
            },
        )));

        let surface = instance
            .create_surface(::wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .map_err(|e| JsValue::from_str(&format!("surface error: {e}")))?;

        let adapter = instance
            .request_adapter(&::wgpu::RequestAdapterOptions {
                power_preference: ::wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| JsValue::from_str(&format!("adapter error: {e}")))?;

        let (device, queue) = adapter
            .request_device(&::wgpu::DeviceDescriptor {
                label: Some("surface-device"),
                required_features: ::wgpu::Features::empty(),
                required_limits: ::wgpu::Limits::downlevel_webgl2_defaults(),
                ..Default::default()
            })
            .await
            .map_err(|e| JsValue::from_str(&format!("device error: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .cloned()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().cloned())
            .ok_or_else(|| JsValue::from_str("surface has no formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .iter()
            .cloned()
            .find(|m| *m == ::wgpu::CompositeAlphaMode::PreMultiplied)
            .unwrap_or(::wgpu::CompositeAlphaMode::Auto);

        let config = ::wgpu::SurfaceConfiguration {
            usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: canvas.width().max(1),
            height: canvas.height().max(1),
            desired_maximum_frame_latency: 2,
            present_mode: ::wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let globals_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("globals-bgl"),
            entries: &[::wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ::wgpu::ShaderStages::VERTEX,
                ty: ::wgpu::BindingType::Buffer {
                    ty: ::wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let mut programs = BTreeMap::new();
        for program in [shaders::GLASS, shaders::FLUID, shaders::DISTORTION, shaders::CAROUSEL] {
            if let Some(source) = shaders::source(program) {
                programs.insert(
                    program,
                    build_program(&device, format, &globals_layout, program, source),
                );
            }
        }

        let sampler = device.create_sampler(&::wgpu::SamplerDescriptor {
            label: Some("linear-sampler"),
            address_mode_u: ::wgpu::AddressMode::ClampToEdge,
            address_mode_v: ::wgpu::AddressMode::ClampToEdge,
            mag_filter: ::wgpu::FilterMode::Linear,
            min_filter: ::wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let placeholder = create_texture(&device, &queue, "placeholder", &TextureData::solid([0, 0, 0, 0]));

        Ok(WgpuBackend {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            _canvas: canvas,
            globals_layout,
            programs,
            sampler,
            placeholder,
            textures: BTreeMap::new(),
        })
    }

    impl DrawBackend for WgpuBackend {
        fn resize(&mut self, size: SurfaceSize) {
            self.config.width = size.physical_width();
            self.config.height = size.physical_height();
            self.surface.configure(&self.device, &self.config);
        }

        fn upload_texture(&mut self, id: ResourceId, data: &TextureData) -> Result<(), BackendError> {
            if !data.is_valid() {
                return Err(BackendError::Upload {
                    id,
                    reason: format!("{}x{} image with {} bytes", data.width, data.height, data.rgba.len()),
                });
            }
            let view = create_texture(&self.device, &self.queue, &id.to_string(), data);
            self.textures.insert(id, view);
            Ok(())
        }

        fn draw(&mut self, frame: &RenderFrame) -> Result<(), BackendError> {
            let target = self.surface.get_current_texture().map_err(|e| match e {
                ::wgpu::SurfaceError::Lost | ::wgpu::SurfaceError::Outdated => BackendError::ContextLost,
                other => BackendError::Draw(other.to_string()),
            })?;
            let view = target
                .texture
                .create_view(&::wgpu::TextureViewDescriptor::default());

            // Bind groups must outlive the pass that references them.
            let mut binds = Vec::with_capacity(frame.commands.len());
            for draw in &frame.commands {
                let RenderCommand::Quad { program, uniforms, .. } = &draw.command else {
                    tracing::trace!(mount = %draw.mount, "mesh draws are not supported");
                    continue;
                };
                let (Some(compiled), Some(globals)) =
                    (self.programs.get(program), quad_globals(frame.view_proj, draw))
                else {
                    tracing::warn!(mount = %draw.mount, program, "unknown program");
                    continue;
                };
                let globals_buffer = self.device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some("quad-globals"),
                    contents: bytemuck::bytes_of(&globals),
                    usage: ::wgpu::BufferUsages::UNIFORM,
                });
                let params_buffer = self.device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some("quad-params"),
                    contents: bytemuck::cast_slice(&quad_params(draw)),
                    usage: ::wgpu::BufferUsages::UNIFORM,
                });
                let globals_group = self.device.create_bind_group(&::wgpu::BindGroupDescriptor {
                    label: Some("quad-globals-bg"),
                    layout: &self.globals_layout,
                    entries: &[::wgpu::BindGroupEntry {
                        binding: 0,
                        resource: globals_buffer.as_entire_binding(),
                    }],
                });
                let texture_views: Vec<&::wgpu::TextureView> = uniforms
                    .texture_slots()
                    .take(compiled.texture_count)
                    .map(|(_, id)| id.and_then(|id| self.textures.get(&id)).unwrap_or(&self.placeholder))
                    .collect();
                let mut entries = vec![
                    ::wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    ::wgpu::BindGroupEntry {
                        binding: 1,
                        resource: ::wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ];
                for i in 0..compiled.texture_count {
                    let view = texture_views.get(i).copied().unwrap_or(&self.placeholder);
                    entries.push(::wgpu::BindGroupEntry {
                        binding: 2 + i as u32,
                        resource: ::wgpu::BindingResource::TextureView(view),
                    });
                }
                let params_group = self.device.create_bind_group(&::wgpu::BindGroupDescriptor {
                    label: Some("quad-params-bg"),
                    layout: &compiled.params_layout,
                    entries: &entries,
                });
                binds.push((&compiled.pipeline, globals_group, params_group));
            }

            let mut encoder = self
                .device
                .create_command_encoder(&::wgpu::CommandEncoderDescriptor {
                    label: Some("surface-encoder"),
                });
            {
                let [r, g, b, a] = frame.clear_color;
                let mut rpass = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
                    label: Some("surface-pass"),
                    color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        depth_slice: None,
                        ops: ::wgpu::Operations {
                            load: ::wgpu::LoadOp::Clear(::wgpu::Color {
                                r: f64::from(r),
                                g: f64::from(g),
                                b: f64::from(b),
                                a: f64::from(a),
                            }),
                            store: ::wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });
                for (pipeline, globals_group, params_group) in &binds {
                    rpass.set_pipeline(pipeline);
                    rpass.set_bind_group(0, globals_group, &[]);
                    rpass.set_bind_group(1, params_group, &[]);
                    rpass.draw(0..6, 0..1);
                }
            }
            self.queue.submit(std::iter::once(encoder.finish()));
            target.present();
            Ok(())
        }

        fn release(&mut self, id: ResourceId) {
            self.textures.remove(&id);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use gpu::{BackendError, DrawBackend, RenderFrame, SurfaceSize, TextureData};
    use scene::components::ResourceId;
    use wasm_bindgen::prelude::JsValue;

    #[derive(Debug, Default)]
    pub struct WgpuBackend;

    pub async fn init_backend(_canvas_id: &str) -> Result<WgpuBackend, JsValue> {
        Err(JsValue::from_str(
            "wgpu initialization is only available on wasm32 targets",
        ))
    }

    impl DrawBackend for WgpuBackend {
        fn resize(&mut self, _size: SurfaceSize) {}

        fn upload_texture(&mut self, _id: ResourceId, _data: &TextureData) -> Result<(), BackendError> {
            Err(BackendError::ContextLost)
        }

        fn draw(&mut self, _frame: &RenderFrame) -> Result<(), BackendError> {
            Err(BackendError::ContextLost)
        }

        fn release(&mut self, _id: ResourceId) {}
    }
}

pub use imp::{WgpuBackend, init_backend};

#[cfg(test)]
mod tests {
    use super::{quad_globals, quad_params};
    use foundation::{Handle, Id};
    use foundation::math::{Vec2, Vec3};
    use gpu::{DrawCommand, RenderCommand};
    use pretty_assertions::assert_eq;
    use scene::NodeId;
    use scene::components::{ResourceId, Transform, UniformSet, UniformValue};

    fn quad(uniforms: UniformSet) -> DrawCommand {
        DrawCommand {
            mount: Id::new("card"),
            node: NodeId(Handle::new(0, 0)),
            z_order: 0,
            transform: Transform::translate(Vec3::new(1.0, -2.0, 0.5)).with_scale(Vec2::new(2.0, 3.0)),
            command: RenderCommand::Quad {
                program: "glass",
                size: Vec2::new(1.5, 1.0),
                uniforms,
            },
        }
    }

    #[test]
    fn globals_carry_world_origin_and_scaled_size() {
        let draw = quad(UniformSet::new(&[("uTime", UniformValue::Float(0.0))]).unwrap());
        let g = quad_globals([[0.0; 4]; 4], &draw).unwrap();
        assert_eq!(g.origin, [1.0, -2.0, 0.5, 0.0]);
        assert_eq!(g.size, [3.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn texture_only_params_get_one_slot() {
        let draw = quad(UniformSet::new(&[("uTexture", UniformValue::Texture(Some(ResourceId(3))))]).unwrap());
        assert_eq!(quad_params(&draw), vec![0.0; 4]);
    }

    #[test]
    fn meshes_have_no_quad_globals() {
        let mut draw = quad(UniformSet::default());
        draw.command = RenderCommand::Mesh {
            geometry: ResourceId(1),
            material: ResourceId(2),
        };
        assert!(quad_globals([[0.0; 4]; 4], &draw).is_none());
    }
}
