use crate::{BindGroupLayout, Context, IndexBuffer, RenderShader, VertexBuffer};

/// Describes one color attachment's format and blend state for a render
/// pipeline. A plain struct rather than the teacher's operator-composed
/// checkpoint DSL: the raycaster only ever draws into a single color
/// target, so the extra composition machinery bought nothing here.
pub struct ColorTarget {
    pub format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
}

impl ColorTarget {
    #[must_use]
    pub const fn opaque(format: wgpu::TextureFormat) -> Self {
        Self { format, blend: None }
    }

    #[must_use]
    pub const fn alpha_blend(format: wgpu::TextureFormat) -> Self {
        Self {
            format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
        }
    }
}

/// Builds a single-pass render pipeline drawing a vertex/fragment shader
/// pair over one or more bind groups into one color target.
pub struct RenderPipelineBuilder<'a> {
    shader: &'a RenderShader,
    target: ColorTarget,
    vertex_layout: Option<wgpu::VertexBufferLayout<'static>>,
    bind_layouts: Vec<&'a BindGroupLayout>,
}

impl<'a> RenderPipelineBuilder<'a> {
    #[must_use]
    pub fn new(shader: &'a RenderShader, target: ColorTarget) -> Self {
        Self {
            shader,
            target,
            vertex_layout: None,
            bind_layouts: Vec::new(),
        }
    }

    /// Declares the layout of the vertex buffer bound at slot 0.
    #[must_use]
    pub const fn vertex_layout(mut self, layout: wgpu::VertexBufferLayout<'static>) -> Self {
        self.vertex_layout = Some(layout);
        self
    }

    /// Appends a bind group layout, in `@group` index order.
    #[must_use]
    pub fn bind_group(mut self, layout: &'a BindGroupLayout) -> Self {
        self.bind_layouts.push(layout);
        self
    }

    pub fn build(self, ctx: &Context) -> RenderPipelineHandle {
        let bind_group_layouts: Vec<_> = self.bind_layouts.iter().map(|b| b.layout()).collect();
        let pipeline_layout = ctx
            .device()
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });

        let buffers: &[wgpu::VertexBufferLayout] = match &self.vertex_layout {
            Some(l) => std::slice::from_ref(l),
            None => &[],
        };

        let pipeline = ctx
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: None,
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: self.shader.module(),
                    entry_point: Some(self.shader.vs_entry()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: self.shader.module(),
                    entry_point: Some(self.shader.fs_entry()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target.format,
                        blend: self.target.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        RenderPipelineHandle { pipeline }
    }
}

/// A built render pipeline, ready to be recorded against a render pass.
pub struct RenderPipelineHandle {
    pipeline: wgpu::RenderPipeline,
}

impl RenderPipelineHandle {
    /// Records a fullscreen-triangle draw call against `view`, binding
    /// the supplied bind groups at their `@group` indices in order. The
    /// vertex shader generates its own three vertices from
    /// `@builtin(vertex_index)` — no vertex or index buffer is bound.
    pub fn draw(
        &self,
        ctx: &Context,
        view: &wgpu::TextureView,
        clear: Option<wgpu::Color>,
        bind_groups: &[&BindGroupLayout],
    ) {
        let mut encoder = ctx.encoder();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match clear {
                            Some(c) => wgpu::LoadOp::Clear(c),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            for (i, group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(i as u32, group.group(), &[]);
            }
            pass.draw(0..3, 0..1);
        }
        ctx.submit([encoder.finish()]);
    }

    /// Records an indexed-mesh draw call, for pipelines built with a
    /// `vertex_layout` (the Scene Host's textured quads; the raycast
    /// pipelines never use this).
    pub fn draw_mesh<T: bytemuck::Pod>(
        &self,
        ctx: &Context,
        view: &wgpu::TextureView,
        clear: Option<wgpu::Color>,
        bind_groups: &[&BindGroupLayout],
        vertices: &VertexBuffer<T>,
        indices: &IndexBuffer,
    ) {
        let mut encoder = ctx.encoder();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match clear {
                            Some(c) => wgpu::LoadOp::Clear(c),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            for (i, group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(i as u32, group.group(), &[]);
            }
            pass.set_vertex_buffer(0, vertices.slice());
            pass.set_index_buffer(indices.slice(), indices.format());
            pass.draw_indexed(0..indices.count(), 0, 0..1);
        }
        ctx.submit([encoder.finish()]);
    }
}
