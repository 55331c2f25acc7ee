use crate::Context;

/// Anything that can describe itself as a single bind group entry.
pub trait Bindable {
    fn binding_type(&self) -> wgpu::BindingType;
    fn resource(&self) -> BindResource<'_>;
}

pub enum BindResource<'a> {
    Buffer(&'a wgpu::Buffer),
    TextureView(wgpu::TextureView),
    Sampler(&'a wgpu::Sampler),
}

impl BindResource<'_> {
    fn as_wgpu(&self) -> wgpu::BindingResource<'_> {
        match self {
            Self::Buffer(b) => b.as_entire_binding(),
            Self::TextureView(v) => wgpu::BindingResource::TextureView(v),
            Self::Sampler(s) => wgpu::BindingResource::Sampler(s),
        }
    }
}

/// Accumulates bindables in binding-index order and realizes them into a
/// `(BindGroupLayout, BindGroup)` pair on [`Bindings::build`].
#[derive(Default)]
pub struct Bindings<'a> {
    stages: Vec<wgpu::ShaderStages>,
    types: Vec<wgpu::BindingType>,
    resources: Vec<BindResource<'a>>,
}

impl<'a> Bindings<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `item` visible to the given shader stages at the next slot.
    #[must_use]
    pub fn bind(mut self, item: &'a impl Bindable, stages: wgpu::ShaderStages) -> Self {
        self.types.push(item.binding_type());
        self.resources.push(item.resource());
        self.stages.push(stages);
        self
    }

    /// Binds `item` visible only to the fragment stage, the common case
    /// for the raycast pipelines (every uniform/texture/sampler they use
    /// is fragment-only; only vertex position data lives in the vertex
    /// stage).
    #[must_use]
    pub fn bind_frag(self, item: &'a impl Bindable) -> Self {
        self.bind(item, wgpu::ShaderStages::FRAGMENT)
    }

    pub fn build(self, ctx: &Context) -> BindGroupLayout {
        let layout = ctx
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &self
                    .types
                    .iter()
                    .zip(&self.stages)
                    .enumerate()
                    .map(|(i, (ty, vis))| wgpu::BindGroupLayoutEntry {
                        binding: i as u32,
                        visibility: *vis,
                        ty: *ty,
                        count: None,
                    })
                    .collect::<Vec<_>>(),
            });

        let group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries: &self
                .resources
                .iter()
                .enumerate()
                .map(|(i, r)| wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: r.as_wgpu(),
                })
                .collect::<Vec<_>>(),
        });

        BindGroupLayout { layout, group }
    }
}

/// The built layout and bound resources for one `@group` in a shader.
pub struct BindGroupLayout {
    layout: wgpu::BindGroupLayout,
    group: wgpu::BindGroup,
}

impl BindGroupLayout {
    #[inline]
    pub(crate) fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    #[inline]
    pub(crate) fn group(&self) -> &wgpu::BindGroup {
        &self.group
    }
}
