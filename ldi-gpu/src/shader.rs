use crate::Context;

/// A compiled WGSL module, not yet tied to a pipeline.
pub struct Shader {
    module: wgpu::ShaderModule,
}

impl Shader {
    /// Compiles `source` as a WGSL module. `label` shows up in wgpu
    /// validation errors and GPU debugger captures.
    pub fn from_source(ctx: &Context, label: &str, source: &str) -> Self {
        let module = ctx.device().create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        Self { module }
    }

    #[inline]
    pub(crate) fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }
}

/// A shader paired with the vertex/fragment entry points a render
/// pipeline should link against.
pub struct RenderShader {
    shader: Shader,
    vs_entry: &'static str,
    fs_entry: &'static str,
}

impl RenderShader {
    pub fn new(ctx: &Context, label: &str, source: &str) -> Self {
        Self::with_entry_points(ctx, label, source, "vs_main", "fs_main")
    }

    pub fn with_entry_points(
        ctx: &Context,
        label: &str,
        source: &str,
        vs_entry: &'static str,
        fs_entry: &'static str,
    ) -> Self {
        Self {
            shader: Shader::from_source(ctx, label, source),
            vs_entry,
            fs_entry,
        }
    }

    #[inline]
    pub(crate) fn module(&self) -> &wgpu::ShaderModule {
        self.shader.module()
    }

    #[inline]
    pub(crate) fn vs_entry(&self) -> &str {
        self.vs_entry
    }

    #[inline]
    pub(crate) fn fs_entry(&self) -> &str {
        self.fs_entry
    }
}

/// Embeds a WGSL file relative to `src/` as a `&'static str`, the way
/// `include_str!` is used throughout this crate's pipeline constructors.
/// Kept as a macro (rather than a plain `include_str!` call at each use
/// site) so shader paths are declared next to the pipelines that use
/// them.
#[macro_export]
macro_rules! include_shader {
    ($path:literal) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/src/", $path))
    };
}
