//! C4: Shader Library.
//!
//! Collapses the spec's four named pipelines (`MN→MN`, `MN→ST`, `ST→MN`,
//! `ST→ST`) into a single [`PipelineKind`] over *input* view count — see
//! the design note in spec §9 ("inheritance of shader pipelines"). Output
//! view count (mono vs stereo) is not a shader concern at all: the
//! Renderer Core just calls [`ldi_gpu::RenderPipelineHandle::draw`] once
//! per output eye with a different render camera uniform.

const COMMON: &str = include_str!("shaders/common.wgsl");
const MONO_FRAG: &str = include_str!("shaders/mono.wgsl");
const STEREO_FRAG: &str = include_str!("shaders/stereo.wgsl");

/// Which input-view arity a pipeline was built for. The coarse-march
/// step count and whether binary refine runs both follow from this
/// (§4.4: `N_coarse` = 40 for mono input, 8 for stereo input; binary
/// refine only runs for stereo input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    MonoInput,
    StereoInput,
}

impl PipelineKind {
    pub fn from_view_count(views: usize) -> crate::Result<Self> {
        match views {
            1 => Ok(Self::MonoInput),
            2 => Ok(Self::StereoInput),
            n => Err(crate::Error::UnsupportedViewCount(n)),
        }
    }

    /// `N_coarse` per §4.4: 40 steps for mono input, 8 for stereo input
    /// (stereo affords fewer coarse steps because it also spends a
    /// binary-refine budget).
    pub const fn num_coarse(self) -> u32 {
        match self {
            Self::MonoInput => 40,
            Self::StereoInput => 8,
        }
    }

    /// `N_fine` per §4.4: binary refine only runs for stereo input.
    pub const fn num_fine(self) -> u32 {
        match self {
            Self::MonoInput => 0,
            Self::StereoInput => 5,
        }
    }

    /// Concatenates the shared preamble with this variant's fragment
    /// entry point into one WGSL module source.
    pub fn source(self) -> String {
        let frag = match self {
            Self::MonoInput => MONO_FRAG,
            Self::StereoInput => STEREO_FRAG,
        };
        format!("{COMMON}\n{frag}")
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::MonoInput => "ldi-raycast-mono",
            Self::StereoInput => "ldi-raycast-stereo",
        }
    }
}

#[cfg(feature = "gpu")]
pub use gpu::build_pipeline;

#[cfg(feature = "gpu")]
mod gpu {
    use super::PipelineKind;
    use ldi_gpu::{BindGroupLayout, ColorTarget, Context, RenderPipelineBuilder, RenderPipelineHandle, RenderShader};

    /// Compiles and links the render pipeline for `kind` against a
    /// single RGBA8 color target (the per-eye offscreen canvas).
    pub fn build_pipeline(
        ctx: &Context,
        kind: PipelineKind,
        target_format: wgpu::TextureFormat,
        bind_groups: &[&BindGroupLayout],
    ) -> RenderPipelineHandle {
        let shader = RenderShader::new(ctx, kind.label(), &kind.source());
        let mut builder = RenderPipelineBuilder::new(&shader, ColorTarget::opaque(target_format));
        for group in bind_groups {
            builder = builder.bind_group(group);
        }
        builder.build(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_input_disables_binary_refine() {
        assert_eq!(PipelineKind::MonoInput.num_fine(), 0);
        assert_eq!(PipelineKind::MonoInput.num_coarse(), 40);
    }

    #[test]
    fn stereo_input_enables_binary_refine() {
        assert_eq!(PipelineKind::StereoInput.num_fine(), 5);
        assert_eq!(PipelineKind::StereoInput.num_coarse(), 8);
    }

    #[test]
    fn view_count_maps_to_expected_kind() {
        assert_eq!(PipelineKind::from_view_count(1).unwrap(), PipelineKind::MonoInput);
        assert_eq!(PipelineKind::from_view_count(2).unwrap(), PipelineKind::StereoInput);
        assert!(PipelineKind::from_view_count(3).is_err());
    }

    #[test]
    fn source_concatenates_shared_preamble() {
        let src = PipelineKind::MonoInput.source();
        assert!(src.contains("fn vs_main"));
        assert!(src.contains("fn fs_main"));
    }
}
