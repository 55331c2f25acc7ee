//! A small builder-style wgpu abstraction layer.
//!
//! This crate exists so the rendering core never touches raw `wgpu` types
//! directly: contexts, buffers, textures and pipelines are constructed
//! through builders and exposed as small typed handles.

pub use wgpu::vertex_attr_array;

mod bind;
mod buffer;
mod ctx;
mod mem;
mod pipeline;
mod sampler;
mod shader;
mod texture;

pub use bind::{BindGroupLayout, Bindable, Bindings};
pub use buffer::{Buffer, IndexBuffer, StorageBuffer, Uniform, VertexBuffer};
pub use ctx::{Context, ContextBuilder};
pub use mem::MemMapper;
pub use pipeline::{ColorTarget, RenderPipelineBuilder, RenderPipelineHandle};
pub use sampler::Sampler;
pub use shader::{RenderShader, Shader};
pub use texture::{Texture, TextureBuilder};

pub mod global;

/// Error type for operations in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No compatible [`wgpu::Adapter`] was found.
    #[error("failed to find a compatible gpu adapter")]
    NoAdapter,
    /// Requesting a device from the adapter failed.
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// Linking a shader module into a pipeline failed.
    #[error("shader link failed: {0}")]
    ShaderLink(String),
}

/// Specialized [`std::result::Result`] alias for this crate.
pub type Result<T> = ::std::result::Result<T, Error>;
