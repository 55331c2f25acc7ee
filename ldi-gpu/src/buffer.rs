use std::marker::PhantomData;

use encase::{ShaderType, StorageBuffer as EncaseStorage, UniformBuffer as EncaseUniform};
use wgpu::util::DeviceExt;

use crate::{Bindable, Context};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Uniform,
    Storage { writable: bool },
    Vertex,
    Index,
    Staging,
}

/// An untyped wgpu buffer tagged with the role it was created for. Typed
/// wrappers below (`Uniform<T>`, `StorageBuffer<T>`, ...) hold one of
/// these and add the encase (de)serialization and `Bindable` surface.
pub struct Buffer {
    raw: wgpu::Buffer,
    kind: Kind,
}

impl Buffer {
    #[inline]
    pub(crate) fn raw(&self) -> &wgpu::Buffer {
        &self.raw
    }

    #[inline]
    pub(crate) fn is_uniform(&self) -> bool {
        matches!(self.kind, Kind::Uniform)
    }

    #[inline]
    pub(crate) fn is_writable_by_shader(&self) -> bool {
        matches!(self.kind, Kind::Storage { writable: true })
    }

    pub fn len(&self) -> u64 {
        self.raw.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a host-mappable buffer of `size` bytes, the destination
    /// for a `copy_texture_to_buffer`/`copy_buffer_to_buffer` a caller
    /// then reads with [`crate::MemMapper`].
    pub fn new_staging(ctx: &Context, size: u64) -> Self {
        create_sized(ctx, Kind::Staging, size)
    }
}

impl Bindable for Buffer {
    fn binding_type(&self) -> wgpu::BindingType {
        let ty = if self.is_uniform() {
            wgpu::BufferBindingType::Uniform
        } else {
            wgpu::BufferBindingType::Storage {
                read_only: !self.is_writable_by_shader(),
            }
        };
        wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        }
    }

    fn resource(&self) -> crate::bind::BindResource<'_> {
        crate::bind::BindResource::Buffer(&self.raw)
    }
}

fn usage_for(kind: Kind) -> wgpu::BufferUsages {
    use wgpu::BufferUsages as U;
    match kind {
        Kind::Uniform => U::UNIFORM | U::COPY_DST,
        Kind::Storage { .. } => U::STORAGE | U::COPY_DST | U::COPY_SRC,
        Kind::Vertex => U::VERTEX | U::COPY_DST,
        Kind::Index => U::INDEX | U::COPY_DST,
        Kind::Staging => U::MAP_READ | U::COPY_DST,
    }
}

fn create_init(ctx: &Context, kind: Kind, bytes: &[u8]) -> Buffer {
    let raw = ctx
        .device()
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: bytes,
            usage: usage_for(kind),
        });
    Buffer { raw, kind }
}

fn create_sized(ctx: &Context, kind: Kind, size: u64) -> Buffer {
    let raw = ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: None,
        size,
        usage: usage_for(kind),
        mapped_at_creation: false,
    });
    Buffer { raw, kind }
}

/// A uniform buffer holding a single `T`, encoded with std140 layout via
/// `encase`. `T` must derive [`ShaderType`] so its WGSL-compatible size
/// and alignment are known.
pub struct Uniform<T> {
    buf: Buffer,
    _marker: PhantomData<T>,
}

impl<T: ShaderType + encase::internal::WriteInto> Uniform<T> {
    pub fn new(ctx: &Context, value: &T) -> Self {
        let mut encoded = EncaseUniform::new(Vec::new());
        encoded.write(value).expect("uniform encode");
        Self {
            buf: create_init(ctx, Kind::Uniform, &encoded.into_inner()),
            _marker: PhantomData,
        }
    }

    /// Overwrites the buffer contents in place. The new value must encode
    /// to the same size as the one the buffer was created with.
    pub fn write(&self, ctx: &Context, value: &T) {
        let mut encoded = EncaseUniform::new(Vec::new());
        encoded.write(value).expect("uniform encode");
        ctx.queue().write_buffer(&self.buf.raw, 0, &encoded.into_inner());
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }
}

impl<T> crate::Bindable for Uniform<T> {
    fn binding_type(&self) -> wgpu::BindingType {
        self.buf.binding_type()
    }
    fn resource(&self) -> crate::bind::BindResource<'_> {
        self.buf.resource()
    }
}

/// A read-only (from the shader's perspective) or read-write storage
/// buffer holding a sequence of `T`.
pub struct StorageBuffer<T> {
    buf: Buffer,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: ShaderType + encase::internal::WriteInto> StorageBuffer<T> {
    pub fn new(ctx: &Context, values: &[T]) -> Self {
        let mut encoded = EncaseStorage::new(Vec::new());
        encoded.write(&values).expect("storage encode");
        Self {
            buf: create_init(ctx, Kind::Storage { writable: false }, &encoded.into_inner()),
            len: values.len(),
            _marker: PhantomData,
        }
    }

    /// Allocates an uninitialized, shader-writable buffer sized for
    /// `count` elements of `T`. Used for compute/render targets the
    /// renderer reads back rather than populates up front.
    pub fn new_writable(ctx: &Context, element_size: u64, count: usize) -> Self {
        Self {
            buf: create_sized(
                ctx,
                Kind::Storage { writable: true },
                element_size * count as u64,
            ),
            len: count,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Overwrites the buffer contents in place. `values.len()` must equal
    /// the length the buffer was created with.
    pub fn write(&self, ctx: &Context, values: &[T]) {
        let mut encoded = EncaseStorage::new(Vec::new());
        encoded.write(&values).expect("storage encode");
        ctx.queue().write_buffer(&self.buf.raw, 0, &encoded.into_inner());
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }
}

impl<T> crate::Bindable for StorageBuffer<T> {
    fn binding_type(&self) -> wgpu::BindingType {
        self.buf.binding_type()
    }
    fn resource(&self) -> crate::bind::BindResource<'_> {
        self.buf.resource()
    }
}

/// A vertex buffer of `T`, laid out with `bytemuck::Pod` plain-old-data
/// encoding rather than encase (vertex buffers are never read in a WGSL
/// uniform/storage address space, so std140 layout rules don't apply).
pub struct VertexBuffer<T> {
    buf: Buffer,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> VertexBuffer<T> {
    pub fn new(ctx: &Context, values: &[T]) -> Self {
        Self {
            buf: create_init(ctx, Kind::Vertex, bytemuck::cast_slice(values)),
            len: values.len(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buf.raw.slice(..)
    }
}

/// An index buffer of `u16` or `u32` indices.
pub struct IndexBuffer {
    buf: Buffer,
    len: u32,
    format: wgpu::IndexFormat,
}

impl IndexBuffer {
    pub fn new_u16(ctx: &Context, indices: &[u16]) -> Self {
        Self {
            buf: create_init(ctx, Kind::Index, bytemuck::cast_slice(indices)),
            len: indices.len() as u32,
            format: wgpu::IndexFormat::Uint16,
        }
    }

    pub fn new_u32(ctx: &Context, indices: &[u32]) -> Self {
        Self {
            buf: create_init(ctx, Kind::Index, bytemuck::cast_slice(indices)),
            len: indices.len() as u32,
            format: wgpu::IndexFormat::Uint32,
        }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.len
    }

    #[inline]
    pub(crate) fn format(&self) -> wgpu::IndexFormat {
        self.format
    }

    #[inline]
    pub(crate) fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buf.raw.slice(..)
    }
}
