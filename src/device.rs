use std::fmt;
use std::ops::Range;

use ash::vk;

use crate::descriptor::{DescriptorHandle, HeapKind, HeapLayout};
use crate::texture::{CopyBox, CopyFootprint, ResourceState, TextureDesc};

/// Pitch alignment for buffer-to-texture copies unless the device says otherwise.
pub const DEFAULT_COPY_PITCH_ALIGNMENT: u32 = 256;

/// Platform primitives the heaps and textures are built on.
///
/// Everything here either records into the current command stream or creates
/// and destroys GPU objects. Nothing in this trait waits on the GPU except
/// [`Device::wait_idle`].
pub trait Device {
    /// Owned handle to a GPU resource (texture or buffer).
    type Resource: fmt::Debug;

    fn create_descriptor_heap(
        &mut self,
        kind: HeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> anyhow::Result<HeapLayout>;

    /// Creates device-local texture storage already in `initial_state`.
    ///
    /// `clear_format` is the optimized clear format for render and depth targets.
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        initial_state: ResourceState,
        clear_format: Option<vk::Format>,
    ) -> anyhow::Result<Self::Resource>;

    /// Reads back how `resource` was created.
    fn describe(&self, resource: &Self::Resource) -> TextureDesc;

    fn create_shader_view(
        &mut self,
        resource: &Self::Resource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
    ) -> anyhow::Result<()>;

    fn create_render_view(
        &mut self,
        resource: &Self::Resource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
    ) -> anyhow::Result<()>;

    fn create_depth_view(
        &mut self,
        resource: &Self::Resource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
    ) -> anyhow::Result<()>;

    /// Creates a host-visible buffer used to stage texture uploads.
    fn create_upload_buffer(&mut self, size: u64) -> anyhow::Result<Self::Resource>;

    fn map(&mut self, buffer: &Self::Resource) -> anyhow::Result<&mut [u8]>;

    fn unmap(&mut self, buffer: &Self::Resource, written: Range<u64>);

    fn copy_region(
        &mut self,
        dst: &Self::Resource,
        src: &Self::Resource,
        footprint: &CopyFootprint,
        region: &CopyBox,
    );

    fn resource_barrier(&mut self, resource: &Self::Resource, old: ResourceState, new: ResourceState);

    /// Releases `resource` right away. The GPU must no longer reference it.
    fn destroy_resource(&mut self, resource: Self::Resource);

    /// Submits everything recorded so far; the batch signals `fence_value` on completion.
    fn submit(&mut self, fence_value: u64) -> anyhow::Result<()>;

    fn completed_fence(&self) -> u64;

    fn wait_idle(&mut self) -> anyhow::Result<()>;

    fn copy_pitch_alignment(&self) -> u32 {
        DEFAULT_COPY_PITCH_ALIGNMENT
    }
}
