use std::collections::{HashMap, HashSet};
use std::ops::Range;

use anyhow::{Context as _, bail, ensure};
use ash::vk;
use slotmap::SlotMap;

use crate::descriptor::{DescriptorHandle, HeapKind, HeapLayout};
use crate::device::Device;
use crate::format::{is_depth_format, texel_size};
use crate::texture::{CopyBox, CopyFootprint, ResourceState, TextureDesc, log_state_transition};

use super::config::HeadlessConfig;
use super::keys::ResourceKey;

/// Device call that can be forced to fail once with [`HeadlessDevice::fail_next`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    DescriptorHeap,
    Storage,
    ShaderView,
    RenderView,
    DepthView,
    UploadBuffer,
    Map,
    Submit,
}

/// Owned handle to a resource living in a [`HeadlessDevice`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct HeadlessResource(ResourceKey);

impl HeadlessResource {
    #[inline]
    pub fn key(&self) -> ResourceKey {
        self.0
    }
}

/// What was written into a descriptor slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ViewRecord {
    pub resource: ResourceKey,
    pub format: vk::Format,
    pub multisampled: bool,
}

enum Storage {
    Texture {
        desc: TextureDesc,
        state: ResourceState,
        clear_format: Option<vk::Format>,
        texel_size: u32,
    },
    Buffer {
        mapped: bool,
    },
}

struct ResourceRecord {
    storage: Storage,
    data: Vec<u8>,
    /// Fence of the last submitted batch that referenced the resource.
    last_use: u64,
}

struct PendingCopy {
    dst: ResourceKey,
    src: ResourceKey,
    footprint: CopyFootprint,
    region: CopyBox,
}

/// Software device: textures are byte arrays, descriptor heaps are address ranges.
///
/// Copies are recorded and executed on `submit`. Barriers are checked against
/// the tracked state of the texture. Destroying a resource that a batch still in
/// flight references is counted as a premature destroy.
pub struct HeadlessDevice {
    config: HeadlessConfig,
    heap_count: u64,
    resources: SlotMap<ResourceKey, ResourceRecord>,
    views: HashMap<(HeapKind, u32), ViewRecord>,
    copies: Vec<PendingCopy>,
    referenced: HashSet<ResourceKey>,
    armed: HashSet<FailPoint>,
    submitted_fence: u64,
    completed_fence: u64,
    barrier_count: u64,
    write_barriers: u64,
    state_mismatches: u64,
    premature_destroys: u64,
    dangling_copies: u64,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl HeadlessDevice {
    pub fn new(config: HeadlessConfig) -> Self {
        log::trace!("Creating HeadlessDevice with {}", config);
        Self {
            config,
            heap_count: 0,
            resources: SlotMap::with_key(),
            views: HashMap::new(),
            copies: Vec::new(),
            referenced: HashSet::new(),
            armed: HashSet::new(),
            submitted_fence: 0,
            completed_fence: 0,
            barrier_count: 0,
            write_barriers: 0,
            state_mismatches: 0,
            premature_destroys: 0,
            dangling_copies: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    /// Makes the next call through `point` fail.
    pub fn fail_next(&mut self, point: FailPoint) {
        self.armed.insert(point);
    }

    /// Marks every batch up to `fence_value` as finished.
    pub fn complete_through(&mut self, fence_value: u64) {
        debug_assert!(
            fence_value <= self.submitted_fence,
            "fence {fence_value} was never submitted"
        );
        self.completed_fence = self.completed_fence.max(fence_value.min(self.submitted_fence));
    }

    #[inline]
    pub fn submitted_fence(&self) -> u64 {
        self.submitted_fence
    }

    #[inline]
    pub fn barrier_count(&self) -> u64 {
        self.barrier_count
    }

    /// Barriers that moved a texture into a state the GPU writes.
    #[inline]
    pub fn write_barrier_count(&self) -> u64 {
        self.write_barriers
    }

    /// Barriers whose `old` state did not match the tracked state.
    #[inline]
    pub fn state_mismatch_count(&self) -> u64 {
        self.state_mismatches
    }

    /// Resources destroyed while a batch that used them was still in flight.
    #[inline]
    pub fn premature_destroy_count(&self) -> u64 {
        self.premature_destroys
    }

    /// Copies that found their source or destination gone at execution time.
    #[inline]
    pub fn dangling_copy_count(&self) -> u64 {
        self.dangling_copies
    }

    #[inline]
    pub fn live_resource_count(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn pending_copy_count(&self) -> usize {
        self.copies.len()
    }

    pub fn is_alive(&self, key: ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// Tightly packed texel rows of a texture.
    pub fn texture_data(&self, resource: &HeadlessResource) -> Option<&[u8]> {
        let record = self.resources.get(resource.0)?;
        match record.storage {
            Storage::Texture { .. } => Some(&record.data),
            Storage::Buffer { .. } => None,
        }
    }

    pub fn resource_state(&self, resource: &HeadlessResource) -> Option<ResourceState> {
        match self.resources.get(resource.0)?.storage {
            Storage::Texture { state, .. } => Some(state),
            Storage::Buffer { .. } => None,
        }
    }

    pub fn clear_format(&self, resource: &HeadlessResource) -> Option<vk::Format> {
        match self.resources.get(resource.0)?.storage {
            Storage::Texture { clear_format, .. } => clear_format,
            Storage::Buffer { .. } => None,
        }
    }

    pub fn view(&self, kind: HeapKind, index: u32) -> Option<&ViewRecord> {
        self.views.get(&(kind, index))
    }

    fn take_failure(&mut self, point: FailPoint) -> anyhow::Result<()> {
        if self.armed.remove(&point) {
            bail!("injected {:?} failure", point);
        }
        Ok(())
    }

    fn write_view(
        &mut self,
        kind: HeapKind,
        resource: &HeadlessResource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
        required_usage: vk::ImageUsageFlags,
    ) -> anyhow::Result<()> {
        ensure!(slot.is_valid(), "{} view written to an invalid slot", kind);
        ensure!(format != vk::Format::UNDEFINED, "{} view needs a format", kind);

        let record = self
            .resources
            .get(resource.0)
            .with_context(|| format!("{} view of unknown resource {:?}", kind, resource))?;
        let Storage::Texture { desc, .. } = &record.storage else {
            bail!("{} view of a buffer", kind);
        };
        ensure!(
            desc.usage.contains(required_usage),
            "{} view needs {:?} usage, texture has {:?}",
            kind,
            required_usage,
            desc.usage
        );
        ensure!(
            multisampled == (desc.samples > 1),
            "{} view multisampled={} on a texture with {} samples",
            kind,
            multisampled,
            desc.samples
        );

        self.views.insert(
            (kind, slot.index),
            ViewRecord {
                resource: resource.0,
                format,
                multisampled,
            },
        );
        log::trace!("Wrote {} view {:?} {:?} into {}", kind, resource, format, slot);
        Ok(())
    }

    fn execute_copy(&mut self, copy: &PendingCopy) {
        let Some([dst, src]) = self.resources.get_disjoint_mut([copy.dst, copy.src]) else {
            log::error!("Copy into {:?} references a destroyed resource", copy.dst);
            self.dangling_copies += 1;
            return;
        };
        let Storage::Texture {
            desc, texel_size, ..
        } = &dst.storage
        else {
            log::error!("Copy destination {:?} is not a texture", copy.dst);
            return;
        };

        let texel = *texel_size as usize;
        let dst_row = desc.width as usize * texel;
        let footprint = &copy.footprint;
        let region = &copy.region;
        let row_bytes = (region.right - region.left) as usize * texel;

        for row in 0..(region.bottom - region.top) as usize {
            let src_start = footprint.offset as usize + row * footprint.row_pitch as usize;
            let dst_start = (region.top as usize + row) * dst_row + region.left as usize * texel;
            let (Some(from), Some(to)) = (
                src.data.get(src_start..src_start + row_bytes),
                dst.data.get_mut(dst_start..dst_start + row_bytes),
            ) else {
                log::error!("Copy row {} into {:?} is out of bounds", row, copy.dst);
                break;
            };
            to.copy_from_slice(from);
        }
    }
}

impl Device for HeadlessDevice {
    type Resource = HeadlessResource;

    fn create_descriptor_heap(
        &mut self,
        kind: HeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> anyhow::Result<HeapLayout> {
        self.take_failure(FailPoint::DescriptorHeap)?;
        ensure!(capacity > 0, "{} heap with zero capacity", kind);

        let offset = self.heap_count * self.config.heap_spacing;
        self.heap_count += 1;

        Ok(HeapLayout {
            cpu_base: self.config.cpu_heap_base + offset,
            gpu_base: shader_visible.then(|| self.config.gpu_heap_base + offset),
            capacity,
            stride: self.config.descriptor_stride,
        })
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        initial_state: ResourceState,
        clear_format: Option<vk::Format>,
    ) -> anyhow::Result<HeadlessResource> {
        self.take_failure(FailPoint::Storage)?;
        ensure!(
            desc.width > 0 && desc.height > 0,
            "texture of {}x{}",
            desc.width,
            desc.height
        );
        ensure!(desc.samples >= 1, "texture with {} samples", desc.samples);

        let texel = texel_size(desc.format).unwrap_or(0);
        let size = desc.width as usize * desc.height as usize * texel as usize;
        let key = self.resources.insert(ResourceRecord {
            storage: Storage::Texture {
                desc: *desc,
                state: initial_state,
                clear_format,
                texel_size: texel,
            },
            data: vec![0; size],
            last_use: 0,
        });

        log::trace!(
            "Created texture {:?}: {}x{} {:?} in {}",
            key,
            desc.width,
            desc.height,
            desc.format,
            initial_state
        );
        Ok(HeadlessResource(key))
    }

    fn describe(&self, resource: &HeadlessResource) -> TextureDesc {
        let record = self
            .resources
            .get(resource.0)
            .expect("describe: invalid HeadlessResource");
        match &record.storage {
            Storage::Texture { desc, .. } => *desc,
            Storage::Buffer { .. } => panic!("describe: {:?} is a buffer", resource),
        }
    }

    fn create_shader_view(
        &mut self,
        resource: &HeadlessResource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
    ) -> anyhow::Result<()> {
        self.take_failure(FailPoint::ShaderView)?;
        self.write_view(
            HeapKind::ShaderResource,
            resource,
            format,
            multisampled,
            slot,
            vk::ImageUsageFlags::SAMPLED,
        )
    }

    fn create_render_view(
        &mut self,
        resource: &HeadlessResource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
    ) -> anyhow::Result<()> {
        self.take_failure(FailPoint::RenderView)?;
        self.write_view(
            HeapKind::RenderTarget,
            resource,
            format,
            multisampled,
            slot,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )
    }

    fn create_depth_view(
        &mut self,
        resource: &HeadlessResource,
        format: vk::Format,
        multisampled: bool,
        slot: DescriptorHandle,
    ) -> anyhow::Result<()> {
        self.take_failure(FailPoint::DepthView)?;
        ensure!(is_depth_format(format), "{:?} is not a depth format", format);
        self.write_view(
            HeapKind::DepthStencil,
            resource,
            format,
            multisampled,
            slot,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn create_upload_buffer(&mut self, size: u64) -> anyhow::Result<HeadlessResource> {
        self.take_failure(FailPoint::UploadBuffer)?;
        ensure!(size > 0, "upload buffer of zero bytes");
        let len = usize::try_from(size).context("upload buffer size overflows usize")?;

        let key = self.resources.insert(ResourceRecord {
            storage: Storage::Buffer { mapped: false },
            data: vec![0; len],
            last_use: 0,
        });
        log::trace!("Created upload buffer {:?} of {} bytes", key, size);
        Ok(HeadlessResource(key))
    }

    fn map(&mut self, buffer: &HeadlessResource) -> anyhow::Result<&mut [u8]> {
        self.take_failure(FailPoint::Map)?;

        let record = self
            .resources
            .get_mut(buffer.0)
            .with_context(|| format!("map of unknown resource {:?}", buffer))?;
        match &mut record.storage {
            Storage::Buffer { mapped } => {
                ensure!(!*mapped, "{:?} is already mapped", buffer);
                *mapped = true;
            }
            Storage::Texture { .. } => bail!("{:?} is a texture and cannot be mapped", buffer),
        }
        Ok(record.data.as_mut_slice())
    }

    fn unmap(&mut self, buffer: &HeadlessResource, written: Range<u64>) {
        let Some(record) = self.resources.get_mut(buffer.0) else {
            log::error!("unmap of unknown resource {:?}", buffer);
            return;
        };
        debug_assert!(
            written.end <= record.data.len() as u64,
            "written range {:?} exceeds buffer of {} bytes",
            written,
            record.data.len()
        );
        match &mut record.storage {
            Storage::Buffer { mapped } if *mapped => *mapped = false,
            _ => log::warn!("unmap of {:?} which is not mapped", buffer),
        }
    }

    fn copy_region(
        &mut self,
        dst: &HeadlessResource,
        src: &HeadlessResource,
        footprint: &CopyFootprint,
        region: &CopyBox,
    ) {
        self.referenced.insert(dst.0);
        self.referenced.insert(src.0);
        self.copies.push(PendingCopy {
            dst: dst.0,
            src: src.0,
            footprint: *footprint,
            region: *region,
        });
    }

    fn resource_barrier(&mut self, resource: &HeadlessResource, old: ResourceState, new: ResourceState) {
        let Some(record) = self.resources.get_mut(resource.0) else {
            log::error!("Barrier on unknown resource {:?}", resource);
            return;
        };
        let Storage::Texture { state, .. } = &mut record.storage else {
            log::error!("Barrier on buffer {:?}", resource);
            return;
        };

        if *state != old {
            log::error!(
                "Barrier on {:?} from {} but the texture is in {}",
                resource,
                old,
                state
            );
            self.state_mismatches += 1;
        }
        *state = new;
        self.barrier_count += 1;
        if new.is_write() {
            self.write_barriers += 1;
        }
        self.referenced.insert(resource.0);

        if log::log_enabled!(log::Level::Debug) {
            log_state_transition(old, new, &format!("{:?}", resource.0));
        }
    }

    fn destroy_resource(&mut self, resource: HeadlessResource) {
        let key = resource.0;
        let Some(record) = self.resources.remove(key) else {
            log::error!("Destroy of unknown resource {:?}", key);
            return;
        };

        if record.last_use > self.completed_fence || self.referenced.contains(&key) {
            log::error!(
                "{:?} destroyed while in use (last use fence {}, completed {})",
                key,
                record.last_use,
                self.completed_fence
            );
            self.premature_destroys += 1;
        }
        self.views.retain(|_, view| view.resource != key);
        log::trace!("Destroyed {:?}", key);
    }

    fn submit(&mut self, fence_value: u64) -> anyhow::Result<()> {
        self.take_failure(FailPoint::Submit)?;
        ensure!(
            fence_value > self.submitted_fence,
            "fence {} submitted after {}",
            fence_value,
            self.submitted_fence
        );

        for copy in std::mem::take(&mut self.copies) {
            self.execute_copy(&copy);
        }
        for key in self.referenced.drain() {
            if let Some(record) = self.resources.get_mut(key) {
                record.last_use = fence_value;
            }
        }

        self.submitted_fence = fence_value;
        if self.config.auto_complete {
            self.completed_fence = fence_value;
        }
        log::trace!("Submitted batch {}", fence_value);
        Ok(())
    }

    fn completed_fence(&self) -> u64 {
        self.completed_fence
    }

    fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.completed_fence = self.submitted_fence;
        Ok(())
    }

    fn copy_pitch_alignment(&self) -> u32 {
        self.config.copy_pitch_alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampled_desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            samples: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            dynamic: false,
        }
    }

    #[test]
    fn heaps_are_laid_out_from_the_configured_base() {
        let mut device = HeadlessDevice::default();
        let srv = device
            .create_descriptor_heap(HeapKind::ShaderResource, 4, true)
            .unwrap();
        let rtv = device
            .create_descriptor_heap(HeapKind::RenderTarget, 4, false)
            .unwrap();

        assert_eq!(srv.cpu_base, 0x1000);
        assert_eq!(srv.gpu_base, Some(0x1_0000_0000));
        assert_eq!(srv.stride, 16);
        assert_eq!(rtv.cpu_base, 0x1000 + 0x10_0000);
        assert_eq!(rtv.gpu_base, None);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut device = HeadlessDevice::default();
        device.fail_next(FailPoint::UploadBuffer);
        assert!(device.create_upload_buffer(64).is_err());
        let buffer = device.create_upload_buffer(64).unwrap();
        device.destroy_resource(buffer);
        assert_eq!(device.live_resource_count(), 0);
    }

    #[test]
    fn copy_honours_row_pitch() {
        let mut device = HeadlessDevice::default();
        let texture = device
            .create_texture(&sampled_desc(2, 2), ResourceState::CopyDestination, None)
            .unwrap();
        let buffer = device.create_upload_buffer(512).unwrap();

        let staged = device.map(&buffer).unwrap();
        staged[..8].copy_from_slice(&[1; 8]);
        staged[256..264].copy_from_slice(&[2; 8]);
        device.unmap(&buffer, 0..512);

        let footprint = CopyFootprint {
            offset: 0,
            width: 2,
            height: 2,
            depth: 1,
            row_pitch: 256,
            format: vk::Format::R8G8B8A8_UNORM,
        };
        device.copy_region(&texture, &buffer, &footprint, &CopyBox::full(2, 2));
        assert_eq!(device.pending_copy_count(), 1);
        device.submit(1).unwrap();

        let data = device.texture_data(&texture).unwrap();
        assert_eq!(&data[..8], &[1; 8]);
        assert_eq!(&data[8..], &[2; 8]);

        device.destroy_resource(buffer);
        device.destroy_resource(texture);
        assert_eq!(device.premature_destroy_count(), 0);
    }

    #[test]
    fn destroying_in_flight_resource_is_counted() {
        let mut device = HeadlessDevice::new(HeadlessConfig::default().auto_complete(false));
        let texture = device
            .create_texture(&sampled_desc(1, 1), ResourceState::ShaderReadable, None)
            .unwrap();
        device.resource_barrier(&texture, ResourceState::ShaderReadable, ResourceState::CopySource);
        device.submit(1).unwrap();
        assert_eq!(device.completed_fence(), 0);

        device.destroy_resource(texture);
        assert_eq!(device.premature_destroy_count(), 1);
    }

    #[test]
    fn barrier_from_wrong_state_is_counted() {
        let mut device = HeadlessDevice::default();
        let texture = device
            .create_texture(&sampled_desc(1, 1), ResourceState::ShaderReadable, None)
            .unwrap();
        device.resource_barrier(&texture, ResourceState::RenderTarget, ResourceState::CopySource);
        assert_eq!(device.state_mismatch_count(), 1);
        assert_eq!(device.resource_state(&texture), Some(ResourceState::CopySource));
        device.destroy_resource(texture);
    }

    #[test]
    fn view_requires_matching_usage() {
        let mut device = HeadlessDevice::default();
        let texture = device
            .create_texture(&sampled_desc(1, 1), ResourceState::ShaderReadable, None)
            .unwrap();
        let slot = DescriptorHandle {
            cpu_address: 0x1000,
            gpu_address: 0,
            index: 0,
        };
        assert!(device
            .create_render_view(&texture, vk::Format::R8G8B8A8_UNORM, false, slot)
            .is_err());
        device
            .create_shader_view(&texture, vk::Format::R8G8B8A8_UNORM, false, slot)
            .unwrap();
        assert_eq!(
            device.view(HeapKind::ShaderResource, 0).map(|v| v.resource),
            Some(texture.key())
        );

        device.destroy_resource(texture);
        assert!(device.view(HeapKind::ShaderResource, 0).is_none());
    }
}
