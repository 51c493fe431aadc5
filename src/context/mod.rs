mod config;
mod deferred;

use anyhow::Context as _;

pub use config::ContextConfig;
pub use deferred::{DeferredDestructionQueue, Release};

use crate::descriptor::{DescriptorHeapManager, HeapKind};
use crate::device::Device;

/// Owns the device, the descriptor heaps, and the deferred-destruction queue.
///
/// Heaps and textures never reach for a global; every operation that needs GPU
/// access takes the context explicitly.
pub struct Context<D: Device> {
    device: D,
    srv_heap: DescriptorHeapManager,
    rtv_heap: DescriptorHeapManager,
    dsv_heap: DescriptorHeapManager,
    deferred: DeferredDestructionQueue<D::Resource>,
}

impl<D: Device> Context<D> {
    pub fn new(mut device: D, config: &ContextConfig) -> anyhow::Result<Self> {
        log::trace!("Creating Context with {}", config);

        let policy = config.exhaustion_policy;
        let srv_heap = DescriptorHeapManager::create(
            &mut device,
            HeapKind::ShaderResource,
            config.srv_descriptors,
            true,
            policy,
        )
        .context("failed to create SRV descriptor heap")?;
        let rtv_heap = DescriptorHeapManager::create(
            &mut device,
            HeapKind::RenderTarget,
            config.rtv_descriptors,
            false,
            policy,
        )
        .context("failed to create RTV descriptor heap")?;
        let dsv_heap = DescriptorHeapManager::create(
            &mut device,
            HeapKind::DepthStencil,
            config.dsv_descriptors,
            false,
            policy,
        )
        .context("failed to create DSV descriptor heap")?;

        let first_fence = device.completed_fence() + 1;

        Ok(Self {
            device,
            srv_heap,
            rtv_heap,
            dsv_heap,
            deferred: DeferredDestructionQueue::new(first_fence),
        })
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn heap(&self, kind: HeapKind) -> &DescriptorHeapManager {
        match kind {
            HeapKind::ShaderResource => &self.srv_heap,
            HeapKind::RenderTarget => &self.rtv_heap,
            HeapKind::DepthStencil => &self.dsv_heap,
        }
    }

    #[inline]
    pub fn heap_mut(&mut self, kind: HeapKind) -> &mut DescriptorHeapManager {
        match kind {
            HeapKind::ShaderResource => &mut self.srv_heap,
            HeapKind::RenderTarget => &mut self.rtv_heap,
            HeapKind::DepthStencil => &mut self.dsv_heap,
        }
    }

    /// Fence value the batch currently being recorded will signal.
    #[inline]
    pub fn current_fence_value(&self) -> u64 {
        self.deferred.current_fence()
    }

    pub fn defer_resource_destruction(&self, resource: D::Resource) {
        log::trace!(
            "Deferring destruction of {:?} until fence {}",
            resource,
            self.deferred.current_fence()
        );
        self.deferred.register_resource(resource);
    }

    pub fn defer_descriptor_destruction(&self, kind: HeapKind, index: u32) {
        log::trace!(
            "Deferring release of {} descriptor {} until fence {}",
            kind,
            index,
            self.deferred.current_fence()
        );
        self.deferred.register_slot(kind, index);
    }

    #[inline]
    pub fn pending_destruction_count(&self) -> usize {
        self.deferred.len()
    }

    /// Submits the current batch and starts a new one. Returns the submitted fence value.
    pub fn submit(&mut self) -> anyhow::Result<u64> {
        let fence_value = self.deferred.current_fence();
        self.device
            .submit(fence_value)
            .with_context(|| format!("failed to submit batch {fence_value}"))?;
        self.deferred.advance();
        Ok(fence_value)
    }

    /// Releases everything whose batch the GPU has finished. Returns how many entries were released.
    pub fn retire_completed(&mut self) -> usize {
        let _span = tracing::trace_span!("Context::retire_completed").entered();

        let completed = self.device.completed_fence();
        let released = self.deferred.drain_completed(completed);
        let count = released.len();
        for release in released {
            self.release(release);
        }
        if count > 0 {
            log::debug!("Released {} deferred objects up to fence {}", count, completed);
        }
        count
    }

    /// Waits for the GPU to go idle, then releases everything from submitted
    /// batches. Entries registered in the batch still being recorded stay queued.
    pub fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.device
            .wait_idle()
            .context("failed waiting for device idle")?;
        self.retire_completed();
        Ok(())
    }

    /// Submits outstanding work and flushes the deferred queue.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        log::trace!("Shutting down Context");
        self.submit().context("failed to submit final batch")?;
        self.wait_idle()
    }

    fn release(&mut self, release: Release<D::Resource>) {
        match release {
            Release::Resource(resource) => self.device.destroy_resource(resource),
            Release::Descriptor { kind, index } => self.heap_mut(kind).free(index),
        }
    }
}

impl<D: Device> Drop for Context<D> {
    fn drop(&mut self) {
        log::trace!("Destroying Context");
        if !self.deferred.is_empty() {
            log::warn!(
                "Context dropped with {} deferred objects never released",
                self.deferred.len()
            );
        }
    }
}
