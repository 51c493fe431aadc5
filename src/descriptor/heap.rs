use crate::device::Device;

use super::free_list::{BitmapFreeList, FreeIndexSet};
use super::handle::{DescriptorHandle, HeapKind, HeapLayout};

/// What `allocate` does when every slot is taken.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Running out means the heap was sized wrong for the workload.
    #[default]
    Panic,
    /// Return [`HeapError::Exhausted`] instead, for callers that test the limit.
    Report,
}

#[derive(Debug, thiserror::Error)]
pub enum HeapError {
    #[error("{0} descriptor heap must hold at least one descriptor")]
    ZeroCapacity(HeapKind),

    #[error("{0} descriptor heap was placed at a null CPU address")]
    NullBase(HeapKind),

    #[error("failed to create {kind} descriptor heap with {capacity} descriptors")]
    Creation {
        kind: HeapKind,
        capacity: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("out of {kind} descriptors (capacity {capacity})")]
    Exhausted { kind: HeapKind, capacity: u32 },
}

/// Fixed-capacity pool of descriptor slots.
///
/// The heap only tracks which slots are occupied; what lives in a slot is the
/// business of whoever allocated it. Not thread-safe, callers serialize access.
pub struct DescriptorHeapManager<F: FreeIndexSet = BitmapFreeList> {
    kind: HeapKind,
    layout: HeapLayout,
    policy: ExhaustionPolicy,
    free_slots: F,
}

impl<F: FreeIndexSet> DescriptorHeapManager<F> {
    pub fn create<D: Device>(
        device: &mut D,
        kind: HeapKind,
        capacity: u32,
        shader_visible: bool,
        policy: ExhaustionPolicy,
    ) -> Result<Self, HeapError> {
        if capacity == 0 {
            return Err(HeapError::ZeroCapacity(kind));
        }

        let layout = device
            .create_descriptor_heap(kind, capacity, shader_visible)
            .map_err(|source| {
                log::error!("Create {} descriptor heap failed: {:#}", kind, source);
                HeapError::Creation {
                    kind,
                    capacity,
                    source,
                }
            })?;

        Self::from_layout(kind, layout, policy)
    }

    pub fn from_layout(
        kind: HeapKind,
        layout: HeapLayout,
        policy: ExhaustionPolicy,
    ) -> Result<Self, HeapError> {
        if layout.capacity == 0 {
            return Err(HeapError::ZeroCapacity(kind));
        }
        if layout.cpu_base == 0 {
            return Err(HeapError::NullBase(kind));
        }

        log::debug!(
            "Created {} descriptor heap: {} slots, stride {}, cpu base {:#x}, shader visible: {}",
            kind,
            layout.capacity,
            layout.stride,
            layout.cpu_base,
            layout.gpu_base.is_some()
        );

        Ok(Self {
            kind,
            layout,
            policy,
            free_slots: F::with_capacity(layout.capacity),
        })
    }

    pub fn allocate(&mut self) -> Result<DescriptorHandle, HeapError> {
        let _span = tracing::trace_span!("DescriptorHeapManager::allocate").entered();

        match self.free_slots.acquire() {
            Some(index) => Ok(self.layout.handle_at(index)),
            None => match self.policy {
                ExhaustionPolicy::Panic => {
                    panic!("Out of fixed {} descriptors", self.kind)
                }
                ExhaustionPolicy::Report => {
                    log::error!(
                        "Out of {} descriptors ({} slots in use)",
                        self.kind,
                        self.layout.capacity
                    );
                    Err(HeapError::Exhausted {
                        kind: self.kind,
                        capacity: self.layout.capacity,
                    })
                }
            },
        }
    }

    pub fn free(&mut self, index: u32) {
        assert!(
            index < self.layout.capacity,
            "{} descriptor index {} out of range (capacity {})",
            self.kind,
            index,
            self.layout.capacity
        );
        self.free_slots.release(index);
    }

    /// Returns `handle` to the heap. Invalid handles are ignored.
    pub fn free_handle(&mut self, handle: DescriptorHandle) {
        if handle.is_valid() {
            self.free(handle.index);
        }
    }

    #[inline]
    pub fn handle_for(&self, index: u32) -> DescriptorHandle {
        self.layout.handle_at(index)
    }

    #[inline]
    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    #[inline]
    pub fn layout(&self) -> &HeapLayout {
        &self.layout
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.layout.capacity
    }

    #[inline]
    pub fn descriptor_increment_size(&self) -> u32 {
        self.layout.stride
    }

    #[inline]
    pub fn is_shader_visible(&self) -> bool {
        self.layout.gpu_base.is_some()
    }

    #[inline]
    pub fn is_free(&self, index: u32) -> bool {
        self.free_slots.is_free(index)
    }

    #[inline]
    pub fn free_count(&self) -> u32 {
        self.free_slots.free_count()
    }

    #[inline]
    pub fn in_use_count(&self) -> u32 {
        self.layout.capacity - self.free_slots.free_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FreeIndexStack;

    fn layout(capacity: u32) -> HeapLayout {
        HeapLayout {
            cpu_base: 0x1000,
            gpu_base: None,
            capacity,
            stride: 16,
        }
    }

    fn reporting_heap(capacity: u32) -> DescriptorHeapManager {
        DescriptorHeapManager::from_layout(
            HeapKind::RenderTarget,
            layout(capacity),
            ExhaustionPolicy::Report,
        )
        .unwrap()
    }

    #[test]
    fn allocates_in_order_and_reuses_freed_slot() {
        let mut heap = reporting_heap(4);

        let handles: Vec<_> = (0..4).map(|_| heap.allocate().unwrap()).collect();
        let indices: Vec<_> = handles.iter().map(|h| h.index).collect();
        let addresses: Vec<_> = handles.iter().map(|h| h.cpu_address).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(addresses, vec![0x1000, 0x1010, 0x1020, 0x1030]);

        heap.free(1);
        let again = heap.allocate().unwrap();
        assert_eq!(again.index, 1);
        assert_eq!(again.cpu_address, 0x1010);
    }

    #[test]
    fn reports_exhaustion_after_capacity_allocations() {
        let mut heap = reporting_heap(3);
        for _ in 0..3 {
            heap.allocate().unwrap();
        }
        assert!(matches!(
            heap.allocate(),
            Err(HeapError::Exhausted { capacity: 3, .. })
        ));
        assert_eq!(heap.in_use_count(), 3);
    }

    #[test]
    #[should_panic(expected = "Out of fixed RTV descriptors")]
    fn panics_on_exhaustion_by_default() {
        let mut heap: DescriptorHeapManager = DescriptorHeapManager::from_layout(
            HeapKind::RenderTarget,
            layout(1),
            ExhaustionPolicy::default(),
        )
        .unwrap();
        heap.allocate().unwrap();
        let _ = heap.allocate();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn free_rejects_out_of_range_index() {
        let mut heap = reporting_heap(2);
        heap.free(2);
    }

    #[test]
    fn free_handle_ignores_invalid_handle() {
        let mut heap = reporting_heap(2);
        heap.allocate().unwrap();
        heap.free_handle(DescriptorHandle::INVALID);
        assert_eq!(heap.free_count(), 1);
        assert!(!heap.is_free(0));
    }

    #[test]
    fn shader_visible_heap_reports_gpu_addresses() {
        let mut heap: DescriptorHeapManager = DescriptorHeapManager::from_layout(
            HeapKind::ShaderResource,
            HeapLayout {
                cpu_base: 0x4000,
                gpu_base: Some(0x9000),
                capacity: 8,
                stride: 32,
            },
            ExhaustionPolicy::Report,
        )
        .unwrap();
        assert!(heap.is_shader_visible());
        heap.allocate().unwrap();
        let handle = heap.allocate().unwrap();
        assert_eq!(handle.gpu_address, 0x9000 + 32);
        assert_eq!(heap.handle_for(1), handle);
    }

    #[test]
    fn rejects_degenerate_layouts() {
        assert!(matches!(
            DescriptorHeapManager::<BitmapFreeList>::from_layout(
                HeapKind::DepthStencil,
                layout(0),
                ExhaustionPolicy::Report
            ),
            Err(HeapError::ZeroCapacity(HeapKind::DepthStencil))
        ));

        let mut null_base = layout(4);
        null_base.cpu_base = 0;
        assert!(matches!(
            DescriptorHeapManager::<BitmapFreeList>::from_layout(
                HeapKind::DepthStencil,
                null_base,
                ExhaustionPolicy::Report
            ),
            Err(HeapError::NullBase(_))
        ));
    }

    #[test]
    fn stack_backed_heap_is_interchangeable() {
        let mut heap = DescriptorHeapManager::<FreeIndexStack>::from_layout(
            HeapKind::ShaderResource,
            layout(2),
            ExhaustionPolicy::Report,
        )
        .unwrap();
        let a = heap.allocate().unwrap();
        let b = heap.allocate().unwrap();
        assert_ne!(a.index, b.index);
        heap.free_handle(a);
        assert_eq!(heap.allocate().unwrap().cpu_address, a.cpu_address);
    }
}
