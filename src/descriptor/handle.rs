use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Shader-visible pool for shader resource views.
    ShaderResource,
    RenderTarget,
    DepthStencil,
}

impl fmt::Display for HeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeapKind::ShaderResource => "SRV",
            HeapKind::RenderTarget => "RTV",
            HeapKind::DepthStencil => "DSV",
        };
        f.write_str(s)
    }
}

/// Addresses of one slot in a descriptor heap.
///
/// A zero `cpu_address` marks the handle as unallocated. Handles carry no
/// ownership, whoever allocated one is responsible for returning it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    pub cpu_address: u64,
    pub gpu_address: u64,
    pub index: u32,
}

impl DescriptorHandle {
    pub const INVALID: DescriptorHandle = DescriptorHandle {
        cpu_address: 0,
        gpu_address: 0,
        index: 0,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.cpu_address != 0
    }
}

impl fmt::Display for DescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("Descriptor(<invalid>)");
        }
        write!(
            f,
            "Descriptor(index={}, cpu={:#x}, gpu={:#x})",
            self.index, self.cpu_address, self.gpu_address
        )
    }
}

/// Placement of a descriptor heap as reported by the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapLayout {
    pub cpu_base: u64,
    /// `None` for heaps that shaders cannot see.
    pub gpu_base: Option<u64>,
    pub capacity: u32,
    pub stride: u32,
}

impl HeapLayout {
    #[inline]
    pub fn handle_at(&self, index: u32) -> DescriptorHandle {
        let offset = u64::from(index) * u64::from(self.stride);
        DescriptorHandle {
            cpu_address: self.cpu_base + offset,
            gpu_address: self.gpu_base.map_or(0, |base| base + offset),
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handle_is_invalid() {
        assert!(!DescriptorHandle::default().is_valid());
        assert_eq!(DescriptorHandle::default(), DescriptorHandle::INVALID);
    }

    #[test]
    fn handle_addresses_follow_stride() {
        let layout = HeapLayout {
            cpu_base: 0x1000,
            gpu_base: Some(0x8000_0000),
            capacity: 8,
            stride: 32,
        };
        let handle = layout.handle_at(3);
        assert_eq!(handle.index, 3);
        assert_eq!(handle.cpu_address, 0x1000 + 3 * 32);
        assert_eq!(handle.gpu_address, 0x8000_0000 + 3 * 32);
    }

    #[test]
    fn cpu_only_heap_has_no_gpu_address() {
        let layout = HeapLayout {
            cpu_base: 0x2000,
            gpu_base: None,
            capacity: 2,
            stride: 16,
        };
        assert_eq!(layout.handle_at(1).gpu_address, 0);
        assert_eq!(layout.handle_at(1).cpu_address, 0x2010);
    }
}
