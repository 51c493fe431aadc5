use std::fmt;

use crate::device::DEFAULT_COPY_PITCH_ALIGNMENT;

/// Knobs for [`HeadlessDevice`](super::HeadlessDevice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessConfig {
    /// CPU address of the first descriptor heap created.
    pub cpu_heap_base: u64,
    /// GPU address of the first shader-visible heap created.
    pub gpu_heap_base: u64,
    /// Distance between consecutive heaps in both address spaces.
    pub heap_spacing: u64,
    pub descriptor_stride: u32,
    pub copy_pitch_alignment: u32,
    /// Complete each batch as soon as it is submitted.
    pub auto_complete: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            cpu_heap_base: 0x1000,
            gpu_heap_base: 0x1_0000_0000,
            heap_spacing: 0x10_0000,
            descriptor_stride: 16,
            copy_pitch_alignment: DEFAULT_COPY_PITCH_ALIGNMENT,
            auto_complete: true,
        }
    }
}

impl HeadlessConfig {
    pub fn cpu_heap_base(mut self, base: u64) -> Self {
        self.cpu_heap_base = base;
        self
    }

    pub fn gpu_heap_base(mut self, base: u64) -> Self {
        self.gpu_heap_base = base;
        self
    }

    pub fn heap_spacing(mut self, spacing: u64) -> Self {
        self.heap_spacing = spacing;
        self
    }

    pub fn descriptor_stride(mut self, stride: u32) -> Self {
        self.descriptor_stride = stride;
        self
    }

    pub fn copy_pitch_alignment(mut self, alignment: u32) -> Self {
        self.copy_pitch_alignment = alignment;
        self
    }

    pub fn auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }
}

impl fmt::Display for HeadlessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HeadlessConfig(cpu_base={:#x}, gpu_base={:#x}, stride={}, pitch_alignment={}, auto_complete={})",
            self.cpu_heap_base,
            self.gpu_heap_base,
            self.descriptor_stride,
            self.copy_pitch_alignment,
            self.auto_complete
        )
    }
}
