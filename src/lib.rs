//! Descriptor slot allocation and GPU texture lifetime management.
//!
//! [`descriptor`] hands out fixed-capacity view slots, [`texture`] wraps a GPU
//! texture together with its views, and [`context`] ties both to a [`Device`]
//! and releases resources once the GPU is done with them.
//!
//! [`Device`]: device::Device

pub mod context;
pub mod descriptor;
pub mod device;
pub mod format;
pub mod headless;
pub mod texture;
