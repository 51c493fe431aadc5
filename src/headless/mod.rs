//! Software implementation of [`Device`](crate::device::Device).
//!
//! Used as the backend of the demo binary and as the device double in tests.

mod config;
mod device;
mod keys;

pub use config::HeadlessConfig;
pub use device::{FailPoint, HeadlessDevice, HeadlessResource, ViewRecord};
pub use keys::ResourceKey;
