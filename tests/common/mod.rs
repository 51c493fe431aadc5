#![allow(dead_code)]

use ash::vk;

use viewheap::context::{Context, ContextConfig};
use viewheap::descriptor::ExhaustionPolicy;
use viewheap::headless::{HeadlessConfig, HeadlessDevice};
use viewheap::texture::TextureSpec;

pub const RGBA8: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub fn context_with(config: HeadlessConfig) -> Context<HeadlessDevice> {
    let config_sizes = ContextConfig::default()
        .srv_descriptors(64)
        .rtv_descriptors(8)
        .dsv_descriptors(8)
        .exhaustion_policy(ExhaustionPolicy::Report);
    Context::new(HeadlessDevice::new(config), &config_sizes).unwrap()
}

pub fn context() -> Context<HeadlessDevice> {
    context_with(HeadlessConfig::default())
}

pub fn sampled(width: u32, height: u32) -> TextureSpec {
    TextureSpec::new(width, height, RGBA8).srv_format(RGBA8)
}

pub fn color_target(width: u32, height: u32) -> TextureSpec {
    sampled(width, height).rtv_format(RGBA8)
}

pub fn depth_target(width: u32, height: u32) -> TextureSpec {
    TextureSpec::new(width, height, vk::Format::D32_SFLOAT).dsv_format(vk::Format::D32_SFLOAT)
}

/// Bytes `0, 1, 2, ...` wrapping at 251 so rows never line up by accident.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
