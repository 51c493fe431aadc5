mod common;

use viewheap::context::{Context, ContextConfig};
use viewheap::descriptor::HeapKind;
use viewheap::device::Device;
use viewheap::headless::{FailPoint, HeadlessConfig, HeadlessDevice};
use viewheap::texture::{InitialData, ResourceState, Texture};

use common::*;

fn manual_fences() -> Context<HeadlessDevice> {
    context_with(HeadlessConfig::default().auto_complete(false))
}

#[test]
fn slots_stay_taken_until_the_batch_completes() {
    let mut ctx = manual_fences();
    let mut texture = Texture::new();
    texture.create(&mut ctx, &color_target(8, 8), None).unwrap();
    let srv_index = texture.srv_descriptor().index;

    texture.destroy(&mut ctx, true);
    assert_eq!(ctx.pending_destruction_count(), 3);
    assert!(!ctx.heap(HeapKind::ShaderResource).is_free(srv_index));
    assert_eq!(ctx.heap(HeapKind::RenderTarget).in_use_count(), 1);

    assert_eq!(ctx.submit().unwrap(), 1);
    assert_eq!(ctx.retire_completed(), 0);

    ctx.device_mut().complete_through(1);
    assert_eq!(ctx.retire_completed(), 3);
    assert!(ctx.heap(HeapKind::ShaderResource).is_free(srv_index));
    assert_eq!(ctx.heap(HeapKind::RenderTarget).in_use_count(), 0);
    assert_eq!(ctx.device().live_resource_count(), 0);
    assert_eq!(ctx.device().premature_destroy_count(), 0);
}

#[test]
fn release_waits_for_the_batch_it_was_registered_in() {
    let mut ctx = manual_fences();
    let mut texture = Texture::new();
    texture.create(&mut ctx, &color_target(8, 8), None).unwrap();
    texture.transition_to_state(&mut ctx, ResourceState::ShaderReadable);
    assert_eq!(ctx.submit().unwrap(), 1);

    // still in use by batch 1, released with batch 2
    assert_eq!(ctx.current_fence_value(), 2);
    texture.destroy(&mut ctx, true);
    assert_eq!(ctx.submit().unwrap(), 2);

    ctx.device_mut().complete_through(1);
    assert_eq!(ctx.retire_completed(), 0);
    assert_eq!(ctx.device().live_resource_count(), 1);

    ctx.device_mut().complete_through(2);
    assert_eq!(ctx.retire_completed(), 3);
    assert_eq!(ctx.device().live_resource_count(), 0);
    assert_eq!(ctx.device().premature_destroy_count(), 0);
}

#[test]
fn immediate_destroy_of_in_flight_texture_is_detected() {
    let mut ctx = manual_fences();
    let mut texture = Texture::new();
    texture.create(&mut ctx, &color_target(4, 4), None).unwrap();
    texture.transition_to_state(&mut ctx, ResourceState::CopySource);
    ctx.submit().unwrap();

    texture.destroy(&mut ctx, false);
    assert_eq!(ctx.device().premature_destroy_count(), 1);
    assert_eq!(ctx.heap(HeapKind::ShaderResource).in_use_count(), 0);
}

#[test]
fn upload_buffer_outlives_the_copy() {
    let mut ctx = manual_fences();
    let data = pattern(16 * 4);
    let mut texture = Texture::new();
    texture
        .create(
            &mut ctx,
            &sampled(4, 4),
            Some(InitialData::new(&data, 16)),
        )
        .unwrap();

    ctx.submit().unwrap();
    assert_eq!(ctx.retire_completed(), 0);
    assert_eq!(ctx.device().live_resource_count(), 2);

    ctx.device_mut().complete_through(1);
    assert_eq!(ctx.retire_completed(), 1);
    assert_eq!(ctx.device().live_resource_count(), 1);
    assert_eq!(ctx.device().dangling_copy_count(), 0);
    assert_eq!(ctx.device().premature_destroy_count(), 0);

    texture.destroy(&mut ctx, true);
    ctx.shutdown().unwrap();
}

#[test]
fn wait_idle_releases_everything() {
    let mut ctx = manual_fences();
    let mut textures: Vec<Texture<_>> = (0..3).map(|_| Texture::new()).collect();
    for texture in &mut textures {
        texture.create(&mut ctx, &sampled(2, 2), None).unwrap();
    }
    for texture in &mut textures {
        texture.destroy(&mut ctx, true);
    }
    ctx.submit().unwrap();
    assert_eq!(ctx.pending_destruction_count(), 6);

    ctx.wait_idle().unwrap();
    assert_eq!(ctx.pending_destruction_count(), 0);
    assert_eq!(ctx.device().live_resource_count(), 0);
    assert_eq!(ctx.heap(HeapKind::ShaderResource).in_use_count(), 0);
}

#[test]
fn wait_idle_keeps_the_open_batch_queued() {
    let mut ctx = manual_fences();
    let data = pattern(16 * 4);
    let mut texture = Texture::new();
    texture
        .create(&mut ctx, &sampled(4, 4), Some(InitialData::new(&data, 16)))
        .unwrap();

    // the upload buffer belongs to a batch that has not been submitted
    ctx.wait_idle().unwrap();
    assert_eq!(ctx.pending_destruction_count(), 1);
    assert_eq!(ctx.device().live_resource_count(), 2);

    ctx.submit().unwrap();
    let device = ctx.device();
    assert_eq!(device.premature_destroy_count(), 0);
    assert_eq!(device.dangling_copy_count(), 0);
    assert_eq!(
        device.texture_data(texture.resource().unwrap()),
        Some(data.as_slice())
    );

    ctx.wait_idle().unwrap();
    assert_eq!(ctx.pending_destruction_count(), 0);
    assert_eq!(ctx.device().live_resource_count(), 1);

    texture.destroy(&mut ctx, true);
    ctx.shutdown().unwrap();
}

#[test]
fn shutdown_flushes_unsubmitted_work() {
    let mut ctx = manual_fences();
    let mut texture = Texture::new();
    texture.create(&mut ctx, &depth_target(4, 4), None).unwrap();
    texture.destroy(&mut ctx, true);

    ctx.shutdown().unwrap();
    assert_eq!(ctx.device().submitted_fence(), 1);
    assert_eq!(ctx.pending_destruction_count(), 0);
    assert_eq!(ctx.heap(HeapKind::DepthStencil).in_use_count(), 0);
}

#[test]
fn failed_submit_keeps_the_current_batch_open() {
    let mut ctx = context();
    let mut texture = Texture::new();
    texture.create(&mut ctx, &sampled(2, 2), None).unwrap();
    texture.destroy(&mut ctx, true);

    ctx.device_mut().fail_next(FailPoint::Submit);
    assert!(ctx.submit().is_err());
    assert_eq!(ctx.current_fence_value(), 1);
    assert_eq!(ctx.retire_completed(), 0);

    assert_eq!(ctx.submit().unwrap(), 1);
    assert_eq!(ctx.retire_completed(), 2);
}

#[test]
fn context_creation_fails_when_a_heap_cannot_be_created() {
    let mut device = HeadlessDevice::default();
    device.fail_next(FailPoint::DescriptorHeap);
    let result = Context::new(device, &ContextConfig::default());
    let err = result.err().unwrap();
    assert!(format!("{err:#}").contains("SRV descriptor heap"));
}

#[test]
fn first_fence_follows_the_device() {
    let mut device = HeadlessDevice::default();
    device.submit(4).unwrap();
    let ctx = Context::new(device, &ContextConfig::default()).unwrap();
    assert_eq!(ctx.current_fence_value(), 5);
}
