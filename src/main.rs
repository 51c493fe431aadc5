use anyhow::Context as _;
use ash::vk;

use viewheap::context::{Context, ContextConfig};
use viewheap::descriptor::HeapKind;
use viewheap::headless::{HeadlessConfig, HeadlessDevice, HeadlessResource};
use viewheap::texture::{InitialData, ResourceState, Texture, TextureSpec};

const FRAME_COUNT: u32 = 4;
const ALBEDO_SIZE: u32 = 64;

fn main() -> anyhow::Result<()> {
    log4rs::init_file("log4rs.yml", Default::default())
        .context("failed to load logging config file")?;

    #[cfg(feature = "tracy")]
    init_profiling().context("failed to start profiler")?;

    let device = HeadlessDevice::new(HeadlessConfig::default());
    let mut ctx =
        Context::new(device, &ContextConfig::default()).context("failed to create Context")?;

    let texels = checkerboard(ALBEDO_SIZE, ALBEDO_SIZE);
    let mut albedo = Texture::new();
    albedo
        .create(
            &mut ctx,
            &TextureSpec::new(ALBEDO_SIZE, ALBEDO_SIZE, vk::Format::R8G8B8A8_UNORM)
                .srv_format(vk::Format::R8G8B8A8_UNORM)
                .debug_name("albedo"),
            Some(InitialData::new(
                bytemuck::cast_slice(&texels),
                ALBEDO_SIZE * 4,
            )),
        )
        .context("failed to create albedo texture")?;

    let mut color = Texture::new();
    let mut depth = Texture::new();
    let frames = run_frames(&mut ctx, &mut color, &mut depth);

    // textures are released on every path, so a frame error is reported as is
    let shutdown = release_and_shutdown(&mut ctx, [&mut albedo, &mut color, &mut depth]);
    frames?;
    shutdown?;

    let device = ctx.device();
    log::info!(
        "Done: {} live resources, {} barriers, {} premature destroys",
        device.live_resource_count(),
        device.barrier_count(),
        device.premature_destroy_count()
    );

    Ok(())
}

fn run_frames(
    ctx: &mut Context<HeadlessDevice>,
    color: &mut Texture<HeadlessResource>,
    depth: &mut Texture<HeadlessResource>,
) -> anyhow::Result<()> {
    for frame in 0..FRAME_COUNT {
        // simulated resize: targets are rebuilt every frame
        let (width, height) = (1280 + frame * 16, 720 + frame * 9);

        let mut next_color = Texture::new();
        next_color
            .create(
                ctx,
                &TextureSpec::new(width, height, vk::Format::R16G16B16A16_SFLOAT)
                    .srv_format(vk::Format::R16G16B16A16_SFLOAT)
                    .rtv_format(vk::Format::R16G16B16A16_SFLOAT)
                    .debug_name("color"),
                None,
            )
            .context("failed to create color target")?;
        color.replace(ctx, next_color);

        depth
            .create(
                ctx,
                &TextureSpec::new(width, height, vk::Format::D32_SFLOAT)
                    .dsv_format(vk::Format::D32_SFLOAT)
                    .debug_name("depth"),
                None,
            )
            .context("failed to create depth target")?;

        // forward pass writes color, composition samples it
        color.transition_to_state(ctx, ResourceState::ShaderReadable);
        depth.transition_to_state(ctx, ResourceState::DepthRead);
        color.transition_to_state(ctx, ResourceState::RenderTarget);

        let fence = ctx.submit().context("failed to submit frame")?;
        let released = ctx.retire_completed();

        log::info!(
            "Frame {} ({}x{}) submitted as fence {}, released {}, SRV slots in use {}",
            frame,
            width,
            height,
            fence,
            released,
            ctx.heap(HeapKind::ShaderResource).in_use_count()
        );

        #[cfg(feature = "tracy")]
        tracy_client::frame_mark();
    }
    Ok(())
}

fn release_and_shutdown<const N: usize>(
    ctx: &mut Context<HeadlessDevice>,
    textures: [&mut Texture<HeadlessResource>; N],
) -> anyhow::Result<()> {
    for texture in textures {
        texture.destroy(ctx, true);
    }
    ctx.shutdown().context("failed to shut down Context")
}

fn checkerboard(width: u32, height: u32) -> Vec<u32> {
    (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                if (x / 8 + y / 8) % 2 == 0 {
                    0xffff_ffff
                } else {
                    0xff20_2020
                }
            })
        })
        .collect()
}

#[cfg(feature = "tracy")]
fn init_profiling() -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;

    tracy_client::Client::start();
    let subscriber = tracing_subscriber::registry().with(tracing_tracy::TracyLayer::default());
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracy subscriber")?;
    Ok(())
}
