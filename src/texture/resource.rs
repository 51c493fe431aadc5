use ash::vk;

use crate::context::Context;
use crate::descriptor::{DescriptorHandle, HeapKind};
use crate::device::Device;
use crate::format::texel_size;

use super::error::{AdoptError, TextureError};
use super::spec::{InitialData, TextureDesc, TextureSpec, ViewFormats};
use super::state::ResourceState;
use super::upload::{CopyBox, UploadLayout};

/// Owning handle over one GPU texture and its views.
///
/// A texture is either empty or live. Live textures hold the resource, an
/// optional shader view, and at most one of a render-target or depth-stencil
/// view. Nothing is released implicitly: call [`Texture::destroy`] before the
/// value goes away. Dropping a live texture leaks its resource and slots and is
/// reported as an error.
#[derive(Debug)]
pub struct Texture<R> {
    resource: Option<R>,
    srv_descriptor: DescriptorHandle,
    rtv_or_dsv_descriptor: DescriptorHandle,
    target_kind: Option<HeapKind>,
    width: u32,
    height: u32,
    samples: u32,
    format: vk::Format,
    state: ResourceState,
}

impl<R> Default for Texture<R> {
    fn default() -> Self {
        Self {
            resource: None,
            srv_descriptor: DescriptorHandle::INVALID,
            rtv_or_dsv_descriptor: DescriptorHandle::INVALID,
            target_kind: None,
            width: 0,
            height: 0,
            samples: 0,
            format: vk::Format::UNDEFINED,
            state: ResourceState::Common,
        }
    }
}

/// Descriptors acquired for a texture that is not installed yet.
struct AllocatedViews {
    srv: DescriptorHandle,
    target: Option<(HeapKind, DescriptorHandle)>,
}

impl AllocatedViews {
    /// Frees the slots right away. Only valid while no GPU work can reference them.
    fn release_now<D: Device>(self, ctx: &mut Context<D>) {
        ctx.heap_mut(HeapKind::ShaderResource).free_handle(self.srv);
        if let Some((kind, handle)) = self.target {
            ctx.heap_mut(kind).free_handle(handle);
        }
    }
}

impl<R> Texture<R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.resource.is_some()
    }

    #[inline]
    pub fn resource(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    #[inline]
    pub fn srv_descriptor(&self) -> DescriptorHandle {
        self.srv_descriptor
    }

    #[inline]
    pub fn rtv_or_dsv_descriptor(&self) -> DescriptorHandle {
        self.rtv_or_dsv_descriptor
    }

    /// Which heap the render/depth view came from, if there is one.
    #[inline]
    pub fn target_kind(&self) -> Option<HeapKind> {
        self.target_kind
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Moves the contents out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn desc<D: Device<Resource = R>>(&self, ctx: &Context<D>) -> Option<TextureDesc> {
        self.resource.as_ref().map(|r| ctx.device().describe(r))
    }

    /// Allocates storage and views for `spec`, optionally filling it with `initial`.
    ///
    /// On success any previous contents are destroyed (deferred). On failure
    /// everything acquired by this call is released and `self` is untouched.
    pub fn create<D: Device<Resource = R>>(
        &mut self,
        ctx: &mut Context<D>,
        spec: &TextureSpec,
        initial: Option<InitialData<'_>>,
    ) -> Result<(), TextureError> {
        let _span = tracing::debug_span!("Texture::create").entered();

        let views = spec.views;
        check_target_views(&views)?;

        let upload_layout = match &initial {
            Some(initial) => {
                let layout = upload_layout_for(ctx, spec, initial)?;
                Some(layout)
            }
            None => None,
        };

        let (mut state, clear_format) = initial_state(&views, initial.is_some());
        let desc = spec.desc();
        let resource = ctx
            .device_mut()
            .create_texture(&desc, state, clear_format)
            .map_err(|e| {
                log::error!("Create texture {} failed: {:#}", spec.name(), e);
                TextureError::StorageCreation(e)
            })?;

        let allocated = match allocate_views(ctx, &resource, &views, spec.samples > 1) {
            Ok(allocated) => allocated,
            Err(e) => {
                ctx.device_mut().destroy_resource(resource);
                return Err(e);
            }
        };

        if let (Some(initial), Some(layout)) = (initial, upload_layout) {
            if let Err(e) = upload_initial_data(ctx, &resource, state, spec, &initial, &layout) {
                allocated.release_now(ctx);
                ctx.device_mut().destroy_resource(resource);
                return Err(e);
            }
            state = ResourceState::ShaderReadable;
        }

        self.destroy(ctx, true);
        self.install(resource, allocated, &desc, state);

        log::debug!(
            "Created texture {} ({}x{}, {:?}) srv={} target={}",
            spec.name(),
            self.width,
            self.height,
            self.format,
            self.srv_descriptor,
            self.rtv_or_dsv_descriptor
        );
        Ok(())
    }

    /// Takes ownership of a resource created elsewhere and attaches views to it.
    ///
    /// Size, sample count and format are read back from the resource. On failure
    /// the resource is returned inside the error.
    pub fn adopt<D: Device<Resource = R>>(
        &mut self,
        ctx: &mut Context<D>,
        resource: R,
        views: ViewFormats,
        state: ResourceState,
    ) -> Result<(), AdoptError<R>>
    where
        R: std::fmt::Debug,
    {
        let _span = tracing::debug_span!("Texture::adopt").entered();

        if let Err(source) = check_target_views(&views) {
            return Err(AdoptError { resource, source });
        }

        let desc = ctx.device().describe(&resource);
        let allocated = match allocate_views(ctx, &resource, &views, desc.samples > 1) {
            Ok(allocated) => allocated,
            Err(source) => return Err(AdoptError { resource, source }),
        };

        self.destroy(ctx, true);
        self.install(resource, allocated, &desc, state);

        log::debug!(
            "Adopted {:?} ({}x{}, {:?}) in state {}",
            self.resource,
            self.width,
            self.height,
            self.format,
            self.state
        );
        Ok(())
    }

    /// Releases the resource and its views and leaves `self` empty.
    ///
    /// With `defer` everything goes through the context's deferred queue and is
    /// released once the GPU has finished the current batch. Without it the
    /// release is immediate, which is only safe when the GPU is idle.
    pub fn destroy<D: Device<Resource = R>>(&mut self, ctx: &mut Context<D>, defer: bool) {
        let _span = tracing::trace_span!("Texture::destroy").entered();

        if self.srv_descriptor.is_valid() {
            let index = self.srv_descriptor.index;
            if defer {
                ctx.defer_descriptor_destruction(HeapKind::ShaderResource, index);
            } else {
                ctx.heap_mut(HeapKind::ShaderResource).free(index);
            }
            self.srv_descriptor = DescriptorHandle::INVALID;
        }

        if let Some(kind) = self.target_kind.take() {
            let index = self.rtv_or_dsv_descriptor.index;
            if defer {
                ctx.defer_descriptor_destruction(kind, index);
            } else {
                ctx.heap_mut(kind).free(index);
            }
            self.rtv_or_dsv_descriptor = DescriptorHandle::INVALID;
        }

        if let Some(resource) = self.resource.take() {
            if defer {
                ctx.defer_resource_destruction(resource);
            } else {
                ctx.device_mut().destroy_resource(resource);
            }
        }

        self.width = 0;
        self.height = 0;
        self.samples = 0;
        self.format = vk::Format::UNDEFINED;
        self.state = ResourceState::Common;
    }

    /// Destroys the current contents (deferred) and takes over `other`'s.
    pub fn replace<D: Device<Resource = R>>(&mut self, ctx: &mut Context<D>, mut other: Texture<R>) {
        self.destroy(ctx, true);
        *self = other.take();
    }

    /// Records a barrier moving the texture into `state`, unless it is already there.
    pub fn transition_to_state<D: Device<Resource = R>>(
        &mut self,
        ctx: &mut Context<D>,
        state: ResourceState,
    ) {
        let resource = self
            .resource
            .as_ref()
            .expect("transition_to_state: texture is empty");
        if self.state == state {
            return;
        }
        ctx.device_mut().resource_barrier(resource, self.state, state);
        self.state = state;
    }

    fn install(
        &mut self,
        resource: R,
        allocated: AllocatedViews,
        desc: &TextureDesc,
        state: ResourceState,
    ) {
        self.resource = Some(resource);
        self.srv_descriptor = allocated.srv;
        match allocated.target {
            Some((kind, handle)) => {
                self.target_kind = Some(kind);
                self.rtv_or_dsv_descriptor = handle;
            }
            None => {
                self.target_kind = None;
                self.rtv_or_dsv_descriptor = DescriptorHandle::INVALID;
            }
        }
        self.width = desc.width;
        self.height = desc.height;
        self.samples = desc.samples;
        self.format = desc.format;
        self.state = state;
    }
}

impl<R> Drop for Texture<R> {
    fn drop(&mut self) {
        if self.resource.is_some() || self.srv_descriptor.is_valid() || self.target_kind.is_some() {
            log::error!(
                "Texture {}x{} {:?} dropped without destroy, its resource and descriptors leak",
                self.width,
                self.height,
                self.format
            );
            debug_assert!(std::thread::panicking(), "live texture dropped without destroy");
        }
    }
}

fn check_target_views(views: &ViewFormats) -> Result<(), TextureError> {
    if views.has_rtv() && views.has_dsv() {
        log::error!(
            "Texture requested both RTV {:?} and DSV {:?}",
            views.rtv,
            views.dsv
        );
        return Err(TextureError::ConflictingTargetViews);
    }
    Ok(())
}

fn initial_state(views: &ViewFormats, has_initial_data: bool) -> (ResourceState, Option<vk::Format>) {
    if views.has_rtv() {
        (ResourceState::RenderTarget, Some(views.rtv))
    } else if views.has_dsv() {
        (ResourceState::DepthWrite, Some(views.dsv))
    } else if has_initial_data {
        (ResourceState::CopyDestination, None)
    } else {
        (ResourceState::ShaderReadable, None)
    }
}

fn upload_layout_for<D: Device>(
    ctx: &Context<D>,
    spec: &TextureSpec,
    initial: &InitialData<'_>,
) -> Result<UploadLayout, TextureError> {
    let texel = texel_size(spec.format).ok_or_else(|| {
        log::error!("Cannot upload {}: format {:?} has no texel size", spec.name(), spec.format);
        TextureError::UnsupportedFormat(spec.format)
    })?;

    let layout = UploadLayout::new(
        spec.width,
        spec.height,
        texel,
        ctx.device().copy_pitch_alignment(),
    )
    .and_then(|layout| layout.validate(initial).map(|()| layout))
    .inspect_err(|e| {
        log::error!("Cannot upload {}: {}", spec.name(), e);
    })?;
    Ok(layout)
}

/// Allocates the requested views. Either all of them succeed or none are held.
fn allocate_views<D: Device>(
    ctx: &mut Context<D>,
    resource: &D::Resource,
    views: &ViewFormats,
    multisampled: bool,
) -> Result<AllocatedViews, TextureError> {
    let srv = if views.has_srv() {
        create_descriptor(ctx, resource, HeapKind::ShaderResource, views.srv, multisampled)?
    } else {
        DescriptorHandle::INVALID
    };

    let target = if views.has_rtv() {
        Some((HeapKind::RenderTarget, views.rtv))
    } else if views.has_dsv() {
        Some((HeapKind::DepthStencil, views.dsv))
    } else {
        None
    };

    let target = match target {
        Some((kind, format)) => {
            match create_descriptor(ctx, resource, kind, format, multisampled) {
                Ok(handle) => Some((kind, handle)),
                Err(e) => {
                    ctx.heap_mut(HeapKind::ShaderResource).free_handle(srv);
                    return Err(e);
                }
            }
        }
        None => None,
    };

    Ok(AllocatedViews { srv, target })
}

fn create_descriptor<D: Device>(
    ctx: &mut Context<D>,
    resource: &D::Resource,
    kind: HeapKind,
    format: vk::Format,
    multisampled: bool,
) -> Result<DescriptorHandle, TextureError> {
    let handle = ctx.heap_mut(kind).allocate().map_err(|source| {
        log::error!("Failed to allocate {} descriptor", kind);
        TextureError::DescriptorAllocation { kind, source }
    })?;

    let device = ctx.device_mut();
    let created = match kind {
        HeapKind::ShaderResource => device.create_shader_view(resource, format, multisampled, handle),
        HeapKind::RenderTarget => device.create_render_view(resource, format, multisampled, handle),
        HeapKind::DepthStencil => device.create_depth_view(resource, format, multisampled, handle),
    };

    if let Err(source) = created {
        log::error!("Failed to create {} view: {:#}", kind, source);
        ctx.heap_mut(kind).free(handle.index);
        return Err(TextureError::ViewCreation { kind, source });
    }
    Ok(handle)
}

/// Stages `initial` in an upload buffer and records the copy into `resource`.
///
/// Leaves a barrier to `ShaderReadable` recorded behind the copy. The upload
/// buffer goes to the deferred queue since the copy has not executed yet.
fn upload_initial_data<D: Device>(
    ctx: &mut Context<D>,
    resource: &D::Resource,
    state: ResourceState,
    spec: &TextureSpec,
    initial: &InitialData<'_>,
    layout: &UploadLayout,
) -> Result<(), TextureError> {
    let size = layout.total_size();
    let upload_buffer = ctx.device_mut().create_upload_buffer(size).map_err(|e| {
        log::error!("Create texture upload buffer of {} bytes failed: {:#}", size, e);
        TextureError::UploadBufferCreation(e)
    })?;

    let mapped = ctx
        .device_mut()
        .map(&upload_buffer)
        .map(|dst| layout.repack(initial, dst));
    if let Err(e) = mapped {
        log::error!("Mapping upload buffer failed: {:#}", e);
        ctx.device_mut().destroy_resource(upload_buffer);
        return Err(TextureError::UploadMap(e));
    }

    let device = ctx.device_mut();
    device.unmap(&upload_buffer, 0..size);

    if state != ResourceState::CopyDestination {
        device.resource_barrier(resource, state, ResourceState::CopyDestination);
    }
    device.copy_region(
        resource,
        &upload_buffer,
        &layout.footprint(spec.width, spec.format),
        &CopyBox::full(spec.width, spec.height),
    );
    device.resource_barrier(
        resource,
        ResourceState::CopyDestination,
        ResourceState::ShaderReadable,
    );

    ctx.defer_resource_destruction(upload_buffer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGBA8: vk::Format = vk::Format::R8G8B8A8_UNORM;

    #[test]
    fn render_target_takes_priority_for_initial_state() {
        let views = ViewFormats::shader(RGBA8).rtv(RGBA8);
        assert_eq!(
            initial_state(&views, true),
            (ResourceState::RenderTarget, Some(RGBA8))
        );
    }

    #[test]
    fn depth_target_starts_writable() {
        let views = ViewFormats::default().dsv(vk::Format::D32_SFLOAT);
        assert_eq!(
            initial_state(&views, false),
            (ResourceState::DepthWrite, Some(vk::Format::D32_SFLOAT))
        );
    }

    #[test]
    fn upload_without_targets_starts_as_copy_destination() {
        let views = ViewFormats::shader(RGBA8);
        assert_eq!(initial_state(&views, true), (ResourceState::CopyDestination, None));
        assert_eq!(initial_state(&views, false), (ResourceState::ShaderReadable, None));
    }

    #[test]
    fn both_targets_are_rejected() {
        let views = ViewFormats::default().rtv(RGBA8).dsv(vk::Format::D32_SFLOAT);
        assert!(matches!(
            check_target_views(&views),
            Err(TextureError::ConflictingTargetViews)
        ));
        assert!(check_target_views(&ViewFormats::shader(RGBA8)).is_ok());
    }

    #[test]
    fn default_texture_is_empty() {
        let texture: Texture<u32> = Texture::default();
        assert!(!texture.is_live());
        assert!(!texture.srv_descriptor().is_valid());
        assert_eq!(texture.state(), ResourceState::Common);
    }
}
