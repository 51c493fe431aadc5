use crate::descriptor::{HeapError, HeapKind};

/// Why creating or adopting a texture failed.
///
/// Every variant leaves the texture in whatever state it had before the call.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("render target and depth stencil views are mutually exclusive")]
    ConflictingTargetViews,

    #[error("format {0:?} has no known texel size")]
    UnsupportedFormat(ash::vk::Format),

    #[error("create texture failed")]
    StorageCreation(#[source] anyhow::Error),

    #[error("failed to allocate {kind} descriptor")]
    DescriptorAllocation {
        kind: HeapKind,
        #[source]
        source: HeapError,
    },

    #[error("failed to create {kind} view")]
    ViewCreation {
        kind: HeapKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create texture upload buffer")]
    UploadBufferCreation(#[source] anyhow::Error),

    #[error("mapping upload buffer failed")]
    UploadMap(#[source] anyhow::Error),

    #[error("invalid initial data: {0}")]
    InvalidInitialData(String),
}

/// A failed adopt hands the resource back so the caller still owns it.
#[derive(Debug, thiserror::Error)]
#[error("failed to adopt {resource:?}")]
pub struct AdoptError<R: std::fmt::Debug> {
    pub resource: R,
    #[source]
    pub source: TextureError,
}

impl<R: std::fmt::Debug> AdoptError<R> {
    pub fn into_resource(self) -> R {
        self.resource
    }
}
