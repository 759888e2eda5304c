use std::path::PathBuf;
use ash::vk;
use thiserror::Error;

/// Failures surfaced by the renderer. Every variant is fatal at the point
/// of detection; builders return early with `?` and the error unwinds the
/// whole initialization.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The host has no device/driver combination the engine can run on.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// A native create call failed while building the named object.
    #[error("failed to create the {stage}: {source}")]
    ResourceCreation {
        stage: &'static str,
        #[source]
        source: vk::Result,
    },

    /// A shader binary or texture file could not be read or decoded.
    #[error("failed to load asset {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An image layout transition outside the supported pairs was requested.
    #[error("unsupported image layout transition: {from:?} -> {to:?}")]
    UnsupportedTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    /// A queue submission, wait, or presentation call failed.
    #[error("{op} failed: {source}")]
    Gpu {
        op: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("device memory allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    #[error("buffer write failed: {0}")]
    Write(#[from] presser::CopyError),

    #[error("memory allocator mutex poisoned")]
    AllocatorLock,

    /// A resource was requested from a device whose allocator stage has
    /// already been released.
    #[error("logical device already released")]
    DeviceReleased,
}

impl RenderError {
    pub(crate) fn asset(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Asset {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Tags a fallible native create call with the object it was building.
pub(crate) fn creation(stage: &'static str) -> impl FnOnce(vk::Result) -> RenderError {
    move |source| RenderError::ResourceCreation { stage, source }
}

/// Tags a fallible submission/wait/present call with the operation name.
pub(crate) fn gpu_op(op: &'static str) -> impl FnOnce(vk::Result) -> RenderError {
    move |source| RenderError::Gpu { op, source }
}
