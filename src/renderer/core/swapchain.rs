use std::sync::Arc;

use ash::vk;

use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::render_pass::RenderTargetPass;
use crate::renderer::core::support::{self, SurfaceSupport};
use crate::renderer::error::{creation, gpu_op, RenderError};

/// Everything chosen from a fresh surface-capability query. Computed as a
/// unit so rebuilds can be compared against the previous generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainSettings {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl ChainSettings {
    pub fn choose(
        support: &SurfaceSupport,
        drawable: vk::Extent2D,
        vsync: bool,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes, vsync),
            extent: choose_extent(&support.capabilities, drawable),
            image_count: choose_image_count(&support.capabilities),
        })
    }
}

/// Prefers 8-bit BGRA with sRGB encoding; otherwise the first format the
/// surface offers.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, RenderError> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| {
            RenderError::UnsupportedEnvironment("surface reports no formats".to_owned())
        })
}

/// Prefers low-latency MAILBOX when offered and vsync is off; FIFO is the
/// guaranteed fallback.
fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, unless it reports the undefined sentinel,
/// in which case the window's drawable pixel size clamped to the surface
/// bounds.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Requests the surface's declared maximum outright, without the common
/// min+1 margin. A zero maximum means unbounded, where the request drops
/// to the surface minimum.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if capabilities.max_image_count == 0 {
        capabilities.min_image_count
    } else {
        capabilities
            .max_image_count
            .max(capabilities.min_image_count)
    }
}

/// The rebuildable sequence of presentable images tied to the output
/// surface, plus the depth buffer and per-image framebuffers layered on
/// top once a render pass exists. The whole set is torn down and recreated
/// wholesale on resize; individual images are never destroyed on their
/// own.
pub struct PresentationChain {
    pub settings: ChainSettings,
    chain: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<crate::renderer::resources::image::Image>,
    framebuffers: Vec<vk::Framebuffer>,
    device: Arc<ash::Device>,
}

/// Result of asking the chain for the next presentable image.
pub enum AcquireOutcome {
    Ready { index: u32, suboptimal: bool },
    OutOfDate,
}

impl PresentationChain {
    pub fn new(
        instance: &ash::Instance,
        device: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        drawable: vk::Extent2D,
        vsync: bool,
    ) -> Result<Self, RenderError> {
        let loader = ash::khr::swapchain::Device::new(instance, &device.logical);
        let (settings, chain, images, views) =
            Self::build(device, surface, surface_loader, &loader, drawable, vsync)?;

        Ok(Self {
            settings,
            chain,
            loader,
            images,
            views,
            depth: None,
            framebuffers: Vec::new(),
            device: device.logical.clone(),
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, index: u32) -> vk::Framebuffer {
        self.framebuffers[index as usize]
    }

    /// Creates the depth buffer and one framebuffer per chain image for
    /// `render_pass`. Called once the pass exists, and again after every
    /// rebuild.
    pub fn attach_render_targets(
        &mut self,
        device: &RenderDevice,
        render_pass: &RenderTargetPass,
    ) -> Result<(), RenderError> {
        let depth = crate::renderer::resources::image::Image::new_depth_image(
            self.settings.extent.width,
            self.settings.extent.height,
            render_pass.depth_format,
            device.allocator()?,
            device.logical.clone(),
        )?;

        let framebuffers = self
            .views
            .iter()
            .map(|&view| {
                let attachments = [view, depth.view];
                let info = vk::FramebufferCreateInfo::default()
                    .render_pass(render_pass.pass)
                    .attachments(&attachments)
                    .width(self.settings.extent.width)
                    .height(self.settings.extent.height)
                    .layers(1);
                unsafe {
                    self.device
                        .create_framebuffer(&info, None)
                        .map_err(creation("framebuffer"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.depth = Some(depth);
        self.framebuffers = framebuffers;
        Ok(())
    }

    /// Tears the chain, its views, and the dependent depth/framebuffer set
    /// down and reconstructs them from a fresh capability query. The rest
    /// of the graph is untouched; the caller must ensure the device is
    /// idle first.
    pub fn rebuild(
        &mut self,
        device: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        drawable: vk::Extent2D,
        vsync: bool,
        render_pass: &RenderTargetPass,
    ) -> Result<(), RenderError> {
        self.destroy();

        let loader = self.loader.clone();
        let (settings, chain, images, views) =
            Self::build(device, surface, surface_loader, &loader, drawable, vsync)?;
        log::debug!(
            "presentation chain rebuilt: {} images at {}x{}",
            images.len(),
            settings.extent.width,
            settings.extent.height,
        );

        self.settings = settings;
        self.chain = chain;
        self.images = images;
        self.views = views;
        self.attach_render_targets(device, render_pass)
    }

    pub fn acquire_image(
        &self,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome, RenderError> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.chain, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(source) => Err(gpu_op("image acquisition")(source)),
        }
    }

    /// Presents `index`. Returns true when the chain should be rebuilt
    /// before the next frame.
    pub fn present(
        &self,
        queue: vk::Queue,
        index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, RenderError> {
        let wait_semaphores = [wait];
        let swapchains = [self.chain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };
        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(source) => Err(gpu_op("presentation")(source)),
        }
    }

    /// Destroys views, depth buffer, framebuffers, and the chain handle,
    /// in that order. Safe to call repeatedly; the presentable images
    /// belong to the chain and are never destroyed individually.
    pub fn destroy(&mut self) {
        if self.chain == vk::SwapchainKHR::null() {
            return;
        }
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.depth = None;
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.loader.destroy_swapchain(self.chain, None);
        }
        self.images.clear();
        self.chain = vk::SwapchainKHR::null();
    }

    fn build(
        device: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        loader: &ash::khr::swapchain::Device,
        drawable: vk::Extent2D,
        vsync: bool,
    ) -> Result<
        (ChainSettings, vk::SwapchainKHR, Vec<vk::Image>, Vec<vk::ImageView>),
        RenderError,
    > {
        // Capabilities are never cached across rebuilds; a resize
        // invalidates every one of these answers.
        let support = SurfaceSupport::query(device.physical, surface, surface_loader)?;
        let settings = ChainSettings::choose(&support, drawable, vsync)?;

        let families = device.queue_families.unique();
        let sharing_mode = if families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let family_list: &[u32] = if families.len() > 1 { &families } else { &[] };

        let chain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(settings.image_count)
            .image_format(settings.format.format)
            .image_color_space(settings.format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_list)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true);

        let chain = unsafe {
            loader
                .create_swapchain(&chain_info, None)
                .map_err(creation("presentation chain"))?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(chain)
                .map_err(creation("presentation image query"))?
        };
        let views = images
            .iter()
            .map(|&image| {
                support::create_image_view(
                    &device.logical,
                    image,
                    settings.format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((settings, chain, images, views))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn srgb_bgra() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn unorm_rgba() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn format_prefers_bgra_srgb() {
        let formats = [unorm_rgba(), srgb_bgra()];
        assert_eq!(choose_surface_format(&formats).unwrap(), srgb_bgra());
    }

    #[test]
    fn format_falls_back_to_first_available() {
        let formats = [unorm_rgba()];
        assert_eq!(choose_surface_format(&formats).unwrap(), unorm_rgba());
    }

    #[test]
    fn empty_format_list_is_unsupported() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RenderError::UnsupportedEnvironment(_))
        ));
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::MAILBOX
        );
        // vsync forces the FIFO fallback even when MAILBOX is offered.
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_surface_current_extent_when_defined() {
        let current = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let caps = capabilities(2, 4, current);
        let drawable = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert_eq!(choose_extent(&caps, drawable), current);
    }

    #[test]
    fn extent_falls_back_to_clamped_drawable_size() {
        let undefined = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let caps = capabilities(2, 4, undefined);

        let drawable = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert_eq!(choose_extent(&caps, drawable), drawable);

        // Out-of-bounds drawable sizes stay within the surface limits.
        let oversized = vk::Extent2D {
            width: 10_000,
            height: 8,
        };
        assert_eq!(
            choose_extent(&caps, oversized),
            vk::Extent2D {
                width: 4096,
                height: 64,
            }
        );
    }

    #[test]
    fn image_count_requests_surface_maximum() {
        // Pins the literal policy: the request is the declared maximum,
        // with no min+1 margin.
        let caps = capabilities(2, 8, vk::Extent2D::default());
        assert_eq!(choose_image_count(&caps), 8);
    }

    #[test]
    fn unbounded_surface_drops_to_minimum_count() {
        let caps = capabilities(3, 0, vk::Extent2D::default());
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn settings_are_stable_for_unchanged_surface_state() {
        let support = SurfaceSupport {
            capabilities: capabilities(
                2,
                4,
                vk::Extent2D {
                    width: 1024,
                    height: 768,
                },
            ),
            formats: vec![unorm_rgba(), srgb_bgra()],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let drawable = vk::Extent2D {
            width: 1024,
            height: 768,
        };

        let first = ChainSettings::choose(&support, drawable, false).unwrap();
        let second = ChainSettings::choose(&support, drawable, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.image_count, 4);
        assert_eq!(first.format, srgb_bgra());
    }
}
