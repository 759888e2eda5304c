use ash::vk;
use smallvec::SmallVec;

use crate::renderer::error::{creation, RenderError};

/// Queue families the engine draws and presents with. The two indices may
/// name the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Family indices with duplicates removed, for device-creation queue
    /// infos and swapchain sharing lists.
    pub fn unique(&self) -> SmallVec<[u32; 2]> {
        let mut families = SmallVec::new();
        families.push(self.graphics);
        if self.present != self.graphics {
            families.push(self.present);
        }
        families
    }
}

/// One-shot latch for destroy paths. The first `arm` returns true; every
/// later call reports that teardown already ran.
#[derive(Default)]
pub struct DestroyGuard {
    done: bool,
}

impl DestroyGuard {
    pub fn arm(&mut self) -> bool {
        !std::mem::replace(&mut self.done, true)
    }
}

/// Finds the first graphics-capable family and the first present-capable
/// family for `surface`. Returns `None` when either is missing.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<Option<QueueFamilyIndices>, RenderError> {
    let props =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let graphics = props
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS));

    let mut present = None;
    for index in 0..props.len() as u32 {
        let supported = unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .map_err(|source| RenderError::Gpu {
                    op: "surface support query",
                    source,
                })?
        };
        if supported {
            present = Some(index);
            break;
        }
    }

    Ok(match (graphics, present) {
        (Some(graphics), Some(present)) => Some(QueueFamilyIndices {
            graphics: graphics as u32,
            present,
        }),
        _ => None,
    })
}

/// Surface capability snapshot. Queried fresh on every presentation-chain
/// (re)build because a resize invalidates the previous answers.
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RenderError> {
        let gpu = |op| move |source| RenderError::Gpu { op, source };
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(gpu("surface capability query"))?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(gpu("surface format query"))?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(gpu("surface present mode query"))?,
            })
        }
    }
}

/// Creates a 2D view over a single mip level and array layer, the only
/// shape the engine's images come in.
pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView, RenderError> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe {
        device
            .create_image_view(&view_info, None)
            .map_err(creation("image view"))
    }
}

/// Returns the first candidate whose queried format properties, under
/// `tiling`, include `features`. The query is injected so the selection
/// can be exercised without a device.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    query: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format, RenderError> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = query(format);
            let supported = match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features,
                _ => props.optimal_tiling_features,
            };
            supported.contains(features)
        })
        .ok_or_else(|| {
            RenderError::UnsupportedEnvironment(format!(
                "no candidate format supports {features:?} with {tiling:?} tiling"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::render_pass::DEPTH_FORMAT_CANDIDATES;

    #[test]
    fn unique_families_deduplicate() {
        let shared = QueueFamilyIndices {
            graphics: 0,
            present: 0,
        };
        assert_eq!(shared.unique().as_slice(), &[0]);

        let split = QueueFamilyIndices {
            graphics: 0,
            present: 2,
        };
        assert_eq!(split.unique().as_slice(), &[0, 2]);
    }

    #[test]
    fn destroy_guard_arms_exactly_once() {
        let mut guard = DestroyGuard::default();
        assert!(guard.arm());
        assert!(!guard.arm());
        assert!(!guard.arm());
    }

    #[test]
    fn depth_format_prefers_earlier_candidates() {
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn depth_format_falls_through_to_supported_candidate() {
        // Device that only supports the last candidate in the preference
        // list.
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| {
                let features = if format == vk::Format::D24_UNORM_S8_UINT {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                } else {
                    vk::FormatFeatureFlags::empty()
                };
                vk::FormatProperties {
                    optimal_tiling_features: features,
                    ..Default::default()
                }
            },
        )
        .unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn depth_format_honors_requested_tiling() {
        // Support is declared for linear tiling only; an optimal-tiling
        // request must not see it.
        let query = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };

        let linear = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            query,
        );
        assert!(linear.is_ok());

        let optimal = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            query,
        );
        assert!(matches!(
            optimal,
            Err(RenderError::UnsupportedEnvironment(_))
        ));
    }
}
