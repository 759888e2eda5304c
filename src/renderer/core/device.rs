use std::ffi::{c_char, CStr};
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use smallvec::SmallVec;

use crate::renderer::core::support::{self, DestroyGuard, QueueFamilyIndices};
use crate::renderer::error::{creation, RenderError};

/// A device queue together with the family it was created from.
#[derive(Clone, Copy)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family_index: u32,
}

/// What the engine requires of a physical device, flattened into plain
/// data so the selection predicate can run without a driver.
pub(crate) struct DeviceProfile {
    pub has_graphics_queue: bool,
    pub has_present_queue: bool,
    pub supports_required_extensions: bool,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
    pub has_required_features: bool,
}

impl DeviceProfile {
    pub fn is_suitable(&self) -> bool {
        self.has_graphics_queue
            && self.has_present_queue
            && self.supports_required_extensions
            && self.surface_format_count > 0
            && self.present_mode_count > 0
            && self.has_required_features
    }
}

/// Picks the first suitable device in enumeration order. There is no
/// scoring beyond first-match; enumeration order is the tie-break.
pub(crate) fn pick_first_suitable(profiles: &[DeviceProfile]) -> Option<usize> {
    profiles.iter().position(DeviceProfile::is_suitable)
}

/// The selected physical device, the logical device created from it, its
/// queues, and the memory allocator that sub-allocates its device memory.
pub struct RenderDevice {
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub logical: Arc<ash::Device>,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: Queue,
    pub present_queue: Queue,

    allocator: Option<Arc<Mutex<Allocator>>>,
    teardown: DestroyGuard,
}

impl RenderDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RenderError> {
        let (physical, queue_families) =
            Self::select_physical_device(instance, surface, surface_loader)?;
        let properties = unsafe { instance.get_physical_device_properties(physical) };
        log::info!(
            "selected physical device: {:?}",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>")
        );

        let logical = Self::create_logical_device(instance, physical, queue_families)?;

        let graphics_queue = Queue {
            handle: unsafe { logical.get_device_queue(queue_families.graphics, 0) },
            family_index: queue_families.graphics,
        };
        let present_queue = Queue {
            handle: unsafe { logical.get_device_queue(queue_families.present, 0) },
            family_index: queue_families.present,
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: logical.clone(),
            physical_device: physical,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            physical,
            properties,
            logical: Arc::new(logical),
            queue_families,
            graphics_queue,
            present_queue,
            allocator: Some(Arc::new(Mutex::new(allocator))),
            teardown: DestroyGuard::default(),
        })
    }

    /// Handle to the memory allocator for resource creation. Fails once
    /// the allocator stage has been released.
    pub fn allocator(&self) -> Result<Arc<Mutex<Allocator>>, RenderError> {
        self.allocator.clone().ok_or(RenderError::DeviceReleased)
    }

    pub fn wait_idle(&self) -> Result<(), RenderError> {
        unsafe {
            self.logical.device_wait_idle().map_err(|source| {
                RenderError::Gpu {
                    op: "device idle wait",
                    source,
                }
            })
        }
    }

    /// Drops this owner's allocator handle. Allocations returned by
    /// dependents must already be freed; the allocator logs leaks if not.
    pub fn release_allocator(&mut self) {
        self.allocator = None;
    }

    /// Destroys the logical device. Every object created from it must
    /// already be destroyed.
    pub fn release(&mut self) {
        if !self.teardown.arm() {
            return;
        }
        self.release_allocator();
        unsafe {
            self.logical.destroy_device(None);
        }
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices), RenderError> {
        let devices = unsafe {
            instance.enumerate_physical_devices().map_err(|source| {
                RenderError::Gpu {
                    op: "physical device enumeration",
                    source,
                }
            })?
        };

        let profiles = devices
            .iter()
            .map(|&device| Self::query_profile(instance, device, surface, surface_loader))
            .collect::<Result<Vec<_>, _>>()?;

        let index = pick_first_suitable(&profiles).ok_or_else(|| {
            RenderError::UnsupportedEnvironment(
                "no physical device satisfies the engine's requirements".to_owned(),
            )
        })?;
        let device = devices[index];

        let families = support::find_queue_families(instance, device, surface, surface_loader)?
            .ok_or_else(|| {
                RenderError::UnsupportedEnvironment(
                    "queue families vanished after suitability check".to_owned(),
                )
            })?;
        Ok((device, families))
    }

    fn query_profile(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<DeviceProfile, RenderError> {
        let families = support::find_queue_families(instance, device, surface, surface_loader)?;

        let supported_extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .unwrap_or_default()
        };
        let supports_required_extensions =
            Self::required_device_extensions().iter().all(|required| {
                supported_extensions.iter().any(|ext| {
                    ext.extension_name_as_c_str()
                        .is_ok_and(|name| name == *required)
                })
            });

        // The format/present-mode part of the predicate only needs the
        // counts, but the full query is what a rebuild performs anyway.
        let support = support::SurfaceSupport::query(device, surface, surface_loader)?;

        let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut features2 =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut indexing_features);
        unsafe {
            instance.get_physical_device_features2(device, &mut features2);
        }
        let base = features2.features;
        let has_required_features = base.sampler_anisotropy == vk::TRUE
            && base.shader_uniform_buffer_array_dynamic_indexing == vk::TRUE
            && indexing_features.descriptor_binding_partially_bound == vk::TRUE
            && indexing_features.runtime_descriptor_array == vk::TRUE;

        Ok(DeviceProfile {
            has_graphics_queue: families.is_some(),
            has_present_queue: families.is_some(),
            supports_required_extensions,
            surface_format_count: support.formats.len(),
            present_mode_count: support.present_modes.len(),
            has_required_features,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> Result<ash::Device, RenderError> {
        let queue_priorities = [1.0];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<SmallVec<[vk::DeviceQueueCreateInfo; 2]>>();

        let enabled_extension_names = Self::required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .shader_uniform_buffer_array_dynamic_indexing(true);
        // Reserved capability surface: the fixed binding layout does not
        // exercise descriptor indexing yet, but the device is created with
        // it so materials can move to a bindless set without a device
        // rebuild.
        let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::default()
            .descriptor_binding_partially_bound(true)
            .runtime_descriptor_array(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&features)
            .push_next(&mut indexing_features);

        unsafe {
            instance
                .create_device(physical, &device_create_info, None)
                .map_err(creation("logical device"))
        }
    }

    fn required_device_extensions() -> &'static [&'static CStr] {
        &[
            ash::khr::swapchain::NAME,
            ash::ext::descriptor_indexing::NAME,
            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suitable() -> DeviceProfile {
        DeviceProfile {
            has_graphics_queue: true,
            has_present_queue: true,
            supports_required_extensions: true,
            surface_format_count: 2,
            present_mode_count: 2,
            has_required_features: true,
        }
    }

    #[test]
    fn selects_first_suitable_device() {
        let profiles = [
            DeviceProfile {
                surface_format_count: 0,
                ..suitable()
            },
            suitable(),
            suitable(),
        ];
        assert_eq!(pick_first_suitable(&profiles), Some(1));
    }

    #[test]
    fn selection_follows_enumeration_order() {
        let forward = [suitable(), suitable()];
        assert_eq!(pick_first_suitable(&forward), Some(0));

        // Reordering the same candidates changes which one wins; there is
        // no tie-break beyond enumeration order.
        let reordered = [
            DeviceProfile {
                present_mode_count: 0,
                ..suitable()
            },
            suitable(),
        ];
        assert_eq!(pick_first_suitable(&reordered), Some(1));
    }

    #[test]
    fn every_predicate_clause_disqualifies() {
        let failures = [
            DeviceProfile {
                has_graphics_queue: false,
                ..suitable()
            },
            DeviceProfile {
                has_present_queue: false,
                ..suitable()
            },
            DeviceProfile {
                supports_required_extensions: false,
                ..suitable()
            },
            DeviceProfile {
                surface_format_count: 0,
                ..suitable()
            },
            DeviceProfile {
                present_mode_count: 0,
                ..suitable()
            },
            DeviceProfile {
                has_required_features: false,
                ..suitable()
            },
        ];
        assert_eq!(pick_first_suitable(&failures), None);
    }
}
