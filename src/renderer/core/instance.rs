use std::ffi::{c_char, c_void, CStr};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

use crate::renderer::core::support::DestroyGuard;
use crate::renderer::error::{creation, RenderError};

/// Driver connection: the Vulkan entry points, the instance, and (in debug
/// builds) the validation-layer message registration.
pub struct RenderInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    teardown: DestroyGuard,
}

impl RenderInstance {
    const ENABLE_VALIDATION_LAYERS: bool = cfg!(debug_assertions);
    const REQUIRED_VALIDATION_LAYERS: &'static [&'static CStr] =
        &[c"VK_LAYER_KHRONOS_validation"];

    pub fn new(window: &Window) -> Result<Self, RenderError> {
        let entry = ash::Entry::linked();
        let instance = Self::create_instance(&entry, window)?;

        Ok(Self {
            entry,
            instance,
            debug_utils: None,
            teardown: DestroyGuard::default(),
        })
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    /// Registers the diagnostic-message callback. A no-op in release
    /// builds, where the registration is omitted entirely; returns whether
    /// a messenger was created.
    pub fn register_debug_messenger(&mut self) -> Result<bool, RenderError> {
        if !Self::ENABLE_VALIDATION_LAYERS {
            return Ok(false);
        }

        let loader = ash::ext::debug_utils::Instance::new(&self.entry, &self.instance);
        let info = debug_utils_messenger_create_info();
        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(&info, None)
                .map_err(creation("debug messenger"))?
        };
        self.debug_utils = Some((loader, messenger));
        Ok(true)
    }

    /// Creates the output surface for `window` along with the loader used
    /// to query and destroy it. The caller owns both.
    pub fn create_surface(
        &self,
        window: &Window,
    ) -> Result<(vk::SurfaceKHR, ash::khr::surface::Instance), RenderError> {
        let display_handle = window
            .display_handle()
            .map_err(|source| RenderError::asset("display handle", source))?;
        let window_handle = window
            .window_handle()
            .map_err(|source| RenderError::asset("window handle", source))?;

        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(creation("window surface"))?
        };
        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &self.instance);
        Ok((surface, surface_loader))
    }

    /// Drops the diagnostic-message registration, if one was made.
    pub fn release_debug_messenger(&mut self) {
        if let Some((loader, messenger)) = self.debug_utils.take() {
            unsafe {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
        }
    }

    /// Destroys the instance itself. Everything created from it must
    /// already be gone.
    pub fn release(&mut self) {
        if !self.teardown.arm() {
            return;
        }
        self.release_debug_messenger();
        unsafe {
            self.instance.destroy_instance(None);
        }
    }

    fn create_instance(entry: &ash::Entry, window: &Window) -> Result<ash::Instance, RenderError> {
        if Self::ENABLE_VALIDATION_LAYERS {
            Self::check_validation_layers_supported(entry)?;
        }

        let application_info = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_3);
        let enabled_layer_names = if Self::ENABLE_VALIDATION_LAYERS {
            Self::REQUIRED_VALIDATION_LAYERS
                .iter()
                .map(|layer| layer.as_ptr())
                .collect::<Vec<*const c_char>>()
        } else {
            Vec::new()
        };
        let enabled_extension_names = Self::get_required_instance_extensions(window)?
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let mut debug_info = debug_utils_messenger_create_info();
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);
        let instance_info = if Self::ENABLE_VALIDATION_LAYERS {
            instance_info.push_next(&mut debug_info)
        } else {
            instance_info
        };

        #[cfg(target_os = "macos")]
        let instance_info =
            instance_info.flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        unsafe {
            entry
                .create_instance(&instance_info, None)
                .map_err(creation("instance"))
        }
    }

    fn get_required_instance_extensions(
        window: &Window,
    ) -> Result<Vec<&'static CStr>, RenderError> {
        let display_handle = window
            .display_handle()
            .map_err(|source| RenderError::asset("display handle", source))?;
        let mut exts = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(creation("instance extension query"))?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect::<Vec<_>>();

        if Self::ENABLE_VALIDATION_LAYERS {
            exts.push(ash::ext::debug_utils::NAME);
        }

        #[cfg(target_os = "macos")]
        {
            exts.push(ash::khr::portability_enumeration::NAME);
            exts.push(ash::khr::get_physical_device_properties2::NAME);
        }

        Ok(exts)
    }

    fn check_validation_layers_supported(entry: &ash::Entry) -> Result<(), RenderError> {
        let supported_layers = unsafe {
            entry
                .enumerate_instance_layer_properties()
                .map_err(creation("layer property query"))?
        };

        for layer in Self::REQUIRED_VALIDATION_LAYERS {
            let found = supported_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == *layer));
            if !found {
                return Err(RenderError::UnsupportedEnvironment(format!(
                    "validation layer {layer:?} not supported"
                )));
            }
        }

        Ok(())
    }
}

fn debug_utils_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_severity = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    let msg = unsafe { CStr::from_ptr((*p_callback_data).p_message) };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("{} {:?}", msg_type, msg);
        }
        _ => {
            log::warn!("{} {:?}", msg_type, msg);
        }
    }

    vk::FALSE
}
