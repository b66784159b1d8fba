// Vulkan Instance - loader, instance, debug messenger, surface
//
// Responsibilities:
// - Load the Vulkan loader at runtime
// - Instance creation with the platform surface extensions
// - Validation layer + debug messenger routed into `log`
// - Surface creation for Win32 / Xlib windows

use ash::{vk, Entry};
use std::ffi::{CStr, CString};

use crate::error::{GraphicsError, Result, VkResultExt};
use crate::window::NativeWindow;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct VulkanInstance {
    pub instance: ash::Instance,
    pub surface_loader: ash::extensions::khr::Surface,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub entry: Entry,
}

impl VulkanInstance {
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .map_err(|e| GraphicsError::Loader(format!("{e}. Is Vulkan installed?")))?;

        let enable_validation = enable_validation && Self::validation_available(&entry)?;
        let instance = Self::create_instance(&entry, app_name, enable_validation)?;

        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

        Ok(Self {
            instance,
            surface_loader,
            debug_utils,
            entry,
        })
    }

    fn validation_available(entry: &Entry) -> Result<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .check("vkEnumerateInstanceLayerProperties")?;

        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if !found {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
        Ok(found)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)
            .unwrap_or_else(|_| CString::from(c"graphics-provider"));
        let engine_name = c"graphics-provider";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let extensions = Self::required_extensions(enable_validation);

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.check("vkCreateInstance")
    }

    /// Surface extensions for every window system we can present to
    fn required_extensions(enable_validation: bool) -> Vec<*const std::ffi::c_char> {
        let mut extensions = vec![ash::extensions::khr::Surface::name().as_ptr()];

        #[cfg(target_os = "windows")]
        extensions.push(ash::extensions::khr::Win32Surface::name().as_ptr());

        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        extensions.push(ash::extensions::khr::XlibSurface::name().as_ptr());

        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }
        extensions
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .check("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }

    /// Create a presentation surface for the window.
    pub fn create_surface(&self, window: &NativeWindow) -> Result<vk::SurfaceKHR> {
        match *window {
            #[cfg(target_os = "windows")]
            NativeWindow::Win32 { hwnd, .. } => {
                let hinstance = window.module_handle()?;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance as vk::HINSTANCE)
                    .hwnd(hwnd as vk::HWND);
                let loader = ash::extensions::khr::Win32Surface::new(&self.entry, &self.instance);
                unsafe { loader.create_win32_surface(&create_info, None) }
                    .check("vkCreateWin32SurfaceKHR")
            }

            #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
            NativeWindow::Xlib { display, window } => {
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(display as *mut vk::Display)
                    .window(window as vk::Window);
                let loader = ash::extensions::khr::XlibSurface::new(&self.entry, &self.instance);
                unsafe { loader.create_xlib_surface(&create_info, None) }
                    .check("vkCreateXlibSurfaceKHR")
            }

            #[allow(unreachable_patterns)]
            other => Err(GraphicsError::UnsupportedWindow(format!(
                "{:?} is not supported by Vulkan on this platform",
                other
            ))),
        }
    }

    pub fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
