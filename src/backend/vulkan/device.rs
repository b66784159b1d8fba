// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device enumeration into AdapterInfo
// - Adapter selection (graphics + present queue, swapchain support)
// - Logical device + queue creation

use ash::vk;
use std::ffi::CStr;

use super::instance::VulkanInstance;
use crate::backend::adapter::{self, AdapterInfo, AdapterKind};
use crate::backend::ContextDesc;
use crate::error::{GraphicsError, Result, VkResultExt};

/// Logical device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    pub adapter: AdapterInfo,
}

/// A physical device that can render and present to our surface
struct Candidate {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    info: AdapterInfo,
}

impl VulkanDevice {
    pub fn new(
        instance: &VulkanInstance,
        surface: vk::SurfaceKHR,
        desc: &ContextDesc,
    ) -> Result<Self> {
        let candidates = Self::enumerate_candidates(instance, surface)?;

        for candidate in &candidates {
            log::info!("Found adapter: {}", candidate.info);
        }

        let infos: Vec<AdapterInfo> = candidates.iter().map(|c| c.info.clone()).collect();
        let chosen = adapter::select_adapter(
            &infos,
            desc.power_preference,
            desc.adapter_filter.as_deref(),
        )
        .ok_or(GraphicsError::NoSuitableAdapter)?;
        let candidate = &candidates[chosen];

        let (device, graphics_queue) = Self::create_logical_device(
            &instance.instance,
            candidate.physical_device,
            candidate.queue_family,
        )?;

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(candidate.physical_device)
        };
        log::info!("Selected GPU: {}", candidate.info);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Self {
            device,
            physical_device: candidate.physical_device,
            graphics_queue,
            graphics_queue_family: candidate.queue_family,
            adapter: candidate.info.clone(),
        })
    }

    fn enumerate_candidates(
        instance: &VulkanInstance,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<Candidate>> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .check("vkEnumeratePhysicalDevices")?;

        if devices.is_empty() {
            log::error!("No Vulkan-capable GPU found");
            return Err(GraphicsError::NoSuitableAdapter);
        }

        let mut candidates = Vec::new();
        for physical_device in devices {
            let info = Self::adapter_info(&instance.instance, physical_device);

            if !Self::supports_swapchain(&instance.instance, physical_device)? {
                log::debug!("Skipping {}: no VK_KHR_swapchain", info.name);
                continue;
            }

            match Self::find_queue_family(instance, physical_device, surface)? {
                Some(queue_family) => candidates.push(Candidate {
                    physical_device,
                    queue_family,
                    info,
                }),
                None => log::debug!("Skipping {}: no graphics+present queue", info.name),
            }
        }

        Ok(candidates)
    }

    fn adapter_info(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> AdapterInfo {
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory = unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let dedicated_memory = memory.memory_heaps[..memory.memory_heap_count as usize]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();

        let kind = match props.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
            vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
            _ => AdapterKind::Other,
        };

        AdapterInfo {
            name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            kind,
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            dedicated_memory,
        }
    }

    fn supports_swapchain(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<bool> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .check("vkEnumerateDeviceExtensionProperties")?;

        Ok(has_extension(&extensions, ash::extensions::khr::Swapchain::name()))
    }

    /// Single queue family that can both draw and present
    fn find_queue_family(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Option<u32>> {
        let queue_families = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        for (index, family) in queue_families.iter().enumerate() {
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }
            let index = index as u32;
            let present = unsafe {
                instance.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    surface,
                )
            }
            .check("vkGetPhysicalDeviceSurfaceSupportKHR")?;

            if present {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .check("vkCreateDevice")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }
        unsafe { self.device.destroy_device(None) };
    }
}

fn has_extension(extensions: &[vk::ExtensionProperties], name: &CStr) -> bool {
    extensions.iter().any(|ext| {
        // extension_name is a fixed-size, nul-terminated array
        (unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }) == name
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn finds_swapchain_extension() {
        let extensions = [
            extension(c"VK_KHR_maintenance1"),
            extension(ash::extensions::khr::Swapchain::name()),
        ];
        assert!(has_extension(&extensions, ash::extensions::khr::Swapchain::name()));
    }

    #[test]
    fn prefix_is_not_a_match() {
        let extensions = [extension(c"VK_KHR_swapchain_mutable_format")];
        assert!(!has_extension(&extensions, ash::extensions::khr::Swapchain::name()));
        assert!(!has_extension(&[], ash::extensions::khr::Swapchain::name()));
    }
}
