// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Recreation hands the old swapchain to the driver so in-flight
// presents can complete before it is destroyed.

use ash::vk;
use std::sync::Arc;

use super::device::VulkanDevice;
use crate::backend::PresentMode;
use crate::error::{GraphicsError, Result, VkResultExt};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
}

/// Everything needed to (re)build a swapchain
pub struct SwapchainRequest<'a> {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: &'a ash::extensions::khr::Surface,
    pub width: u32,
    pub height: u32,
    pub present_mode: PresentMode,
    pub min_images: u32,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        swapchain_loader: ash::extensions::khr::Swapchain,
        request: &SwapchainRequest<'_>,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        log::info!("Creating swapchain: {}x{}", request.width, request.height);

        let surface_caps = unsafe {
            request
                .surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, request.surface)
        }
        .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        let formats = unsafe {
            request
                .surface_loader
                .get_physical_device_surface_formats(device.physical_device, request.surface)
        }
        .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

        let present_modes = unsafe {
            request
                .surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, request.surface)
        }
        .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let surface_format = choose_surface_format(&formats).ok_or_else(|| {
            GraphicsError::UnsupportedWindow("surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(request.present_mode, &present_modes);
        let extent = choose_extent(&surface_caps, request.width, request.height);
        let image_count = choose_image_count(&surface_caps, request.min_images);

        log::info!(
            "Present mode: {:?}, format: {:?}, images: {}",
            present_mode,
            surface_format.format,
            image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(request.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .check("vkCreateSwapchainKHR")?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(result) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(GraphicsError::Vulkan {
                    call: "vkGetSwapchainImagesKHR",
                    result,
                });
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            format: surface_format.format,
            extent,
            present_mode,
            device,
        })
    }

    /// Build a replacement for `self`, which is destroyed afterwards.
    pub fn recreate(self, request: &SwapchainRequest<'_>) -> Result<Self> {
        let replacement = Swapchain::new(
            self.device.clone(),
            self.swapchain_loader.clone(),
            request,
            self.swapchain,
        );
        // old swapchain is retired either way once passed as old_swapchain
        drop(self);
        replacement
    }

    /// Acquire next image for rendering. Returns `(index, suboptimal)`.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
        .check("vkAcquireNextImageKHR")
    }

    /// Present rendered image to screen. Returns `true` when the
    /// swapchain should be rebuilt.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(result) => Err(GraphicsError::Vulkan {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };
    }
}

/// Prefer B8G8R8A8_SRGB with sRGB non-linear colour space.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

pub fn choose_present_mode(
    requested: PresentMode,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    requested
        .fallback_chain()
        .into_iter()
        .map(PresentMode::to_vulkan)
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO) // FIFO is always supported
}

/// The surface dictates the extent unless it reports the special
/// `u32::MAX` value, in which case the window size is clamped into range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the driver minimum, at least `requested`, capped by the
/// maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut image_count = (caps.min_image_count + 1).max(requested);
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, srgb.format);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, unorm.format);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_falls_back() {
        let only_fifo = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(PresentMode::Immediate, &only_fifo),
            vk::PresentModeKHR::FIFO
        );

        let with_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(PresentMode::Immediate, &with_mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(PresentMode::Fifo, &with_mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(PresentMode::Mailbox, &[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let mut fixed = caps(2, 3);
        fixed.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let extent = choose_extent(&fixed, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamped_when_free() {
        let extent = choose_extent(&caps(2, 3), 8000, 0);
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn image_count_respects_limits() {
        assert_eq!(choose_image_count(&caps(2, 0), 2), 3);
        assert_eq!(choose_image_count(&caps(2, 8), 4), 4);
        assert_eq!(choose_image_count(&caps(2, 2), 3), 2);
    }
}
