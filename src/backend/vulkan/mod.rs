// Vulkan backend
//
// Thin wrapper around ash: instance + surface, device, swapchain and
// per-frame sync, tied together by VulkanContext.

pub mod context;
pub mod device;
pub mod instance;
pub mod swapchain;
pub mod sync;

pub use context::VulkanContext;
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use swapchain::Swapchain;
