// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// One FrameSync per frame in flight; one render-finished semaphore per
// swapchain image, since presentation holds it until that image is
// acquired again.

use ash::vk;

use crate::error::{Result, VkResultExt};

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .check("vkCreateSemaphore")?;
            let in_flight_fence = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(result).check("vkCreateFence");
                }
            };

            Ok(Self {
                command_buffer,
                image_available,
                in_flight_fence,
            })
        }
    }

    pub fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX) }
            .check("vkWaitForFences")
    }

    pub fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_fences(&[self.in_flight_fence]) }.check("vkResetFences")
    }

    /// Replace the semaphore and fence of a frame that acquired an image
    /// but never submitted. The old semaphore stays signalled and the fence
    /// may have been reset, so neither can be reused. Device must be idle.
    pub fn renew(&mut self, device: &ash::Device) -> Result<()> {
        let command_buffer = self.command_buffer;
        let fresh = FrameSync::new(device, command_buffer)?;
        self.destroy(device);
        *self = fresh;
        Ok(())
    }

    /// Command buffers belong to the pool and are freed with it.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

pub fn create_semaphores(device: &ash::Device, count: usize) -> Result<Vec<vk::Semaphore>> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let mut semaphores = Vec::with_capacity(count);

    for _ in 0..count {
        match unsafe { device.create_semaphore(&semaphore_info, None) } {
            Ok(semaphore) => semaphores.push(semaphore),
            Err(result) => {
                destroy_semaphores(device, &mut semaphores);
                return Err(result).check("vkCreateSemaphore");
            }
        }
    }
    Ok(semaphores)
}

pub fn destroy_semaphores(device: &ash::Device, semaphores: &mut Vec<vk::Semaphore>) {
    for semaphore in semaphores.drain(..) {
        unsafe { device.destroy_semaphore(semaphore, None) };
    }
}
