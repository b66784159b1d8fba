// Vulkan graphics context
//
// FRAME FLOW:
// 1. Wait for the fence of this frame slot
// 2. Acquire swapchain image (signals image_available)
// 3. Wait for whichever slot last rendered into that image
// 4. Re-record the slot's command buffer: UNDEFINED -> TRANSFER_DST, clear
// 5. end_frame: TRANSFER_DST -> PRESENT_SRC, reset fence, submit (signals it)
// 6. present_frame: present, advance slot

use ash::vk;
use glam::Vec4;
use std::sync::Arc;

use super::device::VulkanDevice;
use super::instance::VulkanInstance;
use super::swapchain::{Swapchain, SwapchainRequest};
use super::sync::{self, FrameSync};
use crate::backend::frame::{self, FrameLifecycle, ImageOwnership};
use crate::backend::state::DisposeState;
use crate::backend::{
    AdapterInfo, BackendKind, ContextDesc, FrameStatus, GraphicsContext, PresentMode,
};
use crate::error::{GraphicsError, Result, VkResultExt};
use crate::window::NativeWindow;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Vulkan device, surface and swapchain bound to one window.
///
/// Every native object lives in an `Option` so `dispose` can release them
/// child-first regardless of field order.
pub struct VulkanContext {
    // Frame state
    frames: FrameLifecycle,
    images: ImageOwnership,
    current_image: Option<u32>,
    wait_stages: [vk::PipelineStageFlags; 1],

    // Per-frame and per-image sync
    frame_sync: Vec<FrameSync>,
    render_finished: Vec<vk::Semaphore>,
    command_pool: Option<vk::CommandPool>,

    swapchain: Option<Swapchain>,
    surface: Option<vk::SurfaceKHR>,
    device: Option<Arc<VulkanDevice>>,
    instance: Option<VulkanInstance>,

    adapter: AdapterInfo,
    present_mode: PresentMode,
    width: u32,
    height: u32,
    needs_resize: bool,
    state: DisposeState,
}

impl VulkanContext {
    pub fn new(window: &NativeWindow, desc: &ContextDesc) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let instance = VulkanInstance::new(&desc.app_name, desc.validation)?;
        let surface = instance.create_surface(window)?;

        let device = match VulkanDevice::new(&instance, surface, desc) {
            Ok(device) => Arc::new(device),
            Err(e) => {
                instance.destroy_surface(surface);
                return Err(e);
            }
        };

        let frames_in_flight = desc.frames_in_flight.clamp(1, 3);
        let mut context = Self {
            frames: FrameLifecycle::new(frames_in_flight),
            images: ImageOwnership::default(),
            current_image: None,
            wait_stages: [vk::PipelineStageFlags::TRANSFER],
            frame_sync: Vec::new(),
            render_finished: Vec::new(),
            command_pool: None,
            swapchain: None,
            surface: Some(surface),
            adapter: device.adapter.clone(),
            device: Some(device),
            instance: Some(instance),
            present_mode: desc.present_mode,
            width: desc.width,
            height: desc.height,
            needs_resize: false,
            state: DisposeState::new(),
        };

        // From here on a failure unwinds through dispose()
        context.create_frame_resources(frames_in_flight)?;
        context.create_swapchain()?;

        log::info!("Vulkan initialized successfully!");
        Ok(context)
    }

    fn device(&self) -> Result<&Arc<VulkanDevice>> {
        self.device.as_ref().ok_or(GraphicsError::Disposed)
    }

    fn create_frame_resources(&mut self, frames_in_flight: usize) -> Result<()> {
        let device = self.device()?.clone();

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            // TRANSIENT: Command buffers are short-lived
            // RESET: Allow individual buffer reset
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .check("vkCreateCommandPool")?;
        self.command_pool = Some(command_pool);

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .check("vkAllocateCommandBuffers")?;

        for command_buffer in command_buffers {
            let frame = FrameSync::new(&device.device, command_buffer)?;
            self.frame_sync.push(frame);
        }

        Ok(())
    }

    /// Create or rebuild the swapchain and its per-image semaphores.
    /// Leaves the swapchain absent while the window is minimized.
    fn create_swapchain(&mut self) -> Result<()> {
        if frame::is_minimized(self.width, self.height) {
            return Ok(());
        }

        let device = self.device()?.clone();
        let instance = self.instance.as_ref().ok_or(GraphicsError::Disposed)?;
        let surface = self.surface.ok_or(GraphicsError::Disposed)?;

        // Presentation may still hold the old per-image semaphores
        device.wait_idle()?;
        sync::destroy_semaphores(&device.device, &mut self.render_finished);

        let request = SwapchainRequest {
            surface,
            surface_loader: &instance.surface_loader,
            width: self.width,
            height: self.height,
            present_mode: self.present_mode,
            min_images: self.frames.frames_in_flight() as u32,
        };

        let swapchain = match self.swapchain.take() {
            Some(old) => old.recreate(&request)?,
            None => {
                let loader = ash::extensions::khr::Swapchain::new(&instance.instance, &device.device);
                Swapchain::new(device.clone(), loader, &request, vk::SwapchainKHR::null())?
            }
        };

        self.render_finished = sync::create_semaphores(&device.device, swapchain.images.len())?;
        self.images.reset(swapchain.images.len());
        self.swapchain = Some(swapchain);
        self.needs_resize = false;
        Ok(())
    }

    fn record_clear(
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        clear_color: Vec4,
    ) -> Result<()> {
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .check("vkResetCommandBuffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .check("vkBeginCommandBuffer")?;

            // Previous contents are discarded, so UNDEFINED is fine
            let to_transfer = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE)
                .build();

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            let clear = vk::ClearColorValue {
                float32: clear_color.to_array(),
            };
            device.cmd_clear_color_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear,
                &[COLOR_RANGE],
            );
        }
        Ok(())
    }

    fn record_present_transition(
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
    ) -> Result<()> {
        let to_present = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_RANGE)
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present],
            );
            device
                .end_command_buffer(command_buffer)
                .check("vkEndCommandBuffer")
        }
    }
}

impl VulkanContext {
    /// Close, reset the slot fence and submit. The fence is only reset
    /// here, so a frame that fails earlier leaves it signalled.
    fn submit(&self) -> Result<()> {
        let device = self.device()?;
        let image_index = self.current_image.ok_or(GraphicsError::Disposed)?;
        let swapchain = self.swapchain.as_ref().ok_or(GraphicsError::Disposed)?;
        let image = swapchain.images[image_index as usize];
        let frame = &self.frame_sync[self.frames.slot()];

        Self::record_present_transition(&device.device, frame.command_buffer, image)?;

        let wait_semaphores = [frame.image_available];
        let signal_semaphores = [self.render_finished[image_index as usize]];
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        frame.reset(&device.device)?;
        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                frame.in_flight_fence, // Signal this fence when GPU is done
            )
        }
        .check("vkQueueSubmit")
    }

    /// Give up on a frame that acquired an image but never submitted.
    /// The slot gets fresh sync objects and the swapchain is rebuilt so the
    /// acquired image is released.
    fn drop_acquired_frame(&mut self) {
        self.frames.abandon();
        self.current_image = None;
        self.needs_resize = true;

        let Some(device) = self.device.clone() else {
            return;
        };
        let slot = self.frames.slot();
        let renewed = device
            .wait_idle()
            .and_then(|()| self.frame_sync[slot].renew(&device.device));
        if let Err(e) = renewed {
            log::error!("Failed to replace sync objects for frame slot {}: {}", slot, e);
        }
    }
}

impl GraphicsContext for VulkanContext {
    fn backend(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn frame_index(&self) -> usize {
        self.current_image.unwrap_or(0) as usize
    }

    fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    fn begin_frame(&mut self, clear_color: Vec4) -> Result<FrameStatus> {
        self.state.ensure_alive()?;

        if frame::is_minimized(self.width, self.height) {
            return Ok(FrameStatus::Skipped);
        }
        if self.needs_resize {
            self.create_swapchain()?;
        }
        if self.swapchain.is_none() {
            return Ok(FrameStatus::Skipped);
        }

        self.frames.begin()?;
        let slot = self.frames.slot();
        let device = self.device()?.clone();

        // Wait for the last submission from this slot before touching it
        let frame = &self.frame_sync[slot];
        if let Err(e) = frame.wait(&device.device) {
            self.frames.abandon();
            return Err(e);
        }

        let Some(swapchain) = self.swapchain.as_ref() else {
            self.frames.abandon();
            return Ok(FrameStatus::Skipped);
        };
        let (image_index, suboptimal) =
            match swapchain.acquire_next_image(u64::MAX, frame.image_available) {
                Ok(acquired) => acquired,
                Err(e) if e.is_out_of_date() => {
                    log::debug!("Swapchain out of date on acquire, rebuilding");
                    self.frames.abandon();
                    self.create_swapchain()?;
                    return Ok(FrameStatus::Skipped);
                }
                Err(e) => {
                    self.frames.abandon();
                    return Err(e);
                }
            };
        if suboptimal {
            self.needs_resize = true;
        }
        let image = swapchain.images[image_index as usize];

        let recorded = (|| -> Result<()> {
            if let Some(owner) = self.images.claim(image_index as usize, slot) {
                self.frame_sync[owner].wait(&device.device)?;
            }
            let command_buffer = self.frame_sync[slot].command_buffer;
            Self::record_clear(&device.device, command_buffer, image, clear_color)
        })();

        if let Err(e) = recorded {
            self.drop_acquired_frame();
            return Err(e);
        }

        self.current_image = Some(image_index);
        Ok(FrameStatus::Ready)
    }

    fn end_frame(&mut self) -> Result<()> {
        self.state.ensure_alive()?;
        self.frames.end()?;

        let submitted = self.submit();
        if submitted.is_err() {
            self.drop_acquired_frame();
        }
        submitted
    }

    fn present_frame(&mut self) -> Result<()> {
        self.state.ensure_alive()?;
        self.frames.present()?;

        let device = self.device()?.clone();
        let image_index = self.current_image.ok_or(GraphicsError::Disposed)?;
        let swapchain = self.swapchain.as_ref().ok_or(GraphicsError::Disposed)?;

        let rebuild = swapchain.present(
            device.graphics_queue,
            image_index,
            &[self.render_finished[image_index as usize]],
        )?;
        if rebuild {
            self.needs_resize = true;
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            log::debug!("Resize requested: {}x{}", width, height);
            self.width = width;
            self.height = height;
            self.needs_resize = true;
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device()?.wait_idle()
    }

    fn dispose(&mut self) -> Result<()> {
        if !self.state.begin_dispose() {
            return Ok(());
        }
        log::info!("Cleaning up Vulkan resources...");
        self.frames.abandon();

        let mut result = Ok(());
        if let Some(device) = self.device.clone() {
            // Wait for GPU to finish before destroying anything
            result = device.wait_idle();

            // 1. Sync objects
            for frame in self.frame_sync.drain(..) {
                frame.destroy(&device.device);
            }
            sync::destroy_semaphores(&device.device, &mut self.render_finished);

            // 2. Command pool (also frees command buffers)
            if let Some(pool) = self.command_pool.take() {
                unsafe { device.device.destroy_command_pool(pool, None) };
            }
        }

        // 3. Swapchain
        self.swapchain = None;

        // 4. Surface
        if let (Some(surface), Some(instance)) = (self.surface.take(), self.instance.as_ref()) {
            instance.destroy_surface(surface);
        }

        // 5. Device, then instance + debug messenger
        self.device = None;
        self.instance = None;

        self.state.end_dispose();
        log::info!("Cleanup complete");
        result
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::error!("Error while disposing Vulkan context: {}", e);
        }
    }
}
